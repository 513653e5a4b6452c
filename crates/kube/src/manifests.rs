//! Install manifests for the controller.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::CustomResourceExt;
use serde::Serialize;

use crate::crd::Check;
use crate::error::Result;

const APP: &str = "vigil";

/// Where and how the controller is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Namespace the controller runs in.
    pub namespace: String,
    /// Controller image.
    pub image: String,
    /// Name shared by the service account, role, binding and deployment.
    pub name: String,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            namespace: "vigil-system".to_string(),
            image: "ghcr.io/lprior-repo/vigil:latest".to_string(),
            name: APP.to_string(),
        }
    }
}

/// The `Check` CRD as YAML.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn crd_yaml() -> Result<String> {
    Ok(serde_yaml::to_string(&Check::crd())?)
}

/// CRD, RBAC and Deployment as a multi-document YAML stream.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn install_manifests(opts: &InstallOptions) -> Result<String> {
    let documents = [
        crd_yaml()?,
        to_yaml(&service_account(opts))?,
        to_yaml(&cluster_role(opts))?,
        to_yaml(&cluster_role_binding(opts))?,
        to_yaml(&deployment(opts))?,
    ];
    Ok(documents.join("---\n"))
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app.kubernetes.io/name".to_string(), APP.to_string())])
}

fn metadata(opts: &InstallOptions, namespaced: bool) -> ObjectMeta {
    ObjectMeta {
        name: Some(opts.name.clone()),
        namespace: namespaced.then(|| opts.namespace.clone()),
        labels: Some(labels()),
        ..ObjectMeta::default()
    }
}

fn service_account(opts: &InstallOptions) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(opts, true),
        ..ServiceAccount::default()
    }
}

fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(ToString::to_string).collect()),
        verbs: verbs.iter().map(ToString::to_string).collect(),
        ..PolicyRule::default()
    }
}

fn cluster_role(opts: &InstallOptions) -> ClusterRole {
    ClusterRole {
        metadata: metadata(opts, false),
        rules: Some(vec![
            rule("vigil.dev", &["checks"], &["get", "list", "watch"]),
            rule("vigil.dev", &["checks/status"], &["get", "patch", "update"]),
            rule("batch", &["jobs"], &["create", "delete", "get", "list", "watch"]),
            rule("", &["pods"], &["get", "list", "watch"]),
            rule("", &["pods/log"], &["get"]),
        ]),
        ..ClusterRole::default()
    }
}

fn cluster_role_binding(opts: &InstallOptions) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: metadata(opts, false),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: opts.name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: opts.name.clone(),
            namespace: Some(opts.namespace.clone()),
            ..Subject::default()
        }]),
    }
}

fn deployment(opts: &InstallOptions) -> Deployment {
    Deployment {
        metadata: metadata(opts, true),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(opts.name.clone()),
                    containers: vec![Container {
                        name: APP.to_string(),
                        image: Some(opts.image.clone()),
                        args: Some(vec!["run".to_string()]),
                        env: Some(vec![EnvVar {
                            name: "VIGIL_LOG".to_string(),
                            value: Some("info".to_string()),
                            ..EnvVar::default()
                        }]),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crd_yaml_names_the_resource() {
        let yaml = crd_yaml().unwrap_or_default();
        assert!(yaml.contains("name: checks.vigil.dev"));
        assert!(yaml.contains("kind: CustomResourceDefinition"));
    }

    #[test]
    fn manifests_contain_every_object() {
        let yaml = install_manifests(&InstallOptions::default()).unwrap_or_default();
        assert_eq!(yaml.matches("---\n").count(), 4);
        for kind in [
            "kind: CustomResourceDefinition",
            "kind: ServiceAccount",
            "kind: ClusterRole",
            "kind: ClusterRoleBinding",
            "kind: Deployment",
        ] {
            assert!(yaml.contains(kind), "missing {kind}");
        }
        assert!(yaml.contains("pods/log"));
        assert!(yaml.contains("namespace: vigil-system"));
    }

    #[test]
    fn rbac_covers_status_and_jobs() {
        let role = cluster_role(&InstallOptions::default());
        let rules = role.rules.unwrap_or_default();
        assert!(rules.iter().any(|r| {
            r.resources.as_deref() == Some(&["checks/status".to_string()][..])
                && r.verbs.contains(&"patch".to_string())
        }));
        assert!(rules.iter().any(|r| {
            r.resources.as_deref() == Some(&["jobs".to_string()][..])
                && r.verbs.contains(&"delete".to_string())
        }));
    }
}
