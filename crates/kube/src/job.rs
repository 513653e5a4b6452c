//! Job-based execution backend.
//!
//! Every run becomes a `batch/v1` Job owned by its `Check`. The backend
//! polls the Job until it finishes, reads the exit code and logs from its
//! pod, then deletes it. Deletion is tied to a guard so that a run dropped
//! mid-flight still removes its Job.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvFromSource, Pod, PodSpec, PodTemplateSpec,
    SecretEnvSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::{Client, Resource};
use tracing::{debug, info, warn};
use vigil_core::{CheckId, ExecutionPayload, format_duration};
use vigil_reconciler::{BackendError, ExecutionBackend, ExecutionRequest, ExecutionResult};

use crate::crd::Check;
use crate::error::{Error, Result};

/// Label set on every Job and pod the backend creates.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Label carrying the owning check's name.
pub const CHECK_LABEL: &str = "vigil.dev/check";
/// Name of the container built from `image`.
pub const CONTAINER_NAME: &str = "check";

const MANAGER: &str = "vigil";
const CONFIG_VOLUME: &str = "check-config";
const MAX_NAME_PREFIX: usize = 36;
/// Lets the cluster collect Jobs whose deletion was lost.
const FINISHED_TTL_SECS: i32 = 600;

/// Waiting reasons that mean the container will never start on its own.
const LAUNCH_FAILURES: [&str; 5] = [
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "CreateContainerConfigError",
    "CreateContainerError",
];

/// Backend tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// How often Job status is read.
    pub poll_interval: Duration,
    /// Where `configRef` is mounted in the check container.
    pub config_mount_path: String,
    /// Service account for check pods that do not name one.
    pub service_account: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            config_mount_path: "/etc/vigil/check".to_string(),
            service_account: None,
        }
    }
}

/// Runs checks as Kubernetes Jobs.
#[derive(Clone)]
pub struct KubeJobBackend {
    client: Client,
    config: JobConfig,
}

impl KubeJobBackend {
    /// Create a backend using `client`.
    #[must_use]
    pub fn new(client: Client, config: JobConfig) -> Self {
        Self { client, config }
    }

    async fn owner_reference(&self, check: &CheckId) -> Option<OwnerReference> {
        let checks: Api<Check> = Api::namespaced(self.client.clone(), check.namespace());
        match checks.get_opt(check.name()).await {
            Ok(found) => found.and_then(|c| c.controller_owner_ref(&())),
            Err(e) => {
                warn!(check = %check, error = %e, "Failed to read check for owner reference");
                None
            }
        }
    }

    async fn wait(&self, jobs: &Api<Job>, pods: &Api<Pod>, name: &str) -> ExecutionResult {
        let selector = ListParams::default().labels(&format!("job-name={name}"));
        let mut ticker =
            tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(100)));
        loop {
            ticker.tick().await;

            let job = match jobs.get_status(name).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(job = %name, error = %e, "Failed to read job status");
                    continue;
                }
            };
            let pod_list = match pods.list(&selector).await {
                Ok(list) => list.items,
                Err(e) => {
                    warn!(job = %name, error = %e, "Failed to list job pods");
                    continue;
                }
            };

            if let Some(reason) = pod_list.iter().find_map(launch_failure) {
                return ExecutionResult::not_started(reason);
            }

            match job_phase(&job) {
                JobPhase::Active => {}
                JobPhase::DeadlineExceeded => {
                    let logs = collect_logs(pods, &pod_list).await;
                    return ExecutionResult::timed_out(logs, "job exceeded its active deadline");
                }
                JobPhase::Finished { succeeded } => {
                    let logs = collect_logs(pods, &pod_list).await;
                    let code = pod_list
                        .iter()
                        .find_map(exit_code)
                        .or_else(|| succeeded.then_some(0));
                    return ExecutionResult {
                        exit_code: code,
                        logs,
                        started: true,
                        ..ExecutionResult::default()
                    };
                }
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for KubeJobBackend {
    async fn run(&self, request: ExecutionRequest) -> std::result::Result<ExecutionResult, BackendError> {
        let namespace = request.check.namespace();
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let owner = self.owner_reference(&request.check).await;
        let name = job_name(&request.check);
        let job = match build_job(&request, &name, owner, &self.config) {
            Ok(job) => job,
            Err(e) => return Ok(ExecutionResult::not_started(e.to_string())),
        };

        if let Err(e) = jobs.create(&PostParams::default(), &job).await {
            warn!(check = %request.check, job = %name, error = %e, "Job rejected");
            return Ok(ExecutionResult::not_started(format!("job rejected: {e}")));
        }
        info!(check = %request.check, job = %name, "Created job");
        let _guard = JobGuard::new(jobs.clone(), name.clone());

        match tokio::time::timeout(request.timeout, self.wait(&jobs, &pods, &name)).await {
            Ok(result) => Ok(result),
            Err(_) => {
                let logs = match pods
                    .list(&ListParams::default().labels(&format!("job-name={name}")))
                    .await
                {
                    Ok(list) => collect_logs(&pods, &list.items).await,
                    Err(_) => String::new(),
                };
                Ok(ExecutionResult::timed_out(
                    logs,
                    format!("exceeded timeout of {}", format_duration(request.timeout)),
                ))
            }
        }
    }
}

/// Deletes its Job when dropped.
struct JobGuard {
    jobs: Api<Job>,
    name: String,
}

impl JobGuard {
    fn new(jobs: Api<Job>, name: String) -> Self {
        Self { jobs, name }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let jobs = self.jobs.clone();
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { delete_job(&jobs, &name).await });
            }
            Err(_) => warn!(job = %name, "No runtime to delete job; relying on its TTL"),
        }
    }
}

async fn delete_job(jobs: &Api<Job>, name: &str) {
    match jobs.delete(name, &DeleteParams::background()).await {
        Ok(_) => debug!(job = %name, "Deleted job"),
        Err(kube::Error::Api(response)) if response.code == 404 => {}
        Err(e) => warn!(job = %name, error = %e, "Failed to delete job"),
    }
}

async fn collect_logs(pods: &Api<Pod>, items: &[Pod]) -> String {
    let mut logs = String::new();
    for pod in items {
        let Some(name) = pod.metadata.name.as_deref() else {
            continue;
        };
        match pods.logs(name, &LogParams::default()).await {
            Ok(text) => logs.push_str(&text),
            Err(e) => debug!(pod = %name, error = %e, "Failed to read pod logs"),
        }
    }
    logs
}

/// Unique Job name for one run of `check`.
///
/// Fits the 63 character label limit: at most 36 characters of the check
/// name, a dash, and a lowercase ULID.
#[must_use]
pub fn job_name(check: &CheckId) -> String {
    let prefix: String = check.name().chars().take(MAX_NAME_PREFIX).collect();
    let prefix = prefix.trim_end_matches(['-', '.']);
    format!("{prefix}-{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Build the Job object for one run.
///
/// # Errors
///
/// Returns [`Error::InvalidTemplate`] when a template payload does not
/// describe a pod.
pub fn build_job(
    request: &ExecutionRequest,
    name: &str,
    owner: Option<OwnerReference>,
    config: &JobConfig,
) -> Result<Job> {
    let labels = BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGER.to_string()),
        (CHECK_LABEL.to_string(), request.check.name().to_string()),
    ]);

    let mut template = pod_template(&request.payload, config)?;
    let metadata = template.metadata.get_or_insert_with(ObjectMeta::default);
    metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(labels.clone());
    if let Some(spec) = template.spec.as_mut() {
        spec.restart_policy = Some("Never".to_string());
        if spec.service_account_name.is_none() {
            spec.service_account_name.clone_from(&config.service_account);
        }
    }

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(request.check.namespace().to_string()),
            labels: Some(labels),
            owner_references: owner.map(|o| vec![o]),
            ..ObjectMeta::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            active_deadline_seconds: Some(
                i64::try_from(request.timeout.as_secs().max(1)).unwrap_or(i64::MAX),
            ),
            ttl_seconds_after_finished: Some(FINISHED_TTL_SECS),
            template,
            ..JobSpec::default()
        }),
        ..Job::default()
    })
}

fn pod_template(payload: &ExecutionPayload, config: &JobConfig) -> Result<PodTemplateSpec> {
    match payload {
        ExecutionPayload::Template(value) => {
            let template: PodTemplateSpec = serde_json::from_value(value.clone())
                .map_err(|e| Error::invalid_template(e.to_string()))?;
            if template.spec.as_ref().is_none_or(|s| s.containers.is_empty()) {
                return Err(Error::invalid_template("template has no containers"));
            }
            Ok(template)
        }
        ExecutionPayload::Image {
            image,
            secret_ref,
            config_ref,
        } => {
            let container = Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(image.clone()),
                env_from: secret_ref.as_ref().map(|secret| {
                    vec![EnvFromSource {
                        secret_ref: Some(SecretEnvSource {
                            name: secret.clone(),
                            ..SecretEnvSource::default()
                        }),
                        ..EnvFromSource::default()
                    }]
                }),
                volume_mounts: config_ref.as_ref().map(|_| {
                    vec![VolumeMount {
                        name: CONFIG_VOLUME.to_string(),
                        mount_path: config.config_mount_path.clone(),
                        read_only: Some(true),
                        ..VolumeMount::default()
                    }]
                }),
                ..Container::default()
            };
            Ok(PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: config_ref.as_ref().map(|config_map| {
                        vec![Volume {
                            name: CONFIG_VOLUME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: config_map.clone(),
                                ..ConfigMapVolumeSource::default()
                            }),
                            ..Volume::default()
                        }]
                    }),
                    ..PodSpec::default()
                }),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobPhase {
    Active,
    DeadlineExceeded,
    Finished { succeeded: bool },
}

fn job_phase(job: &Job) -> JobPhase {
    let Some(status) = job.status.as_ref() else {
        return JobPhase::Active;
    };
    for condition in status.conditions.iter().flatten() {
        if condition.status != "True" {
            continue;
        }
        match condition.type_.as_str() {
            "Complete" => return JobPhase::Finished { succeeded: true },
            "Failed" if condition.reason.as_deref() == Some("DeadlineExceeded") => {
                return JobPhase::DeadlineExceeded;
            }
            "Failed" => return JobPhase::Finished { succeeded: false },
            _ => {}
        }
    }
    if status.succeeded.unwrap_or(0) > 0 {
        JobPhase::Finished { succeeded: true }
    } else if status.failed.unwrap_or(0) > 0 {
        JobPhase::Finished { succeeded: false }
    } else {
        JobPhase::Active
    }
}

/// Reason a pod's container will never start, if any.
fn launch_failure(pod: &Pod) -> Option<String> {
    let statuses = pod.status.as_ref()?;
    statuses
        .init_container_statuses
        .iter()
        .flatten()
        .chain(statuses.container_statuses.iter().flatten())
        .find_map(|container| {
            let waiting = container.state.as_ref()?.waiting.as_ref()?;
            let reason = waiting.reason.as_deref()?;
            LAUNCH_FAILURES.contains(&reason).then(|| {
                waiting.message.as_deref().map_or_else(
                    || reason.to_string(),
                    |message| format!("{reason}: {message}"),
                )
            })
        })
}

fn exit_code(pod: &Pod) -> Option<i32> {
    pod.status
        .as_ref()?
        .container_statuses
        .iter()
        .flatten()
        .find_map(|c| Some(c.state.as_ref()?.terminated.as_ref()?.exit_code))
}
