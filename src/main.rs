//! # vigil - controller entry point
//!
//! `vigil run` starts the controller:
//!
//! 1. **Settings** - load the TOML file, apply CLI and environment overrides, validate
//! 2. **Kubernetes client** - in-cluster config or the local kubeconfig
//! 3. **Collaborators** - Job backend, status store, escalation registry
//! 4. **Controller** - watch checks until SIGTERM/SIGINT or a fatal watch error
//!
//! `vigil crd` and `vigil manifests` print YAML and exit.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vigil::cli::{Cli, Commands};
use vigil::shutdown::shutdown_signal;
use vigil::{API_KEY_ENV, Settings};
use vigil_kube::{
    InstallOptions, KubeJobBackend, KubeStatusStore, crd_yaml, install_manifests, watch_checks,
};
use vigil_reconciler::{Controller, ReconcilerContext, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd => {
            print!("{}", crd_yaml().context("Failed to render CRD")?);
            Ok(())
        }
        Commands::Manifests { namespace, image } => {
            let opts = InstallOptions {
                namespace,
                image,
                ..InstallOptions::default()
            };
            print!(
                "{}",
                install_manifests(&opts).context("Failed to render manifests")?
            );
            Ok(())
        }
        Commands::Run { namespace } => {
            init_tracing(&cli.log_filter);
            run(cli.config.as_deref(), namespace).await
        }
    }
}

/// Initialize tracing subscriber; `RUST_LOG` wins over `fallback`.
fn init_tracing(fallback: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_settings(path: Option<&Path>, namespace: Option<String>) -> Result<Settings> {
    let mut settings = Settings::load(path)
        .context("Failed to load settings")?
        .with_env_api_key(std::env::var(API_KEY_ENV).ok());
    if namespace.is_some() {
        settings.controller.namespace = namespace;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

async fn run(config: Option<&Path>, namespace: Option<String>) -> Result<()> {
    let settings = load_settings(config, namespace)?;
    info!(
        namespace = settings.controller.namespace.as_deref().unwrap_or("<all>"),
        email = settings.escalation.sendgrid_api_key.is_some(),
        "vigil starting"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Check in-cluster config or KUBECONFIG")?;

    let escalations = vigil_notify::default_registry(
        settings.email_config(),
        &settings.escalation.subject_prefix,
    )
    .context("Failed to build escalation handlers")?;

    let ctx = ReconcilerContext {
        backend: Arc::new(KubeJobBackend::new(client.clone(), settings.job_config())),
        store: Arc::new(KubeStatusStore::new(client.clone())),
        escalations: Arc::new(escalations),
        clock: Arc::new(SystemClock),
        config: settings.reconciler_config(),
    };

    let events = watch_checks(client, settings.controller.namespace.clone());
    Controller::new(ctx, settings.controller_config())
        .run(events, shutdown_signal())
        .await
        .context("Controller stopped")?;

    info!("vigil stopped gracefully");
    Ok(())
}
