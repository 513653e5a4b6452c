//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vigil - scheduled container checks for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version)]
#[command(about = "Runs container checks on a schedule and escalates persistent failures")]
#[command(
    long_about = "vigil watches Check resources, runs each check as a Kubernetes Job on its own schedule, records the result in the resource status and escalates checks that keep failing."
)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "VIGIL_LOG", default_value = "info")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the controller
    Run {
        /// Only watch checks in this namespace
        #[arg(short, long, env = "VIGIL_NAMESPACE")]
        namespace: Option<String>,
    },

    /// Print the Check CustomResourceDefinition
    Crd,

    /// Print the CRD, RBAC and Deployment manifests
    Manifests {
        /// Namespace the controller is installed in
        #[arg(short, long, default_value = "vigil-system")]
        namespace: String,

        /// Controller image
        #[arg(long, default_value = "ghcr.io/lprior-repo/vigil:latest")]
        image: String,
    },
}
