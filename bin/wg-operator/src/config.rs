//! Command line and environment configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use kube_runtime::controller::Action;
use wg_core::Outcome;

#[derive(Parser, Debug)]
#[command(name = "wg-operator", version, about = "WireGuard VPN operator")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controllers (default)
    Run(RunArgs),
    /// Print the custom resource definitions as YAML
    Crd,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Watch a single namespace instead of the whole cluster
    #[arg(long, env = "WG_OPERATOR_NAMESPACE")]
    pub namespace: Option<String>,

    /// Address of the health and metrics endpoints
    #[arg(long, env = "WG_OPERATOR_PROBE_ADDR", default_value = "0.0.0.0:8081")]
    pub probe_addr: SocketAddr,

    #[arg(long, env = "WG_OPERATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Seconds before the next pass after an artifact was written
    #[arg(long, env = "WG_OPERATOR_REQUEUE_AFTER_APPLY", default_value_t = 1)]
    pub requeue_after_apply: u64,

    /// Seconds before retrying a resource waiting on a dependency
    #[arg(long, env = "WG_OPERATOR_REQUEUE_WAITING", default_value_t = 5)]
    pub requeue_waiting: u64,

    /// Seconds between passes over converged resources
    #[arg(long, env = "WG_OPERATOR_RESYNC_INTERVAL", default_value_t = 300)]
    pub resync_interval: u64,

    /// Seconds before retrying a failed pass
    #[arg(long, env = "WG_OPERATOR_ERROR_REQUEUE", default_value_t = 60)]
    pub error_requeue: u64,
}

impl RunArgs {
    pub fn requeue(&self) -> Requeue {
        Requeue {
            after_apply: Duration::from_secs(self.requeue_after_apply),
            waiting: Duration::from_secs(self.requeue_waiting),
            resync: Duration::from_secs(self.resync_interval),
            error: Duration::from_secs(self.error_requeue),
        }
    }

    /// Api scoped to the configured namespace, or cluster wide
    pub fn api<K>(&self, client: Client) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        }
    }
}

/// Requeue delays per reconcile outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requeue {
    pub after_apply: Duration,
    pub waiting: Duration,
    pub resync: Duration,
    pub error: Duration,
}

impl Requeue {
    pub fn action(&self, outcome: &Outcome) -> Action {
        match outcome {
            Outcome::Applied(_) => Action::requeue(self.after_apply),
            Outcome::Waiting(_) => Action::requeue(self.waiting),
            Outcome::StatusUpdated | Outcome::Converged => Action::requeue(self.resync),
            Outcome::Stalled(_) => Action::await_change(),
        }
    }

    pub fn on_error(&self) -> Action {
        Action::requeue(self.error)
    }
}
