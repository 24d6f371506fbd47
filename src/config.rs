//! Command line and environment configuration for the API server binary

use crate::retry::Backoff;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "lab-apiserver")]
#[command(about = "REST front-ends for lab environments, progress and VM claims", long_about = None)]
pub struct Config {
    /// Address to serve HTTP on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Namespace holding the custom resources
    #[arg(long, env = "HF_NAMESPACE", default_value = "hobbyfarm")]
    pub namespace: String,

    /// YAML file with bearer tokens and their permissions
    #[arg(long, env = "AUTH_FILE")]
    pub auth_file: PathBuf,

    /// Attempts per optimistic update
    #[arg(long, env = "RETRY_STEPS", default_value_t = 5)]
    pub retry_steps: u32,

    /// Base delay between attempts
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 10)]
    pub retry_delay_ms: u64,

    /// Wall-clock budget for one optimistic update
    #[arg(long, env = "RETRY_BUDGET_SECS", default_value_t = 10)]
    pub retry_budget_secs: u64,
}

impl Config {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            steps: self.retry_steps,
            duration: Duration::from_millis(self.retry_delay_ms),
            max_elapsed: Duration::from_secs(self.retry_budget_secs),
            ..Backoff::default()
        }
    }
}
