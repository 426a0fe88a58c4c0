//! Command-line interface of `stevedore-worker`

use clap::Parser;
use std::path::PathBuf;

use stevedore_core::application::{ConnectionFailurePolicy, LaunchRequest, DEFAULT_WORKER_CLASS};

#[derive(Parser, Debug)]
#[command(name = "stevedore-worker")]
#[command(about = "Run workers that process jobs from Stevedore queues", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Queues to work on, highest priority first (default: "default")
    pub queues: Vec<String>,

    /// Run in burst mode (quit after all work is done)
    #[arg(long)]
    pub burst: bool,

    /// Worker implementation to use
    #[arg(long, default_value = DEFAULT_WORKER_CLASS)]
    pub worker_class: String,

    /// Name of the worker; spawned workers are named "{name}.{index}"
    #[arg(long)]
    pub name: Option<String>,

    /// Number of worker processes to start
    #[arg(long, default_value_t = 1)]
    pub count: usize,

    /// Configuration file (TOML)
    #[arg(long, env = "STEVEDORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker URL (overrides the configuration file)
    #[arg(long, env = "STEVEDORE_BROKER_URL")]
    pub broker_url: Option<String>,

    /// What to do when the broker is unreachable: report (exit 0) or fail (exit 1)
    #[arg(long, value_name = "POLICY")]
    pub on_connection_error: Option<ConnectionFailurePolicy>,
}

impl Cli {
    pub fn launch_request(&self) -> LaunchRequest {
        LaunchRequest {
            queues: self.queues.clone(),
            count: self.count,
            name: self.name.clone(),
            worker_class: self.worker_class.clone(),
            burst: self.burst,
        }
    }

    /// Flags every spawned worker process inherits from this one
    pub fn shared_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        if let Some(url) = &self.broker_url {
            args.push("--broker-url".to_string());
            args.push(url.clone());
        }
        if let Some(policy) = self.on_connection_error {
            args.push("--on-connection-error".to_string());
            args.push(
                match policy {
                    ConnectionFailurePolicy::Report => "report",
                    ConnectionFailurePolicy::Fail => "fail",
                }
                .to_string(),
            );
        }
        args
    }
}
