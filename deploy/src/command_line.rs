use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use crate::{
    client::RpcConnector,
    contracts::ArtifactStore,
    deploy::{DeploySettings, DeploymentExecutor},
    errors::Error,
    network::{NetworkRegistry, DEFAULT_NETWORK},
    task::{parse_raw_args, TaskEnvironment, TaskRegistry},
};

#[derive(Debug, Parser)]
#[command(version, about = "Deploys compiled contracts to configured networks")]
pub struct CommandLine {
    /// Network to run against
    #[clap(short, long, env = "DEPLOY_NETWORK", default_value = DEFAULT_NETWORK)]
    network: String,

    /// Directory holding the compiler's contract artifacts
    #[clap(long, env = "DEPLOY_ARTIFACTS", default_value = "artifacts")]
    artifacts: PathBuf,

    /// Blocks to wait for on top of the block including the deployment
    #[clap(long, env = "DEPLOY_CONFIRMATIONS", default_value_t = 0)]
    confirmations: u64,

    /// Seconds to wait for the deployment to be confirmed
    #[clap(long, env = "DEPLOY_TIMEOUT_SECS", default_value_t = 300)]
    timeout: u64,

    /// Milliseconds between receipt polls
    #[clap(long, env = "DEPLOY_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval: u64,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a task, passing its parameters as `--name value`
    Run(RunArgs),
    /// List the available tasks and their parameters
    Tasks,
    /// List the configured networks
    Networks,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Also print the deployment result as JSON
    #[arg(long)]
    json: bool,

    task: String,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl CommandLine {
    fn settings(&self) -> DeploySettings {
        DeploySettings {
            confirmations: self.confirmations,
            timeout: Duration::from_secs(self.timeout),
            poll_interval: Duration::from_millis(self.poll_interval),
        }
    }

    pub async fn execute(self, networks: NetworkRegistry) -> Result<()> {
        let tasks = TaskRegistry::with_builtin_tasks();
        match &self.command {
            Command::Tasks => {
                for task in tasks.definitions() {
                    println!("{}: {}", task.name, task.description);
                    for parameter in &task.parameters {
                        println!(
                            "  --{}{}  {}",
                            parameter.name,
                            if parameter.required { "" } else { " (optional)" },
                            parameter.description
                        );
                    }
                }
                Ok(())
            }
            Command::Networks => {
                for network in networks.networks() {
                    println!(
                        "{}: chain id {}, {}, {} account(s)",
                        network.name,
                        network.chain_id,
                        network.rpc_url().unwrap_or("in-memory"),
                        network.accounts.len()
                    );
                }
                Ok(())
            }
            Command::Run(run) => {
                let raw = parse_raw_args(&run.args)?;
                let settings = self.settings();
                log::debug!("deploy settings {:?}", settings);
                let executor = DeploymentExecutor::new(
                    ArtifactStore::new(&self.artifacts),
                    RpcConnector::new(settings.poll_interval),
                    settings,
                );
                let environment = TaskEnvironment {
                    networks: &networks,
                    network: &self.network,
                    deployer: &executor,
                };

                let mut stdout = std::io::stdout();
                let result = tokio::select! {
                    result = tasks.invoke(&run.task, &raw, &environment, &mut stdout) => {
                        if let Err(Error::Deploy(err)) = &result {
                            if let Some(tx_hash) = err.transaction_hash() {
                                log::warn!("transaction {:?} was broadcast, check it before deploying again", tx_hash);
                            }
                        }
                        result?
                    }
                    _ = tokio::signal::ctrl_c() => {
                        let broadcast = executor.broadcast_hashes();
                        if broadcast.is_empty() {
                            bail!("interrupted before any transaction was broadcast");
                        }
                        bail!(
                            "interrupted after broadcasting {:?}, the transaction is not retracted and may still be mined",
                            broadcast
                        );
                    }
                };
                if run.json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Ok(())
            }
        }
    }
}
