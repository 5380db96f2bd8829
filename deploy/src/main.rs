mod client;
mod command_line;
mod contracts;
mod deploy;
mod errors;
mod network;
mod task;
mod utils;

use anyhow::Result;
use clap::Parser;
use command_line::CommandLine;
use network::{Credentials, NetworkRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cmd = CommandLine::parse();
    let networks = NetworkRegistry::new(&Credentials::from_env())?;
    cmd.execute(networks).await
}
