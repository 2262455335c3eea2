use std::path::{Path, PathBuf};

use anyhow::Result;
use stash_node::config::StashNodeConfig;

mod account;
mod token;

pub use account::CmdAccount;
pub use token::CmdToken;

pub async fn run_command(
    node_config_file: PathBuf,
    local_data_dir: &Path,
    cmd: crate::Commands,
) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd } => cmd.run(node_config_file, local_data_dir),
        crate::Commands::Account { cmd } => cmd.run(&node_config_file),
        crate::Commands::Token { cmd } => cmd.run(&node_config_file),
        crate::Commands::Start => {
            let config = StashNodeConfig::load(&node_config_file)?;
            stash_node::run_node(node_config_file, config).await
        }
    }
}
