use crate::cmd::CmdAccount;
use crate::cmd::CmdToken;
use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;

mod cmd;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which stash node this command should run on
    #[arg(short, long, value_name = "NAME", default_value = "local")]
    node: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the node's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Manage the accounts that may log in to this node
    Account {
        #[command(subcommand)]
        cmd: CmdAccount,
    },
    /// Issue identity tokens without going through login
    Token {
        #[command(subcommand)]
        cmd: CmdToken,
    },
    /// Start the node and serve its namespaces over HTTP
    Start,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Configs under ~/.config/stash/ (local.toml, or nodes/<name>.toml),
    // namespace data under ~/.local/share/stash/.
    let dirs =
        ProjectDirs::from("", "", "stash").context("failed to determine config directory path")?;

    let config_root = dirs.config_dir();
    let node_config_file = if cli.node == "local" {
        config_root.join("local.toml")
    } else {
        config_root
            .join("nodes")
            .join(&cli.node)
            .with_extension("toml")
    };

    let local_data_dir = dirs.data_dir().join(&cli.node);

    cmd::run_command(node_config_file, &local_data_dir, cli.cmd).await
}
