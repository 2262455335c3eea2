use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use stash_node::config::StashNodeConfig;

#[derive(Subcommand)]
pub enum CmdToken {
    /// Prints an identity token for an existing namespace
    Issue {
        #[arg(long, value_name = "ID")]
        namespace: String,
    },
}

impl CmdToken {
    pub fn run(self, node_config_file: &Path) -> Result<()> {
        match self {
            Self::Issue { namespace } => {
                let config = StashNodeConfig::load(node_config_file)?;
                let tree = stash_node::create_file_tree(&config, node_config_file.parent())?;
                tree.namespaces().resolve_root(&namespace)?;
                println!("{}", tree.tokens().issue(&namespace)?);
                Ok(())
            }
        }
    }
}
