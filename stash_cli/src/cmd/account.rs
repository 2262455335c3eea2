use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use stash_fs::NamespaceResolver;
use stash_node::accounts::hash_password;
use stash_node::config::{StashNodeConfig, resolve_path};
use toml_edit::{Item, Table};
use tracing::info;

use crate::init_config::{read_config_document, table_mut, write_config_document};

#[derive(Subcommand)]
pub enum CmdAccount {
    /// Creates an account with a fresh namespace and provisions its storage
    Add {
        username: String,
        /// Password the account logs in with
        #[arg(long)]
        password: String,
    },
    /// Lists configured accounts and their namespaces
    List,
}

impl CmdAccount {
    pub fn run(self, node_config_file: &Path) -> Result<()> {
        match self {
            Self::Add { username, password } => add_account(node_config_file, &username, &password),
            Self::List => {
                let config = StashNodeConfig::load(node_config_file)?;
                for (username, account) in &config.account {
                    println!("{username}\t{}", account.namespace);
                }
                Ok(())
            }
        }
    }
}

fn add_account(node_config_file: &Path, username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        bail!("username must not be empty");
    }
    if password.is_empty() {
        bail!("password must not be empty");
    }

    let config = StashNodeConfig::load(node_config_file)
        .context("run `stash config init` before adding accounts")?;
    if config.account.contains_key(username) {
        bail!("account {username:?} already exists");
    }

    let base_path = resolve_path(node_config_file.parent(), &config.storage.base_path);
    let namespaces = NamespaceResolver::new(&base_path)
        .with_context(|| format!("storage base path {base_path:?} is not a usable directory"))?;
    let namespace = uuid::Uuid::new_v4().to_string();
    namespaces.provision(&namespace)?;

    let mut doc = read_config_document(node_config_file)?;
    let mut account = Table::new();
    account.insert("namespace", namespace.as_str().into());
    account.insert("password_hash", hash_password(password).into());
    let accounts = table_mut(&mut doc, "account")?;
    accounts.set_implicit(true);
    accounts.insert(username, Item::Table(account));
    write_config_document(node_config_file, &doc)?;

    info!(username, namespace, "account created");
    println!("{namespace}");
    Ok(())
}
