use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Subcommand;
use rand::RngCore;
use toml_edit::{DocumentMut, Item, Table};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates node config file if it doesn't exist and generates a signing key
    Init,
}

impl CmdConfig {
    pub fn run(self, node_config_file: PathBuf, local_data_dir: &Path) -> anyhow::Result<()> {
        let mut doc = read_config_document(&node_config_file)?;

        match self {
            Self::Init => {
                let secretkey_file = node_config_file.with_extension("secretkey");
                let secretkey_name = secretkey_file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .context("config file name is not valid UTF-8")?
                    .to_owned();
                table_mut(&mut doc, "identity")?.insert("secret_key_file", secretkey_name.into());

                let namespaces_dir = local_data_dir.join("namespaces");
                let storage = table_mut(&mut doc, "storage")?;
                if !storage.contains_key("base_path") {
                    let base_path = namespaces_dir
                        .to_str()
                        .context("data directory path is not valid UTF-8")?;
                    storage.insert("base_path", base_path.into());
                }
                fs::create_dir_all(&namespaces_dir)
                    .with_context(|| format!("could not create {namespaces_dir:?}"))?;

                let http = table_mut(&mut doc, "http")?;
                if !http.contains_key("listen_addr") {
                    http.insert("listen_addr", "127.0.0.1:8080".into());
                }

                if !secretkey_file.exists() {
                    info!("generating secure random signing key for node");
                    let mut bytes = [0u8; 32];
                    rand::rng().fill_bytes(&mut bytes);
                    fs::write(secretkey_file, bytes)?;
                }
            }
        }

        write_config_document(&node_config_file, &doc)
    }
}

pub fn read_config_document(node_config_file: &Path) -> anyhow::Result<DocumentMut> {
    let content = if node_config_file.exists() {
        fs::read_to_string(node_config_file)?
    } else {
        if let Some(parent) = node_config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        String::new()
    };
    content
        .parse::<DocumentMut>()
        .context("could not parse node config file")
}

/// Writes through a temporary file and a rename so a crash never leaves a
/// half-written config behind.
pub fn write_config_document(node_config_file: &Path, doc: &DocumentMut) -> anyhow::Result<()> {
    info!("writing to config file {node_config_file:?}");

    let tmp_path = node_config_file.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(doc.to_string().as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, node_config_file)?;
    Ok(())
}

pub fn table_mut<'a>(doc: &'a mut DocumentMut, key: &str) -> anyhow::Result<&'a mut Table> {
    doc.entry(key)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("`{key}` in node config is not a table"))
}
