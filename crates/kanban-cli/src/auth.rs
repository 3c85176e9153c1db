use crate::session::resolve_config;
use crate::GlobalArgs;
use anyhow::{bail, Context, Result};
use clap::Args;
use kanban_storage::{ClientConfig, RemoteStorage, StorageMode};
use tracing::info;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Token printed by `kanban-hub add-user`
    #[arg(long)]
    pub token: String,
    #[arg(long)]
    pub api_url: Option<String>,
}

pub fn login(global: &GlobalArgs, args: &LoginArgs) -> Result<()> {
    let token = args.token.trim();
    if token.is_empty() {
        bail!("Token cannot be empty");
    }
    let (config, path) = resolve_config(global)?;
    let api_url = args
        .api_url
        .clone()
        .unwrap_or_else(|| config.api_url().to_string());

    let remote = RemoteStorage::new(&api_url, token)?;
    let user = remote
        .current_user()
        .with_context(|| format!("Token was rejected by {api_url}"))?;

    let mut stored = ClientConfig::load(&path)?;
    stored.mode = StorageMode::Remote;
    stored.api_url = Some(api_url.clone());
    stored.token = Some(token.to_string());
    stored.save(&path)?;
    info!(event = "login", username = %user.username, api_url = %api_url);
    println!("Signed in as {} ({api_url}).", user.username);
    Ok(())
}

pub fn logout(global: &GlobalArgs) -> Result<()> {
    let path = config_path(global);
    let mut stored = ClientConfig::load(&path)?;
    if stored.token.take().is_none() {
        println!("Not signed in.");
        return Ok(());
    }
    stored.mode = StorageMode::Local;
    stored.save(&path)?;
    println!("Signed out; using local storage.");
    Ok(())
}

pub fn whoami(global: &GlobalArgs) -> Result<()> {
    let (config, _) = resolve_config(global)?;
    match config.mode {
        StorageMode::Local => {
            println!("local storage in {}", config.data_dir().display());
        }
        StorageMode::Remote => {
            let Some(token) = config.token.as_deref() else {
                bail!("Remote mode without a token; run `kanban login --token <token>`");
            };
            let remote = RemoteStorage::new(config.api_url(), token)?;
            let user = remote.current_user()?;
            println!("{} (id {}) at {}", user.username, user.id, config.api_url());
        }
    }
    Ok(())
}

fn config_path(global: &GlobalArgs) -> std::path::PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(ClientConfig::default_path)
}
