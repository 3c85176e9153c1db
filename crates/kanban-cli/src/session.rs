use crate::GlobalArgs;
use anyhow::{bail, Context, Result};
use kanban_core::{App, AppContext, BoardError, Command, Confirm, Outcome};
use kanban_storage::ClientConfig;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::warn;

/// Loaded board plus the config it came from.
pub struct Session {
    pub app: App,
    config: ClientConfig,
    config_path: PathBuf,
    prompt: Prompt,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let (config, config_path) = resolve_config(global)?;
        let backend = config.open_backend()?;
        let mut session = Self {
            app: App::new(AppContext::from_boxed(backend)),
            config,
            config_path,
            prompt: Prompt {
                assume_yes: global.yes,
            },
        };
        match session.app.load() {
            Ok(()) => Ok(session),
            Err(err) => Err(session.fail(err)),
        }
    }

    pub fn run(&mut self, command: Command) -> Result<Outcome> {
        match self.app.dispatch(command, &mut self.prompt) {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Turns a board error into a CLI error. Auth failures also drop the
    /// stored token so the next run asks for a new one.
    fn fail(&mut self, err: BoardError) -> anyhow::Error {
        if err.is_fatal() && self.config.token.is_some() {
            let mut stored = ClientConfig::load(&self.config_path).unwrap_or_default();
            stored.token = None;
            if let Err(save_err) = stored.save(&self.config_path) {
                warn!(event = "token_clear_failed", error = %save_err);
            }
            return anyhow::anyhow!("{err}; run `kanban login --token <token>`");
        }
        anyhow::Error::new(err)
    }
}

pub fn resolve_config(global: &GlobalArgs) -> Result<(ClientConfig, PathBuf)> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(ClientConfig::default_path);
    let mut config = ClientConfig::resolve(&path)?;
    if let Some(mode) = global.mode {
        config.mode = mode;
    }
    if let Some(dir) = &global.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(url) = &global.api_url {
        config.api_url = Some(url.clone());
    }
    Ok((config, path))
}

/// `[y/N]` prompt on stdin, skipped with `--yes`.
pub struct Prompt {
    pub assume_yes: bool,
}

impl Confirm for Prompt {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let mut stderr = io::stderr();
        let _ = write!(stderr, "{prompt} [y/N] ");
        let _ = stderr.flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub fn parse_number(value: &str, what: &str) -> Result<f64> {
    let number: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("{what} must be a number, got '{value}'"))?;
    if !number.is_finite() {
        bail!("{what} must be finite");
    }
    Ok(number)
}
