mod state;
mod theme;
mod ui;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use kanban_core::{App as Board, AppContext, BoardStorage};
use kanban_storage::{ClientConfig, LocalStore, StorageMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    sync::Mutex,
    time::Duration,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kanban-board", about = "Terminal kanban board and workflow canvas")]
struct Args {
    #[arg(long)]
    mode: Option<StorageMode>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(ClientConfig::default_path);
    let mut config = ClientConfig::resolve(&config_path)?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(url) = args.api_url {
        config.api_url = Some(url);
    }
    init_logging(&config.data_dir());

    let backend = config.open_backend()?;
    let label = backend.describe();
    let mut app = state::App::new(Board::new(AppContext::from_boxed(backend)), label);
    app.reload();

    let (watcher, watch_rx) = match config.mode {
        StorageMode::Local => {
            let store = LocalStore::open(config.data_dir())?;
            setup_watcher(store.path())
        }
        StorageMode::Remote => (None, None),
    };

    let result = if app.fatal.is_none() {
        let mut terminal = setup_terminal()?;
        let result = run_app(&mut terminal, &mut app, watch_rx);
        restore_terminal(&mut terminal)?;
        result
    } else {
        Ok(())
    };
    drop(watcher);

    if let Some(reason) = &app.fatal {
        forget_token(&config_path);
        bail!("{reason}; run `kanban login --token <token>`");
    }
    if let Err(err) = result {
        eprintln!("kanban-board: {err}");
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut state::App,
    watch_rx: Option<Receiver<()>>,
) -> Result<()> {
    let input_poll = Duration::from_millis(100);

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(input_poll)? {
            match event::read()? {
                Event::Key(key) => {
                    if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
                        app.handle_key(key);
                    }
                }
                Event::Mouse(mouse) => {
                    app.handle_mouse(mouse);
                }
                _ => {}
            }
        }

        if let Some(rx) = &watch_rx {
            let mut changed = false;
            while rx.try_recv().is_ok() {
                changed = true;
            }
            if changed {
                app.on_external_change();
            }
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

/// Watches the store file's directory and signals when the file itself
/// changes. Our own writes come back through here too.
fn setup_watcher(store_path: &Path) -> (Option<RecommendedWatcher>, Option<Receiver<()>>) {
    let Some(dir) = store_path.parent().map(Path::to_path_buf) else {
        return (None, None);
    };
    let file_name = store_path.file_name().map(|name| name.to_os_string());
    let (tx, rx) = mpsc::sync_channel(1);
    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            let touches_store = event
                .paths
                .iter()
                .any(|path| path.file_name().map(|name| name.to_os_string()) == file_name);
            if touches_store && (event.kind.is_modify() || event.kind.is_create()) {
                let _ = tx.try_send(());
            }
        },
        Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(event = "watch_failed", error = %err);
            return (None, None);
        }
    };

    if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        warn!(event = "watch_failed", dir = %dir.display(), error = %err);
        return (None, None);
    }
    (Some(watcher), Some(rx))
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging(data_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("KANBAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    if std::fs::create_dir_all(data_dir).is_err() {
        return;
    }
    let file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("kanban-board.log"))
    {
        Ok(file) => file,
        Err(_) => return,
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    info!(event = "board_start", data_dir = %data_dir.display());
}

fn forget_token(path: &Path) {
    let result = ClientConfig::load(path).and_then(|mut stored| {
        stored.token = None;
        stored.save(path)
    });
    if let Err(err) = result.context("Failed to clear stored token") {
        warn!(event = "token_clear_failed", error = %err);
    }
}
