use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod auth;
mod board;
mod flow;
mod session;

use auth::LoginArgs;
use board::{GroupCommand, TaskCommand};
use flow::FlowCommand;
use kanban_storage::StorageMode;

#[derive(Parser, Debug)]
#[command(name = "kanban")]
#[command(about = "Kanban board and workflow canvas", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the config file and `KANBAN_*` environment.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    #[arg(long, global = true)]
    pub mode: Option<StorageMode>,
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Answer yes to confirmation prompts.
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Manage board tasks
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },
    /// Manage task groups
    Group {
        #[command(subcommand)]
        action: GroupCommand,
    },
    /// Manage the workflow canvas
    Flow {
        #[command(subcommand)]
        action: FlowCommand,
    },
    /// Store an API token after checking it with the server
    Login(LoginArgs),
    /// Forget the stored API token
    Logout,
    /// Show the active backend and account
    Whoami,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Task { action } => board::handle_task_command(&cli.global, action),
        Commands::Group { action } => board::handle_group_command(&cli.global, action),
        Commands::Flow { action } => flow::handle_flow_command(&cli.global, action),
        Commands::Login(args) => auth::login(&cli.global, &args),
        Commands::Logout => auth::logout(&cli.global),
        Commands::Whoami => auth::whoami(&cli.global),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands_with_global_flags() {
        let cli = Cli::try_parse_from([
            "kanban",
            "task",
            "add",
            "Ship docs",
            "--status",
            "in-progress",
            "--group",
            "Docs",
            "--mode",
            "local",
            "-y",
        ])
        .expect("parse");
        assert!(cli.global.yes);
        assert_eq!(cli.global.mode, Some(StorageMode::Local));
        match cli.command {
            Commands::Task {
                action: TaskCommand::Add(args),
            } => {
                assert_eq!(args.text, "Ship docs");
                assert_eq!(args.group.as_deref(), Some("Docs"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn group_and_ungroup_conflict() {
        assert!(Cli::try_parse_from(["kanban", "task", "edit", "1", "--group", "A", "--ungroup"])
            .is_err());
    }

    #[test]
    fn flow_drag_accepts_negative_offsets() {
        let cli = Cli::try_parse_from(["kanban", "flow", "drag", "17", "--", "-40", "25.5"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Flow {
                action: FlowCommand::Drag(_)
            }
        ));
    }
}
