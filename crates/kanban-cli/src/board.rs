use crate::session::Session;
use crate::GlobalArgs;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use kanban_core::view::{board_view, BoardView, CardView};
use kanban_core::{Command, Outcome, Removal, TaskDraft, TaskId, TaskPatch, TaskStatus};
use std::fmt::Write as _;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum TaskCommand {
    List(TaskListArgs),
    Add(TaskAddArgs),
    Edit(TaskEditArgs),
    Move(TaskMoveArgs),
    #[command(alias = "remove")]
    Rm(TaskTargetArgs),
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum GroupCommand {
    List,
    Add(GroupNameArgs),
    #[command(alias = "remove")]
    Rm(GroupNameArgs),
}

#[derive(Args, Debug)]
pub struct TaskListArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskAddArgs {
    pub text: String,
    #[arg(long)]
    pub emoji: Option<String>,
    #[arg(long, default_value = "not-started")]
    pub status: TaskStatus,
    #[arg(long)]
    pub group: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskEditArgs {
    pub id: String,
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long)]
    pub emoji: Option<String>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long, conflicts_with = "ungroup")]
    pub group: Option<String>,
    #[arg(long, conflicts_with = "group")]
    pub ungroup: bool,
}

#[derive(Args, Debug)]
pub struct TaskMoveArgs {
    pub id: String,
    pub status: TaskStatus,
}

#[derive(Args, Debug)]
pub struct TaskTargetArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct GroupNameArgs {
    pub name: String,
}

pub fn handle_task_command(global: &GlobalArgs, command: TaskCommand) -> Result<()> {
    let mut session = Session::open(global)?;

    match command {
        TaskCommand::List(args) => list_tasks(&session, &args),
        TaskCommand::Add(args) => {
            let mut draft = TaskDraft::new(args.text, args.status);
            draft.emoji = args.emoji;
            draft.group = args.group;
            if let Outcome::Task(task) = session.run(Command::CreateTask(draft))? {
                println!("Added task [{}] {} {}.", task.id, task.emoji, task.text);
            }
            Ok(())
        }
        TaskCommand::Edit(args) => {
            let patch = TaskPatch {
                text: args.text,
                emoji: args.emoji,
                status: args.status,
                group: if args.ungroup {
                    Some(None)
                } else {
                    args.group.map(Some)
                },
                version: None,
            };
            if patch.is_empty() {
                bail!("Nothing to change; pass --text, --emoji, --status, --group or --ungroup.");
            }
            let id = TaskId::new(args.id);
            report_task(session.run(Command::UpdateTask { id: id.clone(), patch })?, &id, "Updated")
        }
        TaskCommand::Move(args) => {
            let id = TaskId::new(args.id);
            let outcome = session.run(Command::MoveTask {
                id: id.clone(),
                status: args.status,
            })?;
            report_task(outcome, &id, "Moved")
        }
        TaskCommand::Rm(args) => {
            let id = TaskId::new(args.id);
            let outcome = session.run(Command::DeleteTask { id: id.clone() })?;
            report_removal(outcome, &format!("task [{id}]"));
            Ok(())
        }
    }
}

pub fn handle_group_command(global: &GlobalArgs, command: GroupCommand) -> Result<()> {
    let mut session = Session::open(global)?;

    match command {
        GroupCommand::List => {
            let store = session.app.board().store();
            if store.groups().is_empty() {
                println!("No groups.");
            }
            for group in store.groups() {
                let members = store
                    .tasks()
                    .iter()
                    .filter(|task| task.group.as_deref() == Some(group.as_str()))
                    .count();
                println!("{group} ({members})");
            }
            Ok(())
        }
        GroupCommand::Add(args) => {
            if let Outcome::Group(name) = session.run(Command::CreateGroup { name: args.name })? {
                println!("Added group '{name}'.");
            }
            Ok(())
        }
        GroupCommand::Rm(args) => {
            let label = format!("group '{}'", args.name);
            let outcome = session.run(Command::DeleteGroup { name: args.name })?;
            report_removal(outcome, &label);
            Ok(())
        }
    }
}

fn list_tasks(session: &Session, args: &TaskListArgs) -> Result<()> {
    let store = session.app.board().store();
    if args.json {
        let payload = serde_json::json!({
            "tasks": store.tasks(),
            "groups": store.groups(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    print!("{}", render_board(&board_view(store)));
    Ok(())
}

fn report_task(outcome: Outcome, id: &TaskId, verb: &str) -> Result<()> {
    match outcome {
        Outcome::Task(task) => {
            println!("{verb} task [{}] -> {} ({}).", task.id, task.text, task.status);
            Ok(())
        }
        _ => {
            println!("No task [{id}]; nothing changed.");
            Ok(())
        }
    }
}

pub fn report_removal(outcome: Outcome, label: &str) {
    match outcome {
        Outcome::Removal(Removal::Removed) => println!("Removed {label}."),
        Outcome::Removal(Removal::Declined) => println!("Kept {label}."),
        _ => println!("No {label}; nothing changed."),
    }
}

/// Plain-text board: one block per column, ungrouped cards first.
pub fn render_board(view: &BoardView) -> String {
    let mut out = String::new();
    for column in &view.columns {
        let _ = writeln!(
            out,
            "{} {} ({})",
            column.status.icon(),
            column.status.label(),
            column.count
        );
        if column.count == 0 {
            let _ = writeln!(out, "  (empty)");
        }
        for card in &column.ungrouped {
            let _ = writeln!(out, "  {}", card_line(card));
        }
        for section in &column.groups {
            let _ = writeln!(out, "  [{}]", section.name);
            for card in &section.cards {
                let _ = writeln!(out, "    {}", card_line(card));
            }
        }
        out.push('\n');
    }
    out
}

fn card_line(card: &CardView) -> String {
    let moves: Vec<&str> = card.quick_moves.iter().map(|status| status.as_str()).collect();
    format!(
        "{} {}  #{}  -> {}",
        card.emoji,
        card.text,
        card.id,
        moves.join(" | ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_core::{Task, TaskStore};

    fn task(id: &str, text: &str, status: TaskStatus, group: Option<&str>) -> Task {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "text": text,
            "status": status,
            "group": group,
            "createdAt": "2024-02-27T01:00:00Z"
        }))
        .expect("task")
    }

    #[test]
    fn board_text_lists_sections_in_order() {
        let store = TaskStore::new(
            vec![
                task("1", "Write intro", TaskStatus::NotStarted, Some("Docs")),
                task("2", "Triage", TaskStatus::NotStarted, None),
                task("3", "Release", TaskStatus::Done, None),
            ],
            vec!["Docs".to_string()],
        );
        let text = render_board(&board_view(&store));
        let expected = "\
○ Not started (2)
  📝 Triage  #2  -> in-progress | done
  [Docs]
    📝 Write intro  #1  -> in-progress | done

◐ In progress (0)
  (empty)

● Done (1)
  📝 Release  #3  -> not-started | in-progress

";
        assert_eq!(text, expected);
    }
}
