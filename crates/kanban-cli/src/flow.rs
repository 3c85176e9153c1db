use crate::board::report_removal;
use crate::session::{parse_number, Session};
use crate::GlobalArgs;
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use kanban_core::{Command, Outcome, Selection, WorkflowDocument, WorkflowDraft, WorkflowPatch};
use std::fmt::Write as _;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum FlowCommand {
    /// Print nodes and connections
    Show(FlowShowArgs),
    Add(FlowAddArgs),
    Edit(FlowEditArgs),
    #[command(alias = "remove")]
    Rm(FlowTargetArgs),
    /// Place a node at absolute coordinates
    Move(FlowMoveArgs),
    /// Shift a node by an offset, as a mouse drag would
    Drag(FlowDragArgs),
    Connect(FlowConnectArgs),
    /// Remove every connection
    Clear,
}

#[derive(Args, Debug)]
pub struct FlowShowArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct FlowAddArgs {
    pub title: String,
    #[arg(long)]
    pub emoji: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct FlowEditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    /// Pass an empty value to clear.
    #[arg(long)]
    pub emoji: Option<String>,
    /// Pass an empty value to clear.
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct FlowTargetArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct FlowMoveArgs {
    pub id: String,
    #[arg(allow_negative_numbers = true)]
    pub x: String,
    #[arg(allow_negative_numbers = true)]
    pub y: String,
}

#[derive(Args, Debug)]
pub struct FlowDragArgs {
    pub id: String,
    #[arg(allow_negative_numbers = true)]
    pub dx: String,
    #[arg(allow_negative_numbers = true)]
    pub dy: String,
}

#[derive(Args, Debug)]
pub struct FlowConnectArgs {
    pub from: String,
    pub to: String,
}

pub fn handle_flow_command(global: &GlobalArgs, command: FlowCommand) -> Result<()> {
    let mut session = Session::open(global)?;

    match command {
        FlowCommand::Show(args) => {
            let doc = session.app.workflow().store().document();
            if args.json {
                println!("{}", serde_json::to_string_pretty(doc)?);
            } else {
                print!("{}", render_workflow(doc));
            }
            Ok(())
        }
        FlowCommand::Add(args) => {
            let draft = WorkflowDraft {
                title: args.title,
                emoji: args.emoji,
                description: args.description,
            };
            if let Outcome::Node(node) = session.run(Command::CreateNode(draft))? {
                println!(
                    "Added node [{}] {} at ({:.0}, {:.0}).",
                    node.id, node.title, node.x, node.y
                );
            }
            Ok(())
        }
        FlowCommand::Edit(args) => {
            let patch = WorkflowPatch {
                title: args.title,
                emoji: args.emoji,
                description: args.description,
            };
            if patch == WorkflowPatch::default() {
                bail!("Nothing to change; pass --title, --emoji or --description.");
            }
            match session.run(Command::UpdateNode {
                id: args.id.clone(),
                patch,
            })? {
                Outcome::Node(node) => println!("Updated node [{}] {}.", node.id, node.title),
                _ => println!("No node [{}]; nothing changed.", args.id),
            }
            Ok(())
        }
        FlowCommand::Rm(args) => {
            let label = format!("node [{}]", args.id);
            let outcome = session.run(Command::DeleteNode { id: args.id })?;
            report_removal(outcome, &label);
            Ok(())
        }
        FlowCommand::Move(args) => {
            let x = parse_number(&args.x, "x")?;
            let y = parse_number(&args.y, "y")?;
            let outcome = session.run(Command::PlaceNode {
                id: args.id.clone(),
                x,
                y,
            })?;
            report_position(outcome, &args.id);
            Ok(())
        }
        FlowCommand::Drag(args) => {
            let dx = parse_number(&args.dx, "dx")?;
            let dy = parse_number(&args.dy, "dy")?;
            if !matches!(
                session.run(Command::BeginDrag {
                    id: args.id.clone()
                })?,
                Outcome::Dragging(_)
            ) {
                println!("No node [{}]; nothing changed.", args.id);
                return Ok(());
            }
            let moved = session.run(Command::DragBy { dx, dy })?;
            session.run(Command::EndDrag)?;
            report_position(moved, &args.id);
            Ok(())
        }
        FlowCommand::Connect(args) => {
            session.run(Command::EnterConnectionMode)?;
            let first = session.run(Command::SelectForConnection {
                id: args.from.clone(),
            })?;
            let message = match first {
                Outcome::Selection(Selection::Pending(_)) => {
                    let second = session.run(Command::SelectForConnection {
                        id: args.to.clone(),
                    })?;
                    describe_selection(&second, &args)
                }
                _ => format!("No node [{}]; nothing connected.", args.from),
            };
            session.run(Command::ExitConnectionMode)?;
            println!("{message}");
            Ok(())
        }
        FlowCommand::Clear => {
            let outcome = session.run(Command::ClearConnections)?;
            report_removal(outcome, "connections");
            Ok(())
        }
    }
}

fn report_position(outcome: Outcome, id: &str) {
    match outcome {
        Outcome::Position { id, x, y } => println!("Node [{id}] now at ({x:.0}, {y:.0})."),
        _ => println!("No node [{id}]; nothing changed."),
    }
}

fn describe_selection(outcome: &Outcome, args: &FlowConnectArgs) -> String {
    match outcome {
        Outcome::Selection(Selection::Connected(connection)) => {
            format!("Connected [{}] -> [{}].", connection.from, connection.to)
        }
        Outcome::Selection(Selection::Duplicate) => {
            format!("[{}] -> [{}] already exists.", args.from, args.to)
        }
        Outcome::Selection(Selection::Unchanged) => "A node cannot connect to itself.".to_string(),
        _ => format!("No node [{}]; nothing connected.", args.to),
    }
}

pub fn render_workflow(doc: &WorkflowDocument) -> String {
    let mut out = String::new();
    if doc.tasks.is_empty() {
        out.push_str("No workflow nodes.\n");
        return out;
    }
    for node in &doc.tasks {
        let _ = write!(out, "[{}] ", node.id);
        if let Some(emoji) = &node.emoji {
            let _ = write!(out, "{emoji} ");
        }
        let _ = writeln!(out, "{} @ ({:.0}, {:.0})", node.title, node.x, node.y);
        if let Some(description) = &node.description {
            let _ = writeln!(out, "    {description}");
        }
    }
    if !doc.connections.is_empty() {
        out.push_str("\nConnections:\n");
        for connection in &doc.connections {
            let _ = writeln!(out, "  [{}] -> [{}]", connection.from, connection.to);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_core::{Connection, WorkflowTask};

    fn node(id: &str, title: &str, x: f64, y: f64) -> WorkflowTask {
        WorkflowTask {
            id: id.to_string(),
            title: title.to_string(),
            emoji: None,
            description: None,
            x,
            y,
        }
    }

    #[test]
    fn workflow_text_lists_nodes_then_edges() {
        let mut plan = node("1", "Plan", 120.4, 180.0);
        plan.emoji = Some("🧭".to_string());
        plan.description = Some("Scope the release".to_string());
        let doc = WorkflowDocument {
            tasks: vec![plan, node("2", "Build", 300.0, 90.6)],
            connections: vec![Connection::new("1", "2")],
            version: 4,
        };
        assert_eq!(
            render_workflow(&doc),
            "[1] 🧭 Plan @ (120, 180)\n    Scope the release\n[2] Build @ (300, 91)\n\nConnections:\n  [1] -> [2]\n"
        );
        assert_eq!(
            render_workflow(&WorkflowDocument::default()),
            "No workflow nodes.\n"
        );
    }

    #[test]
    fn connect_messages_name_the_missing_end() {
        let args = FlowConnectArgs {
            from: "1".into(),
            to: "9".into(),
        };
        assert_eq!(
            describe_selection(&Outcome::Selection(Selection::Ignored), &args),
            "No node [9]; nothing connected."
        );
        assert_eq!(
            describe_selection(
                &Outcome::Selection(Selection::Connected(Connection::new("1", "9"))),
                &args
            ),
            "Connected [1] -> [9]."
        );
    }
}
