use crate::state::{node_box, App, CanvasGeometry, View, NODE_HEIGHT, NODE_WIDTH};
use crate::theme;
use kanban_core::view::{edge_points, edge_views, ColumnView};
use kanban_core::TaskStatus;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as Segment, Rectangle},
        Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap,
    },
    Frame,
};

const CANVAS_MIN_WIDTH: f64 = 800.0;
const CANVAS_MIN_HEIGHT: f64 = 500.0;
const CANVAS_MARGIN: f64 = 40.0;
const EDGE_SEGMENTS: usize = 8;

pub fn render(f: &mut Frame, app: &mut App) {
    let area = f.size();
    let footer_height = if app.input.is_some() { 3 } else { 1 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(footer_height),
        ])
        .split(area);

    render_tabs(f, app, rows[0]);
    match app.view {
        View::Board => {
            app.canvas = None;
            render_board(f, app, rows[1]);
        }
        View::Workflow => render_workflow(f, app, rows[1]),
    }
    render_footer(f, app, rows[2]);

    if app.show_help {
        render_help(f, centered(area, 60, 70));
    }
    if let Some(pending) = &app.confirm {
        render_confirm(f, &pending.prompt, centered(area, 50, 20));
    }
}

fn render_tabs(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(" Kanban ", theme::HEADER_STYLE)];
    for view in [View::Board, View::Workflow] {
        let style = if view == app.view {
            theme::SELECTED_STYLE
        } else {
            Style::default().fg(theme::MUTED)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", view.label()), style));
    }
    spans.push(Span::styled(
        format!("  {}", app.backend),
        Style::default().fg(theme::MUTED),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_board(f: &mut Frame, app: &mut App, area: Rect) {
    let view = app.board_view();
    let constraints = vec![Constraint::Ratio(1, view.columns.len().max(1) as u32); view.columns.len()];
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (index, (column, slot)) in view.columns.iter().zip(columns.iter()).enumerate() {
        let selected = (index == app.column).then_some(app.row);
        render_column(f, column, selected, *slot);
    }
}

fn render_column(f: &mut Frame, column: &ColumnView, selected: Option<usize>, area: Rect) {
    let color = theme::status_color(column.status);
    let border_style = if selected.is_some() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(
            format!(
                " {} {} ({}) ",
                column.status.icon(),
                column.status.label(),
                column.count
            ),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));

    let (items, card_rows) = column_items(column);
    if items.is_empty() {
        let inner = block.inner(area);
        f.render_widget(block, area);
        f.render_widget(
            Paragraph::new(Span::styled("No tasks", Style::default().fg(theme::MUTED))),
            inner,
        );
        return;
    }

    let mut state = ListState::default();
    state.select(selected.and_then(|row| card_rows.get(row).copied()));
    let list = List::new(items)
        .block(block)
        .highlight_style(theme::SELECTED_STYLE);
    f.render_stateful_widget(list, area, &mut state);
}

/// List items for a column plus, per card, the list row it landed on.
fn column_items(column: &ColumnView) -> (Vec<ListItem<'static>>, Vec<usize>) {
    let mut items = Vec::new();
    let mut card_rows = Vec::new();
    for card in &column.ungrouped {
        card_rows.push(items.len());
        items.push(card_item(&card.emoji, &card.text, 0, items.len()));
    }
    for section in &column.groups {
        items.push(ListItem::new(Line::from(Span::styled(
            format!("▸ {}", section.name),
            theme::GROUP_STYLE,
        ))));
        for card in &section.cards {
            card_rows.push(items.len());
            items.push(card_item(&card.emoji, &card.text, 2, items.len()));
        }
    }
    (items, card_rows)
}

fn card_item(emoji: &str, text: &str, indent: usize, index: usize) -> ListItem<'static> {
    ListItem::new(Line::from(format!(
        "{}{} {}",
        " ".repeat(indent),
        emoji,
        text
    )))
    .style(theme::zebra_row_style(index))
}

fn render_workflow(f: &mut Frame, app: &mut App, area: Rect) {
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);
    render_node_list(f, app, panes[0]);
    render_canvas(f, app, panes[1]);
}

fn render_node_list(f: &mut Frame, app: &App, area: Rect) {
    let workflow = app.board.workflow();
    let pending = workflow.connect_state().pending();
    let title = if workflow.connect_state().is_active() {
        match pending {
            Some(_) => " Connect: pick a target ".to_string(),
            None => " Connect: pick a source ".to_string(),
        }
    } else {
        format!(" Tasks ({}) ", workflow.store().nodes().len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));

    let items: Vec<ListItem> = workflow
        .store()
        .nodes()
        .iter()
        .map(|node| {
            let marker = if Some(node.id.as_str()) == pending {
                "◆ "
            } else {
                "  "
            };
            let emoji = node.emoji.as_deref().unwrap_or(" ");
            let mut lines = vec![Line::from(format!("{marker}{emoji} {}", node.title))];
            if let Some(description) = &node.description {
                lines.push(Line::from(Span::styled(
                    format!("     {description}"),
                    Style::default().fg(theme::MUTED),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(app.node));
    }
    let list = List::new(items)
        .block(block)
        .highlight_style(theme::SELECTED_STYLE);
    f.render_stateful_widget(list, area, &mut state);
}

fn render_canvas(f: &mut Frame, app: &mut App, area: Rect) {
    let title = if app.is_dragging() {
        " Canvas (moving) "
    } else {
        " Canvas "
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);

    let doc = app.board.workflow().store().document();
    let width = doc
        .tasks
        .iter()
        .map(|node| node.x + NODE_WIDTH + CANVAS_MARGIN)
        .fold(CANVAS_MIN_WIDTH, f64::max);
    let height = doc
        .tasks
        .iter()
        .map(|node| node.y + NODE_HEIGHT + CANVAS_MARGIN)
        .fold(CANVAS_MIN_HEIGHT, f64::max);
    let selected = app.selected_node().map(|node| node.id.clone());
    let pending = app
        .board
        .workflow()
        .connect_state()
        .pending()
        .map(str::to_string);
    let edges = edge_views(doc, node_box);

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([-height, 0.0])
        .paint(|ctx| {
            for edge in &edges {
                let points = edge_points(edge.start, edge.end, EDGE_SEGMENTS);
                for pair in points.windows(2) {
                    ctx.draw(&Segment {
                        x1: pair[0].0,
                        y1: -pair[0].1,
                        x2: pair[1].0,
                        y2: -pair[1].1,
                        color: theme::EDGE,
                    });
                }
            }
            ctx.layer();
            for node in &doc.tasks {
                let color = if pending.as_deref() == Some(node.id.as_str()) {
                    theme::NODE_PENDING
                } else if selected.as_deref() == Some(node.id.as_str()) {
                    theme::NODE_SELECTED
                } else {
                    theme::NODE
                };
                ctx.draw(&Rectangle {
                    x: node.x,
                    y: -(node.y + NODE_HEIGHT),
                    width: NODE_WIDTH,
                    height: NODE_HEIGHT,
                    color,
                });
                let label = match &node.emoji {
                    Some(emoji) => format!("{emoji} {}", node.title),
                    None => node.title.clone(),
                };
                ctx.print(
                    node.x + 8.0,
                    -(node.y + NODE_HEIGHT / 2.0),
                    Span::styled(label, Style::default().fg(color)),
                );
            }
        });
    f.render_widget(canvas, area);

    app.canvas = Some(CanvasGeometry {
        area: inner,
        width,
        height,
    });
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    if let Some(form) = &app.input {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", form.purpose.label()))
            .border_style(Style::default().fg(Color::Yellow));
        let text = Line::from(vec![
            Span::raw(form.buffer.clone()),
            Span::styled("▏", Style::default().fg(Color::Yellow)),
        ]);
        f.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let line = if let Some(error) = &app.error {
        Line::from(Span::styled(error.clone(), Style::default().fg(theme::ERROR)))
    } else if let Some(message) = &app.message {
        Line::from(message.clone())
    } else {
        Line::from(Span::styled(
            hints(app.view),
            Style::default().fg(theme::MUTED),
        ))
    };
    f.render_widget(Paragraph::new(line), area);
}

fn hints(view: View) -> &'static str {
    match view {
        View::Board => "a add  e edit  g group  m/M move  d delete  Tab workflow  ? help  q quit",
        View::Workflow => "a add  e edit  m move  c connect  x clear  d delete  Tab board  ? help",
    }
}

fn render_confirm(f: &mut Frame, prompt: &str, area: Rect) {
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Confirm ")
        .border_style(Style::default().fg(theme::ERROR));
    let text = vec![
        Line::from(Span::styled(
            prompt.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("y", Color::Cyan),
            Span::raw(" confirm   "),
            Span::styled("any other key", Color::Cyan),
            Span::raw(" cancel"),
        ]),
    ];
    f.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn render_help(f: &mut Frame, area: Rect) {
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(Style::default().fg(Color::Yellow));

    let entry = |keys: &'static str, action: &'static str| {
        Line::from(vec![
            Span::styled(format!("{keys:<12}"), Color::Cyan),
            Span::raw(action),
        ])
    };
    let mut text = vec![
        Line::from(Span::styled(
            "Board",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        entry("h/l", "Previous / next column"),
        entry("j/k", "Next / previous card"),
        entry("a", "Add task to this column"),
        entry("e", "Edit task text"),
        entry("g", "Set or clear the task group"),
        entry("n / D", "Add / delete a group"),
    ];
    for status in TaskStatus::ALL {
        let keys = match status {
            TaskStatus::NotStarted => "1",
            TaskStatus::InProgress => "2",
            TaskStatus::Done => "3",
        };
        text.push(Line::from(vec![
            Span::styled(format!("{keys:<12}"), Color::Cyan),
            Span::raw(format!("Move to {}", status.label())),
        ]));
    }
    text.extend([
        entry("m / M", "Quick move"),
        entry("d", "Delete task"),
        Line::from(""),
        Line::from(Span::styled(
            "Workflow",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        entry("a / e / d", "Add / edit / delete task"),
        entry("m", "Move with arrows, Enter drops"),
        entry("mouse", "Drag tasks on the canvas"),
        entry("c", "Toggle connection mode"),
        entry("Enter", "Pick source / target"),
        entry("x", "Clear all connections"),
        Line::from(""),
        entry("Tab", "Switch view"),
        entry("r", "Reload"),
        entry("q", "Quit"),
    ]);

    f.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_core::view::board_view;
    use kanban_core::TaskStore;

    #[test]
    fn card_rows_skip_group_headers() {
        let store = TaskStore::new(
            vec![
                task("1", Some("Docs")),
                task("2", None),
                task("3", Some("Docs")),
            ],
            vec!["Docs".to_string()],
        );
        let view = board_view(&store);
        let column = view.column(TaskStatus::NotStarted).expect("column");
        let (items, rows) = column_items(column);
        assert_eq!(items.len(), 4);
        assert_eq!(rows, vec![0, 2, 3]);
    }

    fn task(id: &str, group: Option<&str>) -> kanban_core::Task {
        kanban_core::Task {
            id: id.into(),
            text: format!("task {id}"),
            emoji: kanban_core::default_emoji(),
            status: TaskStatus::NotStarted,
            group: group.map(str::to_string),
            created_at: Default::default(),
            version: 0,
        }
    }
}
