use kanban_core::TaskStatus;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const GROUP_STYLE: Style = Style::new()
    .fg(Color::Rgb(250, 189, 47))
    .add_modifier(Modifier::BOLD);
pub const MUTED: Color = Color::Rgb(146, 131, 116);
pub const EDGE: Color = Color::Rgb(189, 174, 147);
pub const NODE: Color = Color::Rgb(131, 165, 152);
pub const NODE_SELECTED: Color = Color::Rgb(250, 189, 47);
pub const NODE_PENDING: Color = Color::Rgb(254, 128, 25);
pub const ERROR: Color = Color::Rgb(251, 73, 52);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

pub fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Done => Color::Rgb(184, 187, 38),
        TaskStatus::InProgress => Color::Rgb(131, 165, 152),
        TaskStatus::NotStarted => MUTED,
    }
}
