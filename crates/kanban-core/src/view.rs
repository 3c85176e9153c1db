//! Read-only render models derived from store state.

use crate::board::TaskStore;
use crate::{Connection, TaskId, TaskStatus, WorkflowDocument, WorkflowTask};

#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub id: TaskId,
    pub emoji: String,
    pub text: String,
    pub quick_moves: [TaskStatus; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSection {
    pub name: String,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub status: TaskStatus,
    pub count: usize,
    pub ungrouped: Vec<CardView>,
    /// Non-empty group sections in registry order.
    pub groups: Vec<GroupSection>,
}

impl ColumnView {
    /// Cards in display order: ungrouped first, then each section.
    pub fn cards(&self) -> impl Iterator<Item = &CardView> {
        self.ungrouped
            .iter()
            .chain(self.groups.iter().flat_map(|section| section.cards.iter()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardView {
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, status: TaskStatus) -> Option<&ColumnView> {
        self.columns.iter().find(|column| column.status == status)
    }
}

pub fn board_view(store: &TaskStore) -> BoardView {
    let counts = store.counts();
    let columns = TaskStatus::ALL
        .into_iter()
        .map(|status| {
            let ungrouped = cards(store.list_by_status_and_group(status, None));
            let groups = store
                .groups()
                .iter()
                .filter_map(|name| {
                    let cards = cards(store.list_by_status_and_group(status, Some(name)));
                    (!cards.is_empty()).then(|| GroupSection {
                        name: name.clone(),
                        cards,
                    })
                })
                .collect();
            ColumnView {
                status,
                count: counts.get(status),
                ungrouped,
                groups,
            }
        })
        .collect();
    BoardView { columns }
}

fn cards(tasks: Vec<&crate::Task>) -> Vec<CardView> {
    tasks
        .into_iter()
        .map(|task| CardView {
            id: task.id.clone(),
            emoji: task.emoji.clone(),
            text: task.text.clone(),
            quick_moves: task.status.quick_moves(),
        })
        .collect()
}

/// Rendered bounds of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NodeBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeView {
    pub from: String,
    pub to: String,
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub path: String,
}

/// Geometry for every edge whose endpoints both exist.
pub fn edge_views<F>(doc: &WorkflowDocument, mut bounds: F) -> Vec<EdgeView>
where
    F: FnMut(&WorkflowTask) -> NodeBox,
{
    doc.connections
        .iter()
        .filter_map(|Connection { from, to }| {
            let source = doc.tasks.iter().find(|node| &node.id == from)?;
            let target = doc.tasks.iter().find(|node| &node.id == to)?;
            let start = bounds(source).center();
            let end = bounds(target).center();
            Some(EdgeView {
                from: from.clone(),
                to: to.clone(),
                start,
                end,
                path: edge_path(start, end),
            })
        })
        .collect()
}

/// Quadratic curve leaving horizontally and meeting the target through the
/// vertical midpoint.
pub fn edge_path((x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> String {
    let mid_x = (x1 + x2) / 2.0;
    let mid_y = (y1 + y2) / 2.0;
    format!("M {x1} {y1} Q {mid_x} {y1}, {mid_x} {mid_y} T {x2} {y2}")
}

/// Points along the same curve as [`edge_path`], for renderers that can only
/// draw straight segments. `segments` is per half of the curve.
pub fn edge_points(start: (f64, f64), end: (f64, f64), segments: usize) -> Vec<(f64, f64)> {
    let (x1, y1) = start;
    let (x2, y2) = end;
    let mid = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
    let segments = segments.max(1);
    let mut points = Vec::with_capacity(segments * 2 + 1);
    points.push(start);
    for (from, control, to) in [(start, (mid.0, y1), mid), (mid, (mid.0, y2), end)] {
        for step in 1..=segments {
            let t = step as f64 / segments as f64;
            points.push(quadratic(from, control, to, t));
        }
    }
    points
}

fn quadratic(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64), t: f64) -> (f64, f64) {
    let u = 1.0 - t;
    (
        u * u * p0.0 + 2.0 * u * t * p1.0 + t * t * p2.0,
        u * u * p0.1 + 2.0 * u * t * p1.1 + t * t * p2.1,
    )
}
