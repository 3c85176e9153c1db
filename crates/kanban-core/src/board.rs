use crate::app::AppContext;
use crate::command::{Confirm, Removal};
use crate::error::{BoardError, ValidationError};
use crate::storage::{Change, Persisted};
use crate::{normalize_emoji, normalize_text, Task, TaskDraft, TaskId, TaskPatch, TaskStatus};
use chrono::Utc;
use tracing::info;

/// Tasks plus the ordered group registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStore {
    tasks: Vec<Task>,
    groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub not_started: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl StatusCounts {
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::NotStarted => self.not_started,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Done => self.done,
        }
    }

    pub fn total(&self) -> usize {
        self.not_started + self.in_progress + self.done
    }
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>, groups: Vec<String>) -> Self {
        let mut store = Self::default();
        store.replace(tasks, groups);
        store
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.iter().any(|group| group == name)
    }

    pub fn by_status(&self, status: TaskStatus) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |task| task.status == status)
    }

    /// Tasks in `status` belonging to `group`. `None` selects the ungrouped
    /// section, which also holds tasks whose group is no longer registered.
    pub fn list_by_status_and_group(&self, status: TaskStatus, group: Option<&str>) -> Vec<&Task> {
        self.by_status(status)
            .filter(|task| match (group, task.group.as_deref()) {
                (Some(wanted), Some(actual)) => wanted == actual,
                (Some(_), None) => false,
                (None, Some(actual)) => !self.has_group(actual),
                (None, None) => true,
            })
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::NotStarted => counts.not_started += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Done => counts.done += 1,
            }
        }
        counts
    }

    /// Swaps in a loaded snapshot. Duplicate registry entries are dropped.
    pub fn replace(&mut self, tasks: Vec<Task>, groups: Vec<String>) {
        self.tasks = tasks;
        self.groups.clear();
        for group in groups {
            if !self.has_group(&group) {
                self.groups.push(group);
            }
        }
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }
}

/// Task and group operations over an owned [`TaskStore`].
#[derive(Debug, Default)]
pub struct BoardController {
    store: TaskStore,
}

impl BoardController {
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub(crate) fn replace(&mut self, tasks: Vec<Task>, groups: Vec<String>) {
        self.store.replace(tasks, groups);
    }

    pub fn create(&mut self, ctx: &mut AppContext, draft: TaskDraft) -> Result<Task, BoardError> {
        let text = normalize_text(&draft.text).ok_or(ValidationError::EmptyTaskText)?;
        let emoji = normalize_emoji(draft.emoji.as_deref());
        let group = draft.group.as_deref().and_then(normalize_text);
        if let Some(name) = group.as_deref() {
            self.ensure_group(ctx, name)?;
        }

        let task = Task {
            id: TaskId::from(ctx.next_id()),
            text,
            emoji,
            status: draft.status,
            group,
            created_at: Utc::now(),
            version: 0,
        };
        self.store.tasks.push(task.clone());
        info!(event = "task_created", id = %task.id, status = %task.status);

        let persisted = ctx.persist(Change::TaskCreated {
            task: &task,
            tasks: &self.store.tasks,
        })?;
        Ok(self.adopt(&task.id, persisted).unwrap_or(task))
    }

    pub fn update(
        &mut self,
        ctx: &mut AppContext,
        id: &TaskId,
        patch: TaskPatch,
    ) -> Result<Option<Task>, BoardError> {
        let Some(index) = self.store.position(id) else {
            return Ok(None);
        };

        let mut outgoing = TaskPatch::default();
        if let Some(text) = patch.text.as_deref() {
            outgoing.text = Some(normalize_text(text).ok_or(ValidationError::EmptyTaskText)?);
        }
        outgoing.emoji = patch.emoji.as_deref().map(|emoji| normalize_emoji(Some(emoji)));
        outgoing.status = patch.status;
        outgoing.group = patch
            .group
            .map(|group| group.as_deref().and_then(normalize_text));
        if let Some(Some(name)) = outgoing.group.as_ref() {
            self.ensure_group(ctx, name)?;
        }

        let task = &mut self.store.tasks[index];
        if let Some(text) = outgoing.text.clone() {
            task.text = text;
        }
        if let Some(emoji) = outgoing.emoji.clone() {
            task.emoji = emoji;
        }
        if let Some(status) = outgoing.status {
            task.status = status;
        }
        if let Some(group) = outgoing.group.clone() {
            task.group = group;
        }
        if task.version > 0 {
            outgoing.version = Some(task.version);
        }
        let task = task.clone();
        info!(event = "task_updated", id = %task.id, status = %task.status);

        let persisted = ctx.persist(Change::TaskUpdated {
            task: &task,
            patch: &outgoing,
            tasks: &self.store.tasks,
        })?;
        Ok(Some(self.adopt(&task.id, persisted).unwrap_or(task)))
    }

    pub fn move_task(
        &mut self,
        ctx: &mut AppContext,
        id: &TaskId,
        status: TaskStatus,
    ) -> Result<Option<Task>, BoardError> {
        self.update(ctx, id, TaskPatch::status(status))
    }

    pub fn delete(
        &mut self,
        ctx: &mut AppContext,
        id: &TaskId,
        confirm: &mut dyn Confirm,
    ) -> Result<Removal, BoardError> {
        let Some(index) = self.store.position(id) else {
            return Ok(Removal::NotFound);
        };
        if !confirm.confirm("Delete this task?") {
            return Ok(Removal::Declined);
        }
        self.store.tasks.remove(index);
        info!(event = "task_deleted", id = %id);
        ctx.persist(Change::TaskDeleted {
            id,
            tasks: &self.store.tasks,
        })?;
        Ok(Removal::Removed)
    }

    pub fn create_group(&mut self, ctx: &mut AppContext, name: &str) -> Result<String, BoardError> {
        let name = normalize_text(name).ok_or(ValidationError::EmptyGroupName)?;
        if self.store.has_group(&name) {
            return Err(ValidationError::DuplicateGroup(name).into());
        }
        self.register_group(ctx, &name)?;
        Ok(name)
    }

    /// Removes a group and moves its tasks to the ungrouped section.
    pub fn delete_group(
        &mut self,
        ctx: &mut AppContext,
        name: &str,
        confirm: &mut dyn Confirm,
    ) -> Result<Removal, BoardError> {
        let referenced = self
            .store
            .tasks
            .iter()
            .any(|task| task.group.as_deref() == Some(name));
        if !self.store.has_group(name) && !referenced {
            return Ok(Removal::NotFound);
        }
        let prompt = format!("Delete group \"{name}\" and move all tasks to ungrouped?");
        if !confirm.confirm(&prompt) {
            return Ok(Removal::Declined);
        }

        let mut moved = 0usize;
        for task in &mut self.store.tasks {
            if task.group.as_deref() == Some(name) {
                task.group = None;
                moved += 1;
            }
        }
        self.store.groups.retain(|group| group != name);
        info!(event = "group_deleted", group = name, moved);

        ctx.persist(Change::GroupDeleted {
            name,
            groups: &self.store.groups,
            tasks: &self.store.tasks,
        })?;
        Ok(Removal::Removed)
    }

    fn ensure_group(&mut self, ctx: &mut AppContext, name: &str) -> Result<(), BoardError> {
        if self.store.has_group(name) {
            return Ok(());
        }
        self.register_group(ctx, name)
    }

    fn register_group(&mut self, ctx: &mut AppContext, name: &str) -> Result<(), BoardError> {
        self.store.groups.push(name.to_string());
        info!(event = "group_created", group = name);
        ctx.persist(Change::GroupCreated {
            name,
            groups: &self.store.groups,
        })?;
        Ok(())
    }

    /// Swaps the local copy for the backend's one when the adapter returned it.
    fn adopt(&mut self, local_id: &TaskId, persisted: Option<Persisted>) -> Option<Task> {
        let Some(Persisted::Task(stored)) = persisted else {
            return None;
        };
        let index = self.store.position(local_id)?;
        self.store.tasks[index] = stored.clone();
        Some(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BoardStorage, InjectedFailure, MemoryStorage};
    use crate::BoardSnapshot;

    fn context() -> AppContext {
        AppContext::new(MemoryStorage::new()).with_seed(7)
    }

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    fn persisted(ctx: &mut AppContext) -> BoardSnapshot {
        ctx.storage_mut().load_all().expect("memory load")
    }

    #[test]
    fn create_trims_input_and_applies_default_emoji() {
        let mut ctx = context();
        let mut board = BoardController::default();

        let draft = TaskDraft::new("  Ship docs  ", TaskStatus::NotStarted).with_emoji("   ");
        let task = board.create(&mut ctx, draft).expect("create");

        assert_eq!(task.text, "Ship docs");
        assert_eq!(task.emoji, crate::DEFAULT_EMOJI);
        assert_eq!(task.group, None);
        assert_eq!(board.store().tasks().len(), 1);
        assert_eq!(persisted(&mut ctx).tasks, board.store().tasks());
    }

    #[test]
    fn create_rejects_blank_text_without_mutation() {
        let mut ctx = context();
        let mut board = BoardController::default();

        for text in ["", "   "] {
            let err = board
                .create(&mut ctx, TaskDraft::new(text, TaskStatus::Done))
                .expect_err("blank text");
            assert!(matches!(
                err,
                BoardError::Validation(ValidationError::EmptyTaskText)
            ));
        }
        assert!(board.store().tasks().is_empty());
        assert!(persisted(&mut ctx).tasks.is_empty());
    }

    #[test]
    fn ids_stay_unique_within_one_millisecond() {
        let mut ctx = context();
        let mut board = BoardController::default();
        let first = board
            .create(&mut ctx, TaskDraft::new("a", TaskStatus::NotStarted))
            .expect("first");
        let second = board
            .create(&mut ctx, TaskDraft::new("b", TaskStatus::NotStarted))
            .expect("second");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn unknown_group_on_create_is_registered() {
        let mut ctx = context();
        let mut board = BoardController::default();

        board
            .create(
                &mut ctx,
                TaskDraft::new("Write intro", TaskStatus::NotStarted).in_group(" Docs "),
            )
            .expect("create");

        assert_eq!(board.store().groups(), ["Docs".to_string()]);
        assert_eq!(persisted(&mut ctx).groups, vec!["Docs".to_string()]);
    }

    #[test]
    fn update_applies_partial_fields_and_ignores_unknown_ids() {
        let mut ctx = context();
        let mut board = BoardController::default();
        let task = board
            .create(&mut ctx, TaskDraft::new("Draft", TaskStatus::NotStarted))
            .expect("create");

        let patch = TaskPatch {
            text: Some(" Final ".to_string()),
            group: Some(Some("Release".to_string())),
            ..TaskPatch::default()
        };
        let updated = board
            .update(&mut ctx, &task.id, patch)
            .expect("update")
            .expect("known id");
        assert_eq!(updated.text, "Final");
        assert_eq!(updated.status, TaskStatus::NotStarted);
        assert_eq!(updated.group.as_deref(), Some("Release"));
        assert!(board.store().has_group("Release"));

        let missing = board
            .update(&mut ctx, &TaskId::new("nope"), TaskPatch::status(TaskStatus::Done))
            .expect("no-op");
        assert_eq!(missing, None);

        let err = board
            .update(
                &mut ctx,
                &task.id,
                TaskPatch {
                    text: Some("  ".to_string()),
                    ..TaskPatch::default()
                },
            )
            .expect_err("blank text");
        assert!(matches!(err, BoardError::Validation(_)));
        assert_eq!(board.store().get(&task.id).expect("task").text, "Final");
    }

    #[test]
    fn create_group_rejects_blank_and_exact_duplicates() {
        let mut ctx = context();
        let mut board = BoardController::default();

        assert_eq!(board.create_group(&mut ctx, " Docs ").expect("create"), "Docs");
        assert!(matches!(
            board.create_group(&mut ctx, "Docs"),
            Err(BoardError::Validation(ValidationError::DuplicateGroup(_)))
        ));
        assert!(matches!(
            board.create_group(&mut ctx, "  "),
            Err(BoardError::Validation(ValidationError::EmptyGroupName))
        ));
        assert_eq!(board.create_group(&mut ctx, "docs").expect("case differs"), "docs");
        assert_eq!(board.store().groups().len(), 2);
    }

    #[test]
    fn delete_group_cascades_only_to_members() {
        let mut ctx = context();
        let mut board = BoardController::default();
        let member = board
            .create(
                &mut ctx,
                TaskDraft::new("member", TaskStatus::InProgress).in_group("Docs"),
            )
            .expect("member");
        let other = board
            .create(&mut ctx, TaskDraft::new("other", TaskStatus::Done).in_group("Ops"))
            .expect("other");

        assert_eq!(
            board.delete_group(&mut ctx, "Docs", &mut no).expect("declined"),
            Removal::Declined
        );
        assert!(board.store().has_group("Docs"));

        let mut prompts = Vec::new();
        let mut record = |prompt: &str| {
            prompts.push(prompt.to_string());
            true
        };
        assert_eq!(
            board.delete_group(&mut ctx, "Docs", &mut record).expect("delete"),
            Removal::Removed
        );
        assert_eq!(
            prompts,
            vec!["Delete group \"Docs\" and move all tasks to ungrouped?".to_string()]
        );
        assert_eq!(board.store().get(&member.id).expect("member").group, None);
        assert_eq!(
            board.store().get(&other.id).expect("other").group.as_deref(),
            Some("Ops")
        );
        assert_eq!(board.store().groups(), ["Ops".to_string()]);

        let saved = persisted(&mut ctx);
        assert_eq!(saved.groups, vec!["Ops".to_string()]);
        assert!(saved.tasks.iter().all(|task| task.group.as_deref() != Some("Docs")));
    }

    #[test]
    fn delete_unknown_task_skips_confirmation() {
        let mut ctx = context();
        let mut board = BoardController::default();
        let mut asked = false;
        let mut gate = |_: &str| {
            asked = true;
            true
        };
        let removal = board
            .delete(&mut ctx, &TaskId::new("missing"), &mut gate)
            .expect("delete");
        assert_eq!(removal, Removal::NotFound);
        assert!(!asked);
    }

    #[test]
    fn orphaned_groups_render_in_ungrouped_section() {
        let store = TaskStore::new(
            vec![
                Task {
                    id: TaskId::new("1"),
                    text: "orphan".into(),
                    emoji: crate::default_emoji(),
                    status: TaskStatus::NotStarted,
                    group: Some("Gone".into()),
                    created_at: Utc::now(),
                    version: 0,
                },
                Task {
                    id: TaskId::new("2"),
                    text: "grouped".into(),
                    emoji: crate::default_emoji(),
                    status: TaskStatus::NotStarted,
                    group: Some("Docs".into()),
                    created_at: Utc::now(),
                    version: 0,
                },
            ],
            vec!["Docs".into(), "Docs".into()],
        );

        let ungrouped = store.list_by_status_and_group(TaskStatus::NotStarted, None);
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(ungrouped[0].text, "orphan");
        let docs = store.list_by_status_and_group(TaskStatus::NotStarted, Some("Docs"));
        assert_eq!(docs.len(), 1);
        assert_eq!(store.groups().len(), 1);
        assert!(store
            .list_by_status_and_group(TaskStatus::Done, None)
            .is_empty());
    }

    #[test]
    fn failed_write_keeps_in_memory_change() {
        let mut storage = MemoryStorage::new();
        storage.fail_with(Some(InjectedFailure::Transport));
        let mut ctx = AppContext::new(storage);
        let mut board = BoardController::default();

        let task = board
            .create(&mut ctx, TaskDraft::new("offline", TaskStatus::NotStarted))
            .expect("write failure is swallowed");
        assert_eq!(board.store().get(&task.id).expect("kept").text, "offline");
    }

    #[test]
    fn stale_write_surfaces_but_keeps_mutation() {
        let mut ctx = context();
        let mut board = BoardController::default();
        let task = board
            .create(&mut ctx, TaskDraft::new("shared", TaskStatus::NotStarted))
            .expect("create");

        let mut storage = MemoryStorage::new();
        storage.fail_with(Some(InjectedFailure::Conflict));
        let mut stale_ctx = AppContext::new(storage);
        let err = board
            .move_task(&mut stale_ctx, &task.id, TaskStatus::Done)
            .expect_err("stale");
        assert!(matches!(err, BoardError::StaleWrite(_)));
        assert_eq!(
            board.store().get(&task.id).expect("task").status,
            TaskStatus::Done
        );
    }

    #[test]
    fn counts_follow_status_changes() {
        let mut ctx = context();
        let mut board = BoardController::default();
        let task = board
            .create(&mut ctx, TaskDraft::new("one", TaskStatus::NotStarted))
            .expect("create");
        board
            .create(&mut ctx, TaskDraft::new("two", TaskStatus::Done))
            .expect("create");
        board
            .move_task(&mut ctx, &task.id, TaskStatus::InProgress)
            .expect("move");

        let counts = board.store().counts();
        assert_eq!(counts.not_started, 0);
        assert_eq!(counts.get(TaskStatus::InProgress), 1);
        assert_eq!(counts.done, 1);
        assert_eq!(counts.total(), 2);

        assert_eq!(
            board.delete(&mut ctx, &task.id, &mut yes).expect("delete"),
            Removal::Removed
        );
        assert_eq!(board.store().counts().total(), 1);
    }
}
