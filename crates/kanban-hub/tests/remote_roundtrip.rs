use kanban_core::{
    App, AppContext, BoardError, BoardStorage, Command, Outcome, Removal, Selection, TaskDraft,
    TaskStatus, WorkflowDraft,
};
use kanban_hub::{serve, HubState};
use kanban_storage::{BoardDb, RemoteStorage};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;

/// Starts a hub on an ephemeral port in a background runtime and returns its
/// API URL plus tokens for two users.
fn spawn_hub() -> (String, String, String) {
    let db = BoardDb::open_in_memory().expect("open db");
    let (_, ada) = db.create_user("ada").expect("ada");
    let (_, bob) = db.create_user("bob").expect("bob");
    let (tx, rx) = mpsc::channel::<SocketAddr>();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind");
            tx.send(listener.local_addr().expect("local addr"))
                .expect("send addr");
            serve(listener, HubState::new(db), std::future::pending())
                .await
                .expect("serve");
        });
    });

    let addr = rx.recv().expect("hub address");
    (format!("http://{addr}/api"), ada, bob)
}

fn accept(_: &str) -> bool {
    true
}

#[test]
fn board_session_roundtrips_through_the_hub() {
    let (api_url, token, _) = spawn_hub();
    let remote = RemoteStorage::new(&api_url, token.as_str()).expect("client");
    assert_eq!(remote.current_user().expect("me").username, "ada");

    let mut app = App::new(AppContext::new(remote).with_seed(3));
    app.load().expect("initial load");
    assert_eq!(app.snapshot().workflow.version, 1);

    let Outcome::Task(task) = app
        .dispatch(
            Command::CreateTask(TaskDraft::new("Ship docs", TaskStatus::NotStarted).in_group("Docs")),
            &mut accept,
        )
        .expect("create")
    else {
        panic!("expected a task");
    };
    assert_eq!(task.version, 1);
    assert_eq!(app.board().store().groups(), ["Docs".to_string()]);

    app.dispatch(
        Command::MoveTask {
            id: task.id.clone(),
            status: TaskStatus::Done,
        },
        &mut accept,
    )
    .expect("move");

    let mut ids = Vec::new();
    for title in ["A", "B"] {
        if let Outcome::Node(node) = app
            .dispatch(Command::CreateNode(WorkflowDraft::new(title)), &mut accept)
            .expect("node")
        {
            ids.push(node.id);
        }
    }
    app.dispatch(Command::EnterConnectionMode, &mut accept)
        .expect("mode");
    app.dispatch(
        Command::SelectForConnection { id: ids[0].clone() },
        &mut accept,
    )
    .expect("source");
    let outcome = app
        .dispatch(
            Command::SelectForConnection { id: ids[1].clone() },
            &mut accept,
        )
        .expect("target");
    assert!(matches!(outcome, Outcome::Selection(Selection::Connected(_))));

    let before = app.snapshot();
    app.dispatch(Command::Reload, &mut accept).expect("reload");
    let after = app.snapshot();
    assert_eq!(after.tasks.len(), 1);
    assert_eq!(after.tasks[0].status, TaskStatus::Done);
    assert_eq!(after.tasks[0].version, 2);
    assert_eq!(after.groups, before.groups);
    let titles = |doc: &kanban_core::WorkflowDocument| {
        doc.tasks
            .iter()
            .map(|node| (node.id.clone(), node.title.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(titles(&after.workflow), titles(&before.workflow));
    assert_eq!(after.workflow.connections.len(), 1);
    assert_eq!(after.workflow.version, before.workflow.version);

    let removal = app
        .dispatch(
            Command::DeleteGroup {
                name: "Docs".into(),
            },
            &mut accept,
        )
        .expect("delete group");
    assert_eq!(removal, Outcome::Removal(Removal::Removed));
    app.dispatch(Command::Reload, &mut accept).expect("reload");
    assert!(app.snapshot().groups.is_empty());
    assert_eq!(app.snapshot().tasks[0].group, None);
}

#[test]
fn stale_workflow_write_is_surfaced() {
    let (api_url, token, _) = spawn_hub();
    let mut first = App::new(AppContext::new(
        RemoteStorage::new(&api_url, token.as_str()).expect("client"),
    ));
    let mut second = App::new(AppContext::new(
        RemoteStorage::new(&api_url, token.as_str()).expect("client"),
    ));
    first.load().expect("load");
    second.load().expect("load");

    first
        .dispatch(Command::CreateNode(WorkflowDraft::new("first")), &mut accept)
        .expect("first write");
    let err = second
        .dispatch(Command::CreateNode(WorkflowDraft::new("second")), &mut accept)
        .expect_err("stale write");
    assert!(matches!(err, BoardError::StaleWrite(_)));
    assert_eq!(second.workflow().store().nodes().len(), 1);
}

#[test]
fn users_do_not_see_each_other() {
    let (api_url, ada, bob) = spawn_hub();
    let mut ada_app = App::new(AppContext::new(
        RemoteStorage::new(&api_url, ada.as_str()).expect("client"),
    ));
    ada_app
        .dispatch(
            Command::CreateTask(TaskDraft::new("private", TaskStatus::NotStarted)),
            &mut accept,
        )
        .expect("create");

    let mut bob_store = RemoteStorage::new(&api_url, bob.as_str()).expect("client");
    assert!(bob_store.load_all().expect("load").tasks.is_empty());
}

#[test]
fn revoked_token_is_fatal() {
    let (api_url, _, _) = spawn_hub();
    let mut app = App::new(AppContext::new(
        RemoteStorage::new(&api_url, "not-issued").expect("client"),
    ));
    let err = app.load().expect_err("unauthorized");
    assert!(err.is_fatal());
}

#[test]
fn save_all_adopts_server_ids_and_version() {
    let (api_url, token, _) = spawn_hub();
    let mut app = App::new(AppContext::new(
        RemoteStorage::new(&api_url, token.as_str()).expect("client"),
    ));
    app.load().expect("load");
    let Outcome::Task(task) = app
        .dispatch(
            Command::CreateTask(TaskDraft::new("Recreated", TaskStatus::NotStarted)),
            &mut accept,
        )
        .expect("create")
    else {
        panic!("expected a task");
    };
    app.dispatch(Command::CreateNode(WorkflowDraft::new("Plan")), &mut accept)
        .expect("node");

    let other = RemoteStorage::new(&api_url, token.as_str()).expect("client");
    other.delete_task(task.id.as_str()).expect("delete behind the app's back");

    let before = app.snapshot().workflow.version;
    app.save_all().expect("save all");
    let snapshot = app.snapshot();
    assert!(snapshot.workflow.version > before);
    assert_eq!(snapshot.tasks.len(), 1);
    assert_ne!(snapshot.tasks[0].id, task.id);

    app.dispatch(Command::CreateNode(WorkflowDraft::new("Next")), &mut accept)
        .expect("workflow write after save_all");
    let moved = app
        .dispatch(
            Command::MoveTask {
                id: snapshot.tasks[0].id.clone(),
                status: TaskStatus::Done,
            },
            &mut accept,
        )
        .expect("move");
    assert!(matches!(moved, Outcome::Task(ref t) if t.status == TaskStatus::Done));
}
