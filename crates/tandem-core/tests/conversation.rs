use git2::{Repository, Signature};
use std::path::Path;
use std::sync::Arc;
use tandem_backend::testing::ScriptedRunner;
use tandem_backend::{BackendError, BackendKind, BackendRegistry};
use tandem_core::{
    AskSession, Config, Conversation, CoreError, ReviewSession, ThreadRef, TurnRequest,
};
use tandem_storage::{SessionStore, StoreConfig};

fn registry(runner: &Arc<ScriptedRunner>) -> BackendRegistry {
    BackendRegistry::with_defaults(runner.clone(), BackendKind::Gemini)
}

fn init_repo(dir: &Path) -> Repository {
    let repo = Repository::init(dir).unwrap();
    std::fs::write(dir.join("a.rs"), "fn main() {}\n").unwrap();
    {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Tandem Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
    }
    repo
}

#[tokio::test]
async fn gemini_rounds_replay_history() {
    let work = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(vec![
        Ok("gemini 0.9".into()),
        Ok("first answer".into()),
        Ok("second answer".into()),
    ]));
    let registry = registry(&runner);
    let store = SessionStore::<AskSession>::new(sessions.path(), "ask", StoreConfig::default());
    let config = Config::default();
    let conversation = Conversation::new(&registry, &store, &config, work.path());

    conversation
        .run(TurnRequest::new("first question").with_session("s1"), None)
        .await
        .unwrap();
    let outcome = conversation
        .run(TurnRequest::new("second question").with_session("s1"), None)
        .await
        .unwrap();

    assert_eq!(outcome.result.response, "second answer");
    assert_eq!(outcome.record.rounds.len(), 2);

    let calls = runner.calls();
    assert_eq!(calls[1].args.last().map(String::as_str), Some("first question"));
    let replayed = calls[2].args.last().unwrap();
    assert!(replayed.contains("User: first question"));
    assert!(replayed.contains("Assistant: first answer"));
    assert!(replayed.ends_with("second question"));

    let stored = store.load("s1").await.unwrap().unwrap();
    assert_eq!(stored.rounds[1].prompt, "second question");
}

#[tokio::test]
async fn codex_thread_is_persisted_and_resumed() {
    let work = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(vec![
        Ok("codex 0.40".into()),
        Ok(concat!(
            r#"{"type":"thread.started","thread_id":"thread-123"}"#,
            "\n",
            r#"{"type":"item.agent_message","text":"FIRST_OK"}"#,
            "\n"
        )
        .into()),
        Ok(r#"{"type":"item.agent_message","text":"SECOND_OK"}"#.into()),
    ]));
    let registry = registry(&runner);
    let store = SessionStore::<AskSession>::new(sessions.path(), "ask", StoreConfig::default());
    let config = Config::default();
    let conversation = Conversation::new(&registry, &store, &config, work.path());

    let first = conversation
        .run(
            TurnRequest::new("start")
                .with_session("c1")
                .with_provider(BackendKind::Codex),
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        first.record.thread,
        Some(ThreadRef {
            provider: BackendKind::Codex,
            id: "thread-123".into()
        })
    );

    let second = conversation
        .run(
            TurnRequest::new("follow up")
                .with_session("c1")
                .with_provider(BackendKind::Codex),
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.result.response, "SECOND_OK");
    assert_eq!(second.result.thread_id.as_deref(), Some("thread-123"));

    let call = &runner.calls()[2];
    let exec = call.args.iter().position(|a| a == "exec").unwrap();
    assert_eq!(call.args[exec + 1], "resume");
    assert_eq!(call.args[exec + 2], "thread-123");
    assert_eq!(call.stdin.as_deref(), Some("follow up"));
}

#[tokio::test]
async fn session_id_requires_git_when_not_given() {
    let work = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::default());
    let registry = registry(&runner);
    let store = SessionStore::<AskSession>::new(sessions.path(), "ask", StoreConfig::default());
    let config = Config::default();
    let conversation = Conversation::new(&registry, &store, &config, work.path());

    let err = conversation
        .run(TurnRequest::new("hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Git(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn session_id_is_derived_from_git() {
    let work = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    init_repo(work.path());
    let runner = Arc::new(ScriptedRunner::new(vec![
        Ok("1".into()),
        Ok("answer".into()),
    ]));
    let registry = registry(&runner);
    let store = SessionStore::<AskSession>::new(sessions.path(), "ask", StoreConfig::default());
    let config = Config::default();
    let conversation = Conversation::new(&registry, &store, &config, work.path());

    let outcome = conversation
        .run(TurnRequest::new("hi"), None)
        .await
        .unwrap();
    let git = outcome.git.as_ref().unwrap();
    assert_eq!(outcome.session_id, git.default_session_id());
    assert!(store.load(&outcome.session_id).await.unwrap().is_some());
}

#[tokio::test]
async fn review_on_another_branch_needs_force() {
    let work = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    let repo = init_repo(work.path());
    let runner = Arc::new(ScriptedRunner::new(vec![
        Ok("1".into()),
        Ok("[CRITICAL] a.rs:1 — main is empty".into()),
        Ok("[QUESTION] a.rs — intended?".into()),
    ]));
    let registry = registry(&runner);
    let store =
        SessionStore::<ReviewSession>::new(sessions.path(), "review", StoreConfig::default());
    let config = Config::default();
    let conversation = Conversation::new(&registry, &store, &config, work.path());

    let first = conversation
        .run(TurnRequest::new("review a.rs").with_session("rev"), None)
        .await
        .unwrap();
    assert_eq!(first.record.comments.len(), 1);
    assert!(first.warning.is_none());

    let head = repo.head().unwrap().peel_to_commit().unwrap();
    repo.branch("other", &head, false).unwrap();
    repo.set_head("refs/heads/other").unwrap();

    let err = conversation
        .run(TurnRequest::new("again").with_session("rev"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ContinuationDenied { .. }));
    assert_eq!(runner.calls().len(), 2);

    let forced = conversation
        .run(
            TurnRequest::new("again").with_session("rev").with_force(true),
            None,
        )
        .await
        .unwrap();
    assert!(forced.warning.is_some());
    assert_eq!(forced.record.comments.len(), 2);
    assert_eq!(forced.record.comments[1].id, "c-2-1");
}

#[tokio::test]
async fn failed_call_reports_provider_and_model() {
    let work = tempfile::tempdir().unwrap();
    let sessions = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new(vec![
        Ok("1".into()),
        Err(BackendError::exit("gemini", Some(1), "auth failed")),
    ]));
    let registry = registry(&runner);
    let store = SessionStore::<AskSession>::new(sessions.path(), "ask", StoreConfig::default());
    let config = Config::default();
    let conversation = Conversation::new(&registry, &store, &config, work.path());

    let err = conversation
        .run(TurnRequest::new("hi").with_session("s"), None)
        .await
        .unwrap_err();
    assert_eq!(
        err.backend_context(),
        Some((BackendKind::Gemini, "gemini-2.5-pro"))
    );
    assert!(err.to_string().contains("auth failed"));
    assert!(store.load("s").await.unwrap().is_none());
}
