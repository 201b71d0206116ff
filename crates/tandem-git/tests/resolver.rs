use git2::{Repository, Signature};
use std::path::Path;
use tandem_git::{Continuation, GitError, GitStateResolver};

fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("Tandem Test", "test@example.com").unwrap();
    let parents: Vec<git2::Commit> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

fn init_repo(dir: &Path) -> Repository {
    let repo = Repository::init(dir).unwrap();
    std::fs::write(dir.join("README.md"), "hello\n").unwrap();
    commit_all(&repo, "initial");
    repo
}

fn checkout_new_branch(repo: &Repository, name: &str) {
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    repo.branch(name, &head, false).unwrap();
    repo.set_head(&format!("refs/heads/{name}")).unwrap();
}

#[tokio::test]
async fn resolves_branch_commit_and_clean_state() {
    let dir = tempfile::tempdir().unwrap();
    let repo = init_repo(dir.path());
    checkout_new_branch(&repo, "feature/login");
    let head = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();

    let state = GitStateResolver::new(dir.path()).resolve().await.unwrap();
    assert_eq!(state.branch, "feature/login");
    assert_eq!(state.commit, head);
    assert!(state.clean);
    assert_eq!(
        state.default_session_id(),
        format!("feature-login-{}", &head[..8])
    );
}

#[tokio::test]
async fn untracked_file_makes_tree_dirty() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    std::fs::write(dir.path().join("new.txt"), "x").unwrap();

    let state = GitStateResolver::new(dir.path()).resolve().await.unwrap();
    assert!(!state.clean);
}

#[tokio::test]
async fn resolves_from_subdirectory() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    let sub = dir.path().join("src");
    std::fs::create_dir(&sub).unwrap();

    let state = GitStateResolver::new(&sub).resolve().await.unwrap();
    assert_eq!(state.commit.len(), 40);
}

#[tokio::test]
async fn missing_repository_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = GitStateResolver::new(dir.path()).resolve().await.unwrap_err();
    assert!(matches!(err, GitError::NotARepository(_)));
}

#[tokio::test]
async fn new_commit_on_same_branch_warns() {
    let dir = tempfile::tempdir().unwrap();
    let repo = init_repo(dir.path());
    let resolver = GitStateResolver::new(dir.path());
    let before = resolver.resolve().await.unwrap();

    std::fs::write(dir.path().join("README.md"), "changed\n").unwrap();
    commit_all(&repo, "second");
    let after = resolver.resolve().await.unwrap();

    assert_ne!(before.default_session_id(), after.default_session_id());
    assert!(matches!(
        after.continuation_from(&before),
        Continuation::ContinueWithWarning(_)
    ));
}
