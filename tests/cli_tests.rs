mod common;

use std::fs;

use common::*;
use predicates::prelude::*;
use tempfile::TempDir;

fn site() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("drafts")).unwrap();
    fs::write(temp.path().join("drafts/post.md"), "# Draft\n").unwrap();
    fs::write(temp.path().join("index.md"), "home\n").unwrap();
    fs::write(temp.path().join("cache.bin"), "junk").unwrap();
    temp
}

const PLAN: &str = r##"
[[step]]
op = "create"
path = "posts/hello.md"
content = "# Hello\n"

[[step]]
op = "append"
path = "index.md"
content = "- hello\n"

[[step]]
op = "rename"
path = "drafts/"
to = "archive/"

[[step]]
op = "delete"
path = "cache.bin"
"##;

#[test]
fn test_apply_commits_plan() {
    let root = site();
    let (_plan_dir, plan) = write_plan(PLAN);

    run_apply(root.path(), &plan, &[])
        .success()
        .stdout(predicate::str::contains("Successfully completed 4 operations"));

    let root = root.path();
    assert_eq!(
        fs::read_to_string(root.join("posts/hello.md")).unwrap(),
        "# Hello\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("index.md")).unwrap(),
        "home\n- hello\n"
    );
    assert_eq!(
        fs::read_to_string(root.join("archive/post.md")).unwrap(),
        "# Draft\n"
    );
    assert!(!root.join("drafts").exists(), "placeholder left behind");
    assert!(!root.join("cache.bin").exists());
}

#[test]
fn test_dry_run_rolls_back() {
    let root = site();
    let (_plan_dir, plan) = write_plan(PLAN);

    run_apply(root.path(), &plan, &["--dry-run"])
        .success()
        .stdout(predicate::str::contains("DRY RUN"));

    let root = root.path();
    assert!(!root.join("posts/hello.md").exists());
    assert!(!root.join("archive").exists());
    assert_eq!(fs::read_to_string(root.join("index.md")).unwrap(), "home\n");
    assert_eq!(
        fs::read_to_string(root.join("drafts/post.md")).unwrap(),
        "# Draft\n"
    );
    assert!(root.join("cache.bin").exists());
}

#[test]
fn test_failing_step_rolls_back_earlier_steps() {
    let root = site();
    let (_plan_dir, plan) = write_plan(
        r#"
[[step]]
op = "write"
path = "index.md"
content = "replaced"

[[step]]
op = "rename"
path = "index.md"
to = "drafts/post.md"
"#,
    );

    run_apply(root.path(), &plan, &[])
        .failure()
        .stderr(predicate::str::contains("Target already exists"))
        .stderr(predicate::str::contains("Rollback successful"));

    assert_eq!(
        fs::read_to_string(root.path().join("index.md")).unwrap(),
        "home\n"
    );
}

#[test]
fn test_invalid_plan_touches_nothing() {
    let root = site();
    let (_plan_dir, plan) = write_plan(
        r#"
[[step]]
op = "create"
path = "new.txt"

[[step]]
op = "explode"
path = "index.md"
"#,
    );

    run_apply(root.path(), &plan, &[])
        .failure()
        .stderr(predicate::str::contains("Invalid plan"))
        .stderr(predicate::str::contains("unknown op 'explode'"));

    assert!(!root.path().join("new.txt").exists());
}

#[test]
fn test_missing_plan_file() {
    let root = site();
    run_apply(root.path(), &root.path().join("nope.toml"), &[])
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_missing_root() {
    let (plan_dir, plan) = write_plan(PLAN);
    run_apply(&plan_dir.path().join("absent"), &plan, &[])
        .failure()
        .stderr(predicate::str::contains("Invalid root"));
}
