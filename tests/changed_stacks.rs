//! End-to-end change detection scenarios against real git repositories.

use terrastack::config::Root;
use terrastack::stack::{Manager, Report};
use terrastack::test_utils::GitSandbox;

const BASE_REF: &str = "main";

fn manager(sandbox: &GitSandbox) -> Manager {
    let root = Root::load(sandbox.root()).expect("project must load");
    Manager::new(root, BASE_REF)
}

fn stack_dirs(report: &Report) -> Vec<&str> {
    report.stacks.iter().map(|entry| entry.stack.dir.as_str()).collect()
}

#[tokio::test]
async fn unchanged_project_reports_no_stacks() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s1/main.tf", "# empty\n");
    sandbox.commit_all("add stack");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert!(report.stacks.is_empty(), "got: {:?}", stack_dirs(&report));
}

#[tokio::test]
async fn direct_file_change_marks_the_stack() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s1/main.tf", "# v1\n");
    sandbox.write_file("s2/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s2/main.tf", "# v1\n");
    sandbox.commit_all("add stacks");

    sandbox.checkout_new("feature");
    sandbox.write_file("s1/main.tf", "# v2\n");
    sandbox.commit_all("change s1");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
    assert_eq!(report.stacks[0].reason, "stack has unmerged changes");
}

#[tokio::test]
async fn change_in_subdirectory_resolves_to_the_enclosing_stack() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s1/envs/prod/vars.tf", "# v1\n");
    sandbox.commit_all("add stack");

    sandbox.checkout_new("feature");
    sandbox.write_file("s1/envs/prod/vars.tf", "# v2\n");
    sandbox.commit_all("change nested file");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
}

#[tokio::test]
async fn watched_file_change_marks_the_stack() {
    let sandbox = GitSandbox::new();
    sandbox.write_file(
        "s1/stack.tm.hcl",
        "stack {\n  watch = [\"/shared/vars.tf\"]\n}\n",
    );
    sandbox.write_file("shared/vars.tf", "# v1\n");
    sandbox.commit_all("add stack");

    sandbox.checkout_new("feature");
    sandbox.write_file("shared/vars.tf", "# v2\n");
    sandbox.commit_all("change watched file");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
    assert!(
        report.stacks[0]
            .reason
            .contains("watched file \"/shared/vars.tf\" changed"),
        "got: {}",
        report.stacks[0].reason
    );
    assert!(report.stacks[0].stack.is_changed);
}

#[tokio::test]
async fn transitive_local_module_change_marks_the_stack() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file(
        "s1/main.tf",
        "module \"m\" {\n  source = \"../mods/m\"\n}\n",
    );
    sandbox.write_file(
        "mods/m/main.tf",
        "module \"n\" {\n  source = \"../n\"\n}\n",
    );
    sandbox.write_file("mods/n/main.tf", "# v1\n");
    sandbox.commit_all("add stack and modules");

    sandbox.checkout_new("feature");
    sandbox.write_file("mods/n/x.tf", "# new\n");
    sandbox.commit_all("change leaf module");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
    let reason = &report.stacks[0].reason;
    assert!(reason.contains("\"../mods/m\""), "got: {reason}");
    assert!(reason.contains("\"../n\""), "got: {reason}");
    assert!(report.stacks[0].stack.is_changed);
}

#[tokio::test]
async fn remote_modules_are_assumed_unchanged() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file(
        "s1/main.tf",
        "module \"dns\" {\n  source = \"hashicorp/dns/aws\"\n}\n",
    );
    sandbox.commit_all("add stack");

    sandbox.checkout_new("feature");
    sandbox.write_file("unrelated.txt", "x\n");
    sandbox.commit_all("unrelated change");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert!(report.stacks.is_empty(), "got: {:?}", stack_dirs(&report));
}

#[tokio::test]
async fn cyclic_module_references_terminate() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file(
        "s1/main.tf",
        "module \"a\" {\n  source = \"../mods/a\"\n}\n",
    );
    sandbox.write_file(
        "mods/a/main.tf",
        "module \"b\" {\n  source = \"../b\"\n}\n",
    );
    sandbox.write_file(
        "mods/b/main.tf",
        "module \"a\" {\n  source = \"../a\"\n}\n",
    );
    sandbox.commit_all("add cyclic modules");

    sandbox.checkout_new("feature");
    sandbox.write_file("unrelated.txt", "x\n");
    sandbox.commit_all("unrelated change");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert!(report.stacks.is_empty(), "got: {:?}", stack_dirs(&report));
}

#[tokio::test]
async fn trigger_file_marks_its_stack() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.commit_all("add stack");

    sandbox.checkout_new("feature");
    sandbox.write_file(
        "s1/.terramate/trigger/2024-01-01.tm.hcl",
        "trigger {\n  reason = \"forced\"\n}\n",
    );
    sandbox.commit_all("trigger s1");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
    assert_eq!(
        report.stacks[0].reason,
        "stack has been triggered by: /s1/.terramate/trigger/2024-01-01.tm.hcl"
    );
}

#[tokio::test]
async fn deleted_trigger_file_is_ignored() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s1/.terramate/trigger/old.tm.hcl", "trigger {\n}\n");
    sandbox.commit_all("add stack with trigger");

    sandbox.checkout_new("feature");
    sandbox.remove_file("s1/.terramate/trigger/old.tm.hcl");
    sandbox.commit_all("remove trigger");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert!(report.stacks.is_empty(), "got: {:?}", stack_dirs(&report));
}

#[tokio::test]
async fn trigger_for_a_non_stack_directory_is_ignored() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.commit_all("add stack");

    sandbox.checkout_new("feature");
    sandbox.write_file("plain/.terramate/trigger/x.tm.hcl", "trigger {\n}\n");
    sandbox.commit_all("trigger non-stack");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert!(report.stacks.is_empty(), "got: {:?}", stack_dirs(&report));
}

#[tokio::test]
async fn report_is_sorted_and_deduplicated() {
    let sandbox = GitSandbox::new();
    for dir in ["s3", "s1", "s2"] {
        sandbox.write_file(&format!("{dir}/stack.tm.hcl"), "stack {\n}\n");
        sandbox.write_file(&format!("{dir}/main.tf"), "# v1\n");
    }
    sandbox.commit_all("add stacks");

    sandbox.checkout_new("feature");
    for dir in ["s3", "s1", "s2"] {
        sandbox.write_file(&format!("{dir}/main.tf"), "# v2\n");
        sandbox.write_file(&format!("{dir}/extra.tf"), "# extra\n");
    }
    sandbox.commit_all("change all stacks twice");

    let report = manager(&sandbox).list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1", "/s2", "/s3"]);
}

#[tokio::test]
async fn clean_state_checks_are_reported() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.commit_all("add stack");
    sandbox.write_file("scratch.txt", "untracked\n");

    let report = manager(&sandbox).list().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
    assert_eq!(report.checks.untracked_files, vec!["scratch.txt"]);
    assert!(report.checks.uncommitted_files.is_empty());
}

#[tokio::test]
async fn listing_outside_a_repository_still_works() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("s1")).unwrap();
    std::fs::write(dir.path().join("s1/stack.tm.hcl"), "stack {\n}\n").unwrap();

    let root = Root::load(dir.path()).unwrap();
    let manager = Manager::new(root, BASE_REF);

    let report = manager.list().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);
    assert!(report.checks.untracked_files.is_empty());

    let err = manager.list_changed().await.unwrap_err();
    assert!(format!("{err:#}").contains("listing changed stacks error"));
}

#[tokio::test]
async fn wants_closure_expands_changed_stacks() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n  wants = [\"/s3\"]\n}\n");
    sandbox.write_file("s1/main.tf", "# v1\n");
    sandbox.write_file("s2/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s3/stack.tm.hcl", "stack {\n}\n");
    sandbox.commit_all("add stacks");

    sandbox.checkout_new("feature");
    sandbox.write_file("s1/main.tf", "# v2\n");
    sandbox.commit_all("change s1");

    let manager = manager(&sandbox);
    let report = manager.list_changed().await.unwrap();
    assert_eq!(stack_dirs(&report), vec!["/s1"]);

    let seeds: Vec<_> = report.stacks.iter().map(|entry| &entry.stack).collect();
    let selected = manager.add_wanted_of(&seeds);
    let dirs: Vec<_> = selected.iter().map(|stack| stack.dir.as_str()).collect();
    assert_eq!(dirs, vec!["/s1", "/s3"]);
}

#[tokio::test]
async fn json_report_shape_is_stable() {
    let sandbox = GitSandbox::new();
    sandbox.write_file("s1/stack.tm.hcl", "stack {\n}\n");
    sandbox.write_file("s1/main.tf", "# v1\n");
    sandbox.commit_all("add stack");

    sandbox.checkout_new("feature");
    sandbox.write_file("s1/main.tf", "# v2\n");
    sandbox.commit_all("change s1");

    let report = manager(&sandbox).list_changed().await.unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stacks"][0]["stack"]["dir"], "/s1");
    assert_eq!(json["stacks"][0]["reason"], "stack has unmerged changes");
    assert!(json["checks"]["untracked_files"].as_array().unwrap().is_empty());
}
