//! End-to-end runs of the `clint` binary against scripted servers.

#![cfg(unix)]

use crate::common::{Project, stderr, stdout, warning};

#[test]
fn empty_project_has_no_files_to_check() {
    let project = Project::new();

    let output = project.clint(&[]);

    assert!(output.status.success());
    assert_eq!(stdout(&output), "No files to check\n");
}

#[test]
fn discovered_warning_fails_the_run() {
    let project = Project::new();
    project.write("src/main.cpp", "int main() { int x; return x; }\n");
    project.write("README.md", "not a source\n");
    project.publishing_server(
        "src/main.cpp",
        &format!(
            "[{}]",
            warning(
                4,
                2,
                "cppcoreguidelines-init-variables",
                "variable x is not initialized"
            )
        ),
    );

    let output = project.clint(&[]);
    let out = stdout(&output);

    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    assert!(out.starts_with("Checking 1 file(s) with sh...\n"), "{out}");
    assert!(
        out.contains(
            "src/main.cpp:5:3: warning: variable x is not initialized \
             [cppcoreguidelines-init-variables]\n"
        ),
        "{out}"
    );
    assert!(out.ends_with(
        "========================================\n\
         clangd lint: 1 warning(s)\n\
         ========================================\n"
    ));
}

#[test]
fn explicit_files_are_checked_in_order() {
    let project = Project::new();
    project.write("src/a.cpp", "int a;\n");
    project.write("src/b.cpp", "int b;\n");
    project.publishing_server(
        "src/a.cpp",
        &format!("[{}]", warning(0, 4, "readability-x", "short name")),
    );

    // b.cpp never gets a publish of its own, so it runs to the deadline.
    let output = project.clint(&["--timeout-secs", "1", "src/a.cpp", "src/b.cpp"]);
    let out = stdout(&output);

    assert_eq!(output.status.code(), Some(1));
    assert!(out.starts_with("Checking 2 file(s) with sh...\n"), "{out}");
    assert!(out.contains("src/a.cpp:1:5: warning: short name [readability-x]\n"));
    assert!(out.contains("clangd lint: 1 warning(s)"));
    assert!(stderr(&output).contains("src/b.cpp"));
}

#[test]
fn information_only_passes() {
    let project = Project::new();
    project.write("src/main.cpp", "int main() {}\n");
    project.publishing_server(
        "src/main.cpp",
        r#"[{"range":{"start":{"line":0,"character":0},"end":{"line":0,"character":3}},"severity":3,"message":"included header is unused"}]"#,
    );

    let output = project.clint(&[]);
    let out = stdout(&output);

    assert!(output.status.success(), "{out}");
    assert!(!out.contains("src/main.cpp:"));
    assert!(out.contains("clangd lint: 0 warning(s)"));
}

#[test]
fn missing_server_is_reported_per_file() {
    let project = Project::new();
    project.write("src/main.cpp", "int main() {}\n");
    project.write(
        "clint.toml",
        "[server]\ncommand = \"clint-test-no-such-server\"\n",
    );

    let output = project.clint(&[]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("clangd lint: 0 warning(s)"));
    assert!(stderr(&output).contains("src/main.cpp"));
}

#[test]
fn invalid_config_exits_with_usage_status() {
    let project = Project::new();
    project.write("clint.toml", "[run]\njobs = 0\n");

    let output = project.clint(&[]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("invalid config"));
}

#[test]
fn zero_jobs_flag_is_rejected() {
    let project = Project::new();

    let output = project.clint(&["--jobs", "0"]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn oversized_timeout_is_a_config_error() {
    let project = Project::new();
    project.write("src/main.cpp", "int main() {}\n");

    let output = project.clint(&["--timeout-secs", "18446744073709551615"]);

    assert_eq!(output.status.code(), Some(2), "{}", stderr(&output));
    assert!(stderr(&output).contains("timeout_secs"));
}
