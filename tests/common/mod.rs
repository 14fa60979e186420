//! Shared fixtures: a throwaway project with a scripted `sh` language server.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};

const PRELUDE: &str = r#"
send() {
  printf 'Content-Length: %d\r\n\r\n%s' "${#1}" "$1"
}
"#;

pub const INIT_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;

pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Canonical root, matching what the binary resolves `--root` to.
    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    /// `file://` URI the server receives for `rel`. Temp paths need no escaping.
    pub fn uri(&self, rel: &str) -> String {
        format!("file://{}", self.root().join(rel).display())
    }

    /// Install `body` as the server and point `clint.toml` at it.
    pub fn server_script(&self, body: &str) {
        let script = self.write("server.sh", &format!("{PRELUDE}\n{body}\n"));
        self.write(
            "clint.toml",
            &format!(
                "[server]\ncommand = \"sh\"\nargs = [\"{}\"]\nsettle_window_ms = 150\nshutdown_grace_ms = 200\n\n[run]\ntimeout_secs = 5\n",
                script.display()
            ),
        );
    }

    /// A server that answers initialize and publishes `diagnostics` (a JSON
    /// array) for `rel`, then idles until killed.
    pub fn publishing_server(&self, rel: &str, diagnostics: &str) {
        let publish = format!(
            r#"{{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{{"uri":"{}","diagnostics":{diagnostics}}}}}"#,
            self.uri(rel)
        );
        self.server_script(&format!(
            "send '{INIT_RESPONSE}'\nsleep 0.1\nsend '{publish}'\nexec sleep 30"
        ));
    }

    pub fn clint(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_clint"))
            .arg("--root")
            .arg(self.root())
            .args(args)
            .env_remove("CLINT_LOG")
            .env_remove("RUST_LOG")
            .env("HOME", self.root())
            .output()
            .unwrap()
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn warning(line: u32, col: u32, code: &str, message: &str) -> String {
    format!(
        r#"{{"range":{{"start":{{"line":{line},"character":{col}}},"end":{{"line":{line},"character":{col}}}}},"severity":2,"code":"{code}","message":"{message}"}}"#
    )
}
