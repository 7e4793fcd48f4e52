use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread::{self, JoinHandle};

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn tessera_cmd(home: &Path, cwd: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tessera"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG")
        .current_dir(cwd);
    cmd
}

/// Answer `replies.len()` requests with (status, JSON body); returns the
/// request lines seen.
fn serve(replies: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in replies {
            let Ok((mut stream, _)) = listener.accept() else {
                break;
            };
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("request line");
            let mut length = 0usize;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).expect("header");
                if header.trim().is_empty() {
                    break;
                }
                if let Some(v) = header.to_ascii_lowercase().strip_prefix("content-length:") {
                    length = v.trim().parse().unwrap_or(0);
                }
            }
            let mut payload = vec![0u8; length];
            reader.read_exact(&mut payload).expect("body");
            let response = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
            seen.push(line.trim_end().to_string());
        }
        seen
    });
    (base, handle)
}

fn project_with_model(home: &TempDir, workspace: &TempDir, repo: &str) -> PathBuf {
    let dir = workspace.path().join("shop");
    tessera_cmd(home.path(), workspace.path())
        .args(["init", dir.to_str().unwrap(), "--repo", repo])
        .assert()
        .success();
    tessera_cmd(home.path(), &dir)
        .args(["new", "model", "user"])
        .assert()
        .success();
    dir
}

fn state_file(dir: &Path) -> PathBuf {
    dir.join(".tessera").join("sync-state.json")
}

#[test]
fn offline_status_and_local_diff_list_new_files() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let dir = project_with_model(&home, &workspace, "http://127.0.0.1:9/acme/shop");

    let output = tessera_cmd(home.path(), &dir)
        .args(["status", "--offline", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(status["appId"], "shop");
    assert_eq!(status["ahead"], 7);
    assert_eq!(status["localVersion"], "");
    assert!(status["behind"].is_null());

    tessera_cmd(home.path(), &dir)
        .args(["diff", "--local"])
        .assert()
        .success()
        .stdout(contains("meta/User/User.columns.json"));
}

#[test]
fn push_dry_run_lists_changes_without_network() {
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    // Four .gitkeep files plus three model files; port 9 has no listener.
    let dir = project_with_model(&home, &workspace, "http://127.0.0.1:9/acme/shop");

    tessera_cmd(home.path(), &dir)
        .args(["push", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would push 7 change(s)"));
    assert!(!state_file(&dir).exists());
}

#[test]
fn push_records_state_and_second_push_is_a_noop() {
    let (base, server) = serve(vec![(200, r#"{"version":"20240101000000"}"#)]);
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let dir = project_with_model(&home, &workspace, &format!("{base}/acme/shop"));

    tessera_cmd(home.path(), &dir)
        .args(["push", "-m", "first"])
        .assert()
        .success()
        .stdout(contains("version 20240101000000"));
    let seen = server.join().expect("server");
    assert!(seen[0].starts_with("POST /api/cli/app/upload"));

    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(state_file(&dir)).unwrap()).unwrap();
    assert_eq!(state["version"], "20240101000000");
    assert!(state["files"]["meta/User/User.define.json"].is_string());

    tessera_cmd(home.path(), &dir)
        .args(["push"])
        .assert()
        .success()
        .stdout(contains("Nothing to push"));
}

#[test]
fn rejected_push_fails_and_leaves_no_state() {
    let (base, server) = serve(vec![(409, r#"{"message":"version conflict"}"#)]);
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let dir = project_with_model(&home, &workspace, &format!("{base}/acme/shop"));

    tessera_cmd(home.path(), &dir)
        .args(["push"])
        .assert()
        .failure()
        .stderr(contains("version conflict"));
    server.join().expect("server");
    assert!(!state_file(&dir).exists());
}

#[test]
fn ping_reports_reachability() {
    let (base, server) = serve(vec![(200, "{}")]);
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let dir = project_with_model(&home, &workspace, &format!("{base}/acme/shop"));

    tessera_cmd(home.path(), &dir)
        .args(["ping"])
        .assert()
        .success()
        .stdout(contains("is reachable"));
    let seen = server.join().expect("server");
    assert!(seen[0].starts_with("GET /health"));
}

#[test]
fn api_url_setting_overrides_repo_host() {
    let (base, server) = serve(vec![(200, "{}")]);
    let home = TempDir::new().expect("home");
    let workspace = TempDir::new().expect("workspace");
    let dir = project_with_model(&home, &workspace, "http://127.0.0.1:9/acme/shop");

    tessera_cmd(home.path(), &dir)
        .args(["config", "set", "api.url", &base])
        .assert()
        .success();
    tessera_cmd(home.path(), &dir)
        .args(["ping"])
        .assert()
        .success();
    server.join().expect("server");
}
