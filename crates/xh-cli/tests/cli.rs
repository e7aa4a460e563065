//! End-to-end tests for the `xh` binary against a temporary XH_HOME.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const SS: &str = "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@example.com:8443#My%20Node";
const TROJAN: &str = "trojan://secret@t.example.com:443?sni=front.example.com#HK%201";

/// Test context that sets up a temporary xh home
struct TestContext {
    _temp_dir: TempDir,
    xh_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let xh_home = temp_dir.path().join(".xh");
        std::fs::create_dir_all(&xh_home).expect("failed to create xh home");
        Self {
            _temp_dir: temp_dir,
            xh_home,
        }
    }

    fn xh_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_xh"));
        cmd.env("HOME", &self.xh_home);
        cmd.env("XH_HOME", &self.xh_home);
        cmd.env_remove("XH_CONFIG");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.xh_cmd().args(args).output().expect("failed to run xh")
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.xh_home.join(name);
        std::fs::write(&path, content).expect("failed to write file");
        path
    }

    fn data_dir(&self) -> PathBuf {
        self.xh_home.join("data")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp path is UTF-8")
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("update"));
    assert!(stdout.contains("nodes"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.run(&["--version"]).status.success());
}

#[test]
fn test_completions_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("xh"));
}

#[test]
fn test_nodes_table_skips_bad_lines() {
    let ctx = TestContext::new();
    let feed = ctx.write(
        "feed.txt",
        &format!("{SS}\nnot a link\n{TROJAN}\nss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@h:port#x\n"),
    );

    let output = ctx.run(&["nodes", "--file", path_str(&feed)]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("My Node"));
    assert!(stdout.contains("example.com:8443"));
    assert!(stdout.contains("HK 1"));
    assert!(!stdout.contains("secret"));
    assert!(stderr(&output).contains("line 2"));
    assert!(stderr(&output).contains("line 4"));
}

#[test]
fn test_nodes_json() {
    let ctx = TestContext::new();
    let feed = ctx.write("feed.txt", &format!("{SS}\n{TROJAN}\n"));

    let output = ctx.run(&["nodes", "--json", "--file", path_str(&feed)]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let nodes: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("stdout is JSON");
    let nodes = nodes.as_array().expect("JSON array");
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["node_name"], "My Node");
    assert_eq!(nodes[0]["protocol_kind"], "shadowsocks");
    assert_eq!(nodes[0]["protocol_fields"]["method"], "aes-256-gcm");
    assert_eq!(nodes[1]["protocol_kind"], "trojan");
}

#[test]
fn test_nodes_outbound_skips_shadowsocks() {
    let ctx = TestContext::new();
    let feed = ctx.write("feed.txt", &format!("{SS}\n{TROJAN}\n"));

    let output = ctx.run(&["nodes", "--outbound", "proxy", "--file", path_str(&feed)]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("stdout is JSON");
    let outbounds = doc["outbounds"].as_array().expect("outbounds array");
    assert_eq!(outbounds.len(), 1);
    assert_eq!(outbounds[0]["protocol"], "trojan");
    assert_eq!(outbounds[0]["tag"], "proxy-2");
    assert!(stderr(&output).contains("no outbound renderer"));
}

#[test]
fn test_nodes_all_lines_bad_fails() {
    let ctx = TestContext::new();
    let feed = ctx.write("feed.txt", "garbage\nvmess://!!!\n");

    let output = ctx.run(&["nodes", "--file", path_str(&feed)]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("could be parsed"));
}

#[test]
fn test_nodes_reads_configured_output() {
    let ctx = TestContext::new();
    std::fs::create_dir_all(ctx.data_dir()).unwrap();
    std::fs::write(ctx.data_dir().join("sub.txt"), format!("{TROJAN}\n")).unwrap();

    let output = ctx.run(&["nodes"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("HK 1"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--config", "/nonexistent/xh.toml", "update", "subscribe"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
}

#[test]
fn test_update_core_rejects_unknown_core_type() {
    let ctx = TestContext::new();
    let data_dir = ctx.data_dir();
    let config = ctx.write(
        "config.toml",
        &format!(
            "[core]\ntype = \"clash\"\ndata_dir = \"{}\"\n\n[update]\nxray_url = \"http://127.0.0.1:9/never\"\n",
            path_str(&data_dir)
        ),
    );

    let output = ctx.run(&["--config", path_str(&config), "update", "core"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("unsupported core type: clash"));
    assert!(!data_dir.exists());
}

#[test]
fn test_update_subscribe_writes_feed() {
    let mut server = mockito::Server::new();
    let _good = server
        .mock("GET", "/good")
        .with_body(STANDARD.encode(format!("{SS}\n{TROJAN}\n")))
        .create();
    let _bad = server
        .mock("GET", "/bad")
        .with_body("*** not base64 ***")
        .create();

    let ctx = TestContext::new();
    let config = ctx.write(
        "config.toml",
        &format!(
            "[subscribe]\nsources = [\"{url}/bad\", \"{url}/good\"]\n",
            url = server.url()
        ),
    );

    let output = ctx.run(&["--config", path_str(&config), "update", "subscribe"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let written = std::fs::read_to_string(ctx.data_dir().join("sub.txt")).unwrap();
    assert_eq!(written, format!("{SS}\n{TROJAN}\n"));
    assert!(stderr(&output).contains("/bad"));
}

#[test]
fn test_update_subscribe_all_sources_failing_is_an_error() {
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/down").with_status(500).create();

    let ctx = TestContext::new();
    let config = ctx.write(
        "config.toml",
        &format!("[subscribe]\nsources = [\"{}/down\"]\n", server.url()),
    );

    let output = ctx.run(&["--config", path_str(&config), "update", "subscribe"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("All 1 subscription sources failed"));
    assert!(!ctx.data_dir().join("sub.txt").exists());
}

#[test]
fn test_update_subscribe_without_sources_is_ok() {
    let ctx = TestContext::new();
    let output = ctx.run(&["update", "subscribe"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("No subscription sources configured"));
}
