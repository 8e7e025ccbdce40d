use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ctxa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ctxa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("rust.txt"),
        "Rust 的所有权系统在编译期保证内存安全。借用检查器防止数据竞争。",
    )
    .unwrap();
    fs::write(
        docs_dir.join("python.md"),
        "Python 是一门动态类型语言，广泛用于数据分析和机器学习。",
    )
    .unwrap();
    fs::write(docs_dir.join("ignored.bin"), [0u8, 1, 2, 3]).unwrap();

    let config_content = format!(
        r#"[model]
api_key = ""

[memory]
max_history_length = 5
sessions_dir = "{}/sessions"

[knowledge]
chunk_size = 200
top_k = 3

[tools.weather]
api_key = ""
"#,
        root.display()
    );

    let config_path = config_dir.join("assistant.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ctxa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctxa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctxa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_route_weather() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxa(&config_path, &["route", "杭州市天气怎么样"]);
    assert!(success, "route failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(stdout, "tool: weather\nargument: 杭州市\n");
}

#[test]
fn test_route_plain_chat() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ctxa(&config_path, &["route", "讲个笑话吧"]);
    assert!(success);
    assert_eq!(stdout, "tool: none\n");
}

#[test]
fn test_route_file_without_drive_letter_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ctxa(&config_path, &["route", "读取 report.txt 的内容"]);
    assert!(!success);
    assert!(stderr.contains("routing failed"), "stderr: {}", stderr);
}

#[test]
fn test_retrieve_ranks_matching_document_first() {
    let (tmp, config_path) = setup_test_env();
    let docs = tmp.path().join("docs");

    let (stdout, stderr, success) = run_ctxa(
        &config_path,
        &["retrieve", "所有权 内存", "--knowledge", docs.to_str().unwrap()],
    );
    assert!(success, "retrieve failed: stdout={}, stderr={}", stdout, stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "unexpected output: {}", stdout);
    assert!(first.ends_with("rust.txt"), "unexpected output: {}", stdout);
    assert!(!stdout.contains("ignored.bin"));
}

#[test]
fn test_retrieve_deterministic() {
    let (tmp, config_path) = setup_test_env();
    let docs = tmp.path().join("docs");
    let args = ["retrieve", "数据", "--knowledge", docs.to_str().unwrap()];

    let (stdout1, _, _) = run_ctxa(&config_path, &args);
    let (stdout2, _, _) = run_ctxa(&config_path, &args);
    assert_eq!(stdout1, stdout2);
}

#[test]
fn test_tool_file_reads_document() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("docs").join("rust.txt");

    let (stdout, stderr, success) =
        run_ctxa(&config_path, &["tool", "file", file.to_str().unwrap()]);
    assert!(success, "tool failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("[file ok] file content:\n"));
    assert!(stdout.contains("所有权系统"));
}

#[test]
fn test_tool_weather_without_key_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ctxa(&config_path, &["tool", "weather", "杭州市"]);
    assert!(!success);
    assert!(stdout.contains("[weather failed]"));
}

#[test]
fn test_ask_without_model_key_exits_nonzero() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ctxa(&config_path, &["ask", "讲个笑话吧"]);
    assert!(!success);
    assert!(stderr.contains("model API key is not configured"), "stderr: {}", stderr);
}

#[test]
fn test_ask_rejects_invalid_input() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ctxa(&config_path, &["ask", "hello 😀"]);
    assert!(!success);
    assert!(stderr.contains("invalid input"), "stderr: {}", stderr);
}

#[test]
fn test_sessions_list_show_delete() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ctxa(&config_path, &["sessions", "list"]);
    assert!(success);
    assert!(stdout.contains("No saved sessions."));

    let sessions_dir = tmp.path().join("sessions");
    fs::create_dir_all(&sessions_dir).unwrap();
    fs::write(
        sessions_dir.join("chat_你好_20260101_120000.json"),
        r#"[{"role":"user","content":"你好"},{"role":"ai","content":"你好！"}]"#,
    )
    .unwrap();

    let (stdout, _, success) = run_ctxa(&config_path, &["sessions", "list"]);
    assert!(success);
    assert_eq!(stdout.trim(), "chat_你好_20260101_120000.json");

    let (stdout, stderr, success) = run_ctxa(
        &config_path,
        &["sessions", "show", "chat_你好_20260101_120000.json"],
    );
    assert!(success, "show failed: {}", stderr);
    assert_eq!(stdout, "[user] 你好\n[assistant] 你好！\n");

    let (_, _, success) = run_ctxa(
        &config_path,
        &["sessions", "delete", "chat_你好_20260101_120000.json"],
    );
    assert!(success);
    assert!(!sessions_dir.join("chat_你好_20260101_120000.json").exists());
}

#[test]
fn test_missing_explicit_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_ctxa(&missing, &["route", "你好"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
