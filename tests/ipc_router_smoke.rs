use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .env_remove("SCHOOLD_CONFIG")
        .env_remove("SCHOOLD_STORE_PATH")
        .env_remove("SCHOOLD_MODEL_PATH")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("schoold-router-smoke");
    let store_path = workspace.join("school.sqlite3");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert_eq!(health["result"]["storeOpen"], json!(false));

    // Store-backed methods refuse to run before a store is open.
    let early = request(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    assert_eq!(error_code(&early), Some("no_store"));

    let opened = request(
        &mut stdin,
        &mut reader,
        "3",
        "store.open",
        json!({ "path": store_path.to_string_lossy() }),
    );
    assert_eq!(opened["ok"], json!(true), "{}", opened);
    assert_eq!(
        opened["result"]["sheets"],
        json!(["full-dataset", "financial-dataset", "exams-dataset"])
    );

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("datasets.reload", json!({})),
        ("classes.list", json!({})),
        ("classes.context", json!({ "class": "5 A" })),
        ("daily.submit", json!({})),
        ("exams.submit", json!({})),
        ("admissions.submit", json!({})),
        ("reports.dashboard", json!({ "year": 2024, "month": 4, "day": 3 })),
        ("reports.finance", json!({ "year": 2024, "month": 4 })),
        ("reports.discipline", json!({ "year": 2024 })),
        ("forecast.features", json!({})),
        ("forecast.predict", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("call-{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, params);
        assert_ne!(
            error_code(&resp),
            Some("not_implemented"),
            "unexpected unknown method for {}",
            method
        );
    }

    let unknown = request(&mut stdin, &mut reader, "9", "grades.compute", json!({}));
    assert_eq!(unknown["ok"], json!(false));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(v["ok"], json!(false));
    assert_eq!(error_code(&v), Some("bad_json"));

    let health = request(&mut stdin, &mut reader, "after", "health", json!({}));
    assert_eq!(health["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
}
