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
    let exe = env!("CARGO_BIN_EXE_gradesd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradesd");
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradesd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    // Workspace methods refuse to run before a workspace is selected.
    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.list",
        json!({ "groupId": "g1" }),
    );
    assert_eq!(error_code(&early), "no_workspace");

    let records = json!([
        { "id": "a", "label": "Unidad 1 Examen", "rawPoints": 8, "rawMax": 10, "weight": 40 }
    ]);
    let stateless: Vec<(&str, serde_json::Value)> = vec![
        ("grades.normalize", json!({ "records": records })),
        ("grades.unitScore", json!({ "records": records, "unit": 1 })),
        ("grades.globalSummary", json!({ "records": records })),
        ("grades.finalGrade", json!({ "unit1": 80, "unit2": 80, "unit3": 100 })),
        ("grades.convert", json!({ "percentage": 88 })),
        ("grades.summary", json!({ "records": records })),
        ("grades.categoryModel", json!({ "unit1": { "examen": 8 }, "project": 9 })),
        ("grades.inferUnit", json!({ "label": "U2 Foro" })),
        ("grades.capture", json!({ "label": "U1 Taller", "rawValue": 7 })),
        ("grades.inputValue", json!({ "record": { "points": 7.5 }, "inputMax": 20 })),
    ];
    for (i, (method, params)) in stateless.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("s{}", i), method, params);
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.upsert",
        json!({ "groupId": "g1", "profile": { "email": "Ana@Example.com", "name": "Ana" } }),
    );
    let student_key = created
        .get("studentKey")
        .and_then(|v| v.as_str())
        .expect("studentKey")
        .to_string();
    assert_eq!(student_key, "email-ana-example-com");

    let scoped: Vec<(&str, serde_json::Value)> = vec![
        ("students.list", json!({ "groupId": "g1" })),
        (
            "records.upsert",
            json!({ "groupId": "g1", "studentKey": student_key, "record": { "id": "a", "label": "U1", "points": 5 } }),
        ),
        ("records.list", json!({ "groupId": "g1", "studentKey": student_key })),
        (
            "records.replace",
            json!({ "groupId": "g1", "studentKey": student_key, "records": records }),
        ),
        ("calc.studentSummary", json!({ "groupId": "g1", "studentKey": student_key })),
        (
            "calc.studentCategoryModel",
            json!({ "groupId": "g1", "studentKey": student_key }),
        ),
        ("calc.groupOverview", json!({ "groupId": "g1" })),
        ("calc.config.get", json!({})),
        ("calc.config.update", json!({ "finalWeights": { "unit1": 0.2, "unit2": 0.3, "unit3": 0.5 } })),
        ("calc.config.clearOverride", json!({})),
        (
            "records.delete",
            json!({ "groupId": "g1", "studentKey": student_key, "recordId": "a" }),
        ),
        ("students.delete", json!({ "groupId": "g1", "studentKey": student_key })),
    ];
    for (i, (method, params)) in scoped.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("w{}", i), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "5", "grades.nope", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let reply: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(error_code(&reply), "bad_json");

    // The daemon keeps serving after a malformed line.
    let _ = request_ok(&mut stdin, &mut reader, "6", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}
