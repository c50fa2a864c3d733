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

fn upsert_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    profile: serde_json::Value,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "students.upsert",
        json!({ "groupId": "g1", "profile": profile }),
    );
    res.get("studentKey")
        .and_then(|v| v.as_str())
        .expect("studentKey")
        .to_string()
}

#[test]
fn records_persist_and_feed_student_summary() {
    let workspace = temp_dir("gradesd-records-ipc");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let key = upsert_student(
        &mut stdin,
        &mut reader,
        "2",
        json!({ "matricula": "A-0012", "uid": "zz9", "displayName": "Beto" }),
    );
    assert_eq!(key, "id-a-0012");

    // Instructor entry: 15 of 20 captured onto the 0-10 scale, then stored.
    let captured = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.capture",
        json!({ "id": "u1-exam", "label": "Unidad 1 Examen", "weight": 40, "rawValue": 15, "inputMax": 20 }),
    );
    let record = captured.get("record").cloned().expect("record");
    assert_eq!(record.get("points").and_then(|v| v.as_f64()), Some(7.5));
    assert_eq!(record.get("unit").and_then(|v| v.as_i64()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "records.upsert",
        json!({ "groupId": "g1", "studentKey": key, "record": record }),
    );
    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "records.upsert",
        json!({
            "groupId": "g1",
            "studentKey": key,
            "record": { "nombre": "U2 Foro", "puntos": 10, "maxPuntos": 10, "ponderacion": 60, "fecha": "2024-03-01" }
        }),
    );
    let generated_id = generated
        .get("recordId")
        .and_then(|v| v.as_str())
        .expect("recordId")
        .to_string();
    assert!(!generated_id.is_empty());

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "records.list",
        json!({ "groupId": "g1", "studentKey": key }),
    );
    let rows = listed.get("records").and_then(|v| v.as_array()).expect("records");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id").and_then(|v| v.as_str()), Some("u1-exam"));
    assert_eq!(rows[0].get("rawPoints").and_then(|v| v.as_f64()), Some(15.0));
    assert_eq!(
        rows[1].get("gradedAt").and_then(|v| v.as_str()).map(|s| s.starts_with("2024-03-01")),
        Some(true)
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "calc.studentSummary",
        json!({ "groupId": "g1", "studentKey": key }),
    );
    let summary = summary.get("summary").expect("summary");
    let units = summary.get("units").and_then(|v| v.as_array()).expect("units");
    assert_eq!(units[0].get("percentage").and_then(|v| v.as_f64()), Some(30.0));
    assert_eq!(units[1].get("percentage").and_then(|v| v.as_f64()), Some(60.0));
    let final_pct = summary
        .pointer("/final/percentage")
        .and_then(|v| v.as_f64())
        .expect("final percentage");
    assert!((final_pct - 27.0).abs() < 1e-9);
    // Dated record sorts before the undated capture.
    let first = summary.pointer("/records/0/id").and_then(|v| v.as_str());
    assert_eq!(first, Some(generated_id.as_str()));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn records_methods_validate_scope_and_shape() {
    let workspace = temp_dir("gradesd-records-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "records.list",
        json!({ "groupId": "g1", "studentKey": "email-nobody" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let no_identity = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.upsert",
        json!({ "groupId": "g1", "profile": { "name": "Sin correo" } }),
    );
    assert_eq!(error_code(&no_identity), "bad_params");

    let key = upsert_student(&mut stdin, &mut reader, "4", json!({ "uid": "U-77" }));
    assert_eq!(key, "uid-u-77");

    let not_array = request(
        &mut stdin,
        &mut reader,
        "5",
        "records.replace",
        json!({ "groupId": "g1", "studentKey": key, "records": { "id": "x" } }),
    );
    assert_eq!(error_code(&not_array), "bad_params");

    // Malformed elements are stored as-is, never rejected.
    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "records.replace",
        json!({ "groupId": "g1", "studentKey": key, "records": [ 42, { "id": "ok", "points": "abc" } ] }),
    );
    assert_eq!(replaced.get("count").and_then(|v| v.as_u64()), Some(2));

    let gone = request(
        &mut stdin,
        &mut reader,
        "7",
        "records.delete",
        json!({ "groupId": "g1", "studentKey": key, "recordId": "nope" }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "students.delete",
        json!({ "groupId": "g1", "studentKey": key }),
    );
    assert_eq!(deleted.get("deletedRecords").and_then(|v| v.as_u64()), Some(2));

    let after = request(
        &mut stdin,
        &mut reader,
        "9",
        "calc.studentSummary",
        json!({ "groupId": "g1", "studentKey": key }),
    );
    assert_eq!(error_code(&after), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn group_overview_lists_students_by_name() {
    let workspace = temp_dir("gradesd-group-overview");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let zoe = upsert_student(
        &mut stdin,
        &mut reader,
        "2",
        json!({ "email": "zoe@example.com", "name": "Zoe" }),
    );
    let ana = upsert_student(
        &mut stdin,
        &mut reader,
        "3",
        json!({ "email": "ana@example.com", "name": "Ana" }),
    );
    let full_marks = json!([
        { "id": "1", "label": "U1", "points": 10, "max": 10, "weight": 100 },
        { "id": "2", "label": "U2", "points": 10, "max": 10, "weight": 100 },
        { "id": "3", "label": "U3", "points": 10, "max": 10, "weight": 100 }
    ]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "records.replace",
        json!({ "groupId": "g1", "studentKey": ana, "records": full_marks }),
    );

    let overview = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "calc.groupOverview",
        json!({ "groupId": "g1" }),
    );
    let students = overview.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(students[0].get("studentKey").and_then(|v| v.as_str()), Some(ana.as_str()));
    assert_eq!(students[0].get("letter").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(students[0].get("outOfFive").and_then(|v| v.as_f64()), Some(5.0));
    assert_eq!(students[1].get("studentKey").and_then(|v| v.as_str()), Some(zoe.as_str()));
    assert_eq!(students[1].get("finalPercentage").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(students[1].get("letter").and_then(|v| v.as_str()), Some("F"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn numeric_matricula_becomes_an_id_key() {
    let workspace = temp_dir("gradesd-numeric-matricula");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let key = upsert_student(
        &mut stdin,
        &mut reader,
        "2",
        json!({ "matricula": 20231234, "nombre": "Ana" }),
    );
    assert_eq!(key, "id-20231234");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.list",
        json!({ "groupId": "g1" }),
    );
    let students = listed.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("matricula").and_then(|v| v.as_str()),
        Some("20231234")
    );

    drop(stdin);
    let _ = child.wait();
}
