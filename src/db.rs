use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

use crate::records::ActivityRecord;

pub const DB_FILE_NAME: &str = "gradesd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            group_id TEXT NOT NULL,
            student_key TEXT NOT NULL,
            display_name TEXT,
            email TEXT,
            uid TEXT,
            matricula TEXT,
            updated_at TEXT,
            PRIMARY KEY(group_id, student_key)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_records(
            group_id TEXT NOT NULL,
            student_key TEXT NOT NULL,
            id TEXT NOT NULL,
            label TEXT NOT NULL,
            unit INTEGER,
            kind TEXT,
            raw_max REAL,
            raw_points REAL,
            max_points REAL,
            points REAL,
            weight REAL,
            category_key TEXT,
            graded_at TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(group_id, student_key, id),
            FOREIGN KEY(group_id, student_key) REFERENCES students(group_id, student_key)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_records_student
         ON activity_records(group_id, student_key, sort_order)",
        [],
    )?;

    Ok(conn)
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET
           value_json = excluded.value_json,
           updated_at = excluded.updated_at",
        (key, serde_json::to_string(value)?, now_text()),
    )?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(n > 0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub group_id: String,
    pub student_key: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub uid: Option<String>,
    pub matricula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
}

pub fn students_list(conn: &Connection, group_id: &str) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT
           s.group_id,
           s.student_key,
           s.display_name,
           s.email,
           s.uid,
           s.matricula,
           (SELECT COUNT(*) FROM activity_records r
             WHERE r.group_id = s.group_id AND r.student_key = s.student_key)
         FROM students s
         WHERE s.group_id = ?
         ORDER BY COALESCE(s.display_name, s.student_key), s.student_key",
    )?;
    let rows = stmt
        .query_map([group_id], |row| {
            Ok(StudentRow {
                group_id: row.get(0)?,
                student_key: row.get(1)?,
                display_name: row.get(2)?,
                email: row.get(3)?,
                uid: row.get(4)?,
                matricula: row.get(5)?,
                record_count: Some(row.get(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_exists(conn: &Connection, group_id: &str, student_key: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE group_id = ? AND student_key = ?",
            (group_id, student_key),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert or update; returns true when the row is new.
pub fn student_upsert(conn: &Connection, row: &StudentRow) -> anyhow::Result<bool> {
    let existed = student_exists(conn, &row.group_id, &row.student_key)?;
    conn.execute(
        "INSERT INTO students(group_id, student_key, display_name, email, uid, matricula, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(group_id, student_key) DO UPDATE SET
           display_name = excluded.display_name,
           email = excluded.email,
           uid = excluded.uid,
           matricula = excluded.matricula,
           updated_at = excluded.updated_at",
        (
            &row.group_id,
            &row.student_key,
            &row.display_name,
            &row.email,
            &row.uid,
            &row.matricula,
            now_text(),
        ),
    )?;
    Ok(!existed)
}

/// Removes the student and all of their records. Returns the number of
/// records deleted, or `None` when the student did not exist.
pub fn student_delete(conn: &Connection, group_id: &str, student_key: &str) -> anyhow::Result<Option<usize>> {
    if !student_exists(conn, group_id, student_key)? {
        return Ok(None);
    }
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute(
        "DELETE FROM activity_records WHERE group_id = ? AND student_key = ?",
        (group_id, student_key),
    )?;
    tx.execute(
        "DELETE FROM students WHERE group_id = ? AND student_key = ?",
        (group_id, student_key),
    )?;
    tx.commit()?;
    Ok(Some(removed))
}

fn graded_at_text(at: &Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339())
}

fn parse_graded_at(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub fn records_list(conn: &Connection, group_id: &str, student_key: &str) -> anyhow::Result<Vec<ActivityRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, label, unit, kind, raw_max, raw_points, max_points, points, weight,
                graded_at, category_key
         FROM activity_records
         WHERE group_id = ? AND student_key = ?
         ORDER BY sort_order, id",
    )?;
    let rows = stmt
        .query_map((group_id, student_key), |row| {
            Ok(ActivityRecord {
                id: row.get(0)?,
                label: row.get(1)?,
                unit: row.get(2)?,
                kind: row.get(3)?,
                raw_max: row.get(4)?,
                raw_points: row.get(5)?,
                max: row.get(6)?,
                points: row.get(7)?,
                weight: row.get(8)?,
                graded_at: parse_graded_at(row.get(9)?),
                category_key: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn next_sort_order(conn: &Connection, group_id: &str, student_key: &str) -> anyhow::Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sort_order) FROM activity_records WHERE group_id = ? AND student_key = ?",
        (group_id, student_key),
        |r| r.get(0),
    )?;
    Ok(max.map(|m| m + 1).unwrap_or(0))
}

fn write_record(
    conn: &Connection,
    group_id: &str,
    student_key: &str,
    record: &ActivityRecord,
    sort_order: i64,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO activity_records(
           group_id, student_key, id, label, unit, kind, raw_max, raw_points,
           max_points, points, weight, category_key, graded_at, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(group_id, student_key, id) DO UPDATE SET
           label = excluded.label,
           unit = excluded.unit,
           kind = excluded.kind,
           raw_max = excluded.raw_max,
           raw_points = excluded.raw_points,
           max_points = excluded.max_points,
           points = excluded.points,
           weight = excluded.weight,
           category_key = excluded.category_key,
           graded_at = excluded.graded_at,
           updated_at = excluded.updated_at",
        rusqlite::params![
            group_id,
            student_key,
            record.id,
            record.label,
            record.unit,
            record.kind,
            record.raw_max,
            record.raw_points,
            record.max,
            record.points,
            record.weight,
            record.category_key,
            graded_at_text(&record.graded_at),
            sort_order,
            now_text(),
        ],
    )
}

/// Insert or update one record. New records go to the end of the list;
/// updates keep their position.
pub fn record_upsert(
    conn: &Connection,
    group_id: &str,
    student_key: &str,
    record: &ActivityRecord,
) -> anyhow::Result<()> {
    let sort_order = next_sort_order(conn, group_id, student_key)?;
    write_record(conn, group_id, student_key, record, sort_order)?;
    Ok(())
}

/// Replaces a student's full record set in one transaction.
pub fn records_replace(
    conn: &Connection,
    group_id: &str,
    student_key: &str,
    records: &[ActivityRecord],
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM activity_records WHERE group_id = ? AND student_key = ?",
        (group_id, student_key),
    )?;
    for (i, record) in records.iter().enumerate() {
        write_record(&tx, group_id, student_key, record, i as i64)?;
    }
    tx.commit()?;
    Ok(records.len())
}

pub fn record_delete(conn: &Connection, group_id: &str, student_key: &str, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM activity_records WHERE group_id = ? AND student_key = ? AND id = ?",
        (group_id, student_key, id),
    )?;
    Ok(n > 0)
}
