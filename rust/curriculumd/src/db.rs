use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "curriculum.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS competences(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            year_id TEXT NOT NULL,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            criteria_json TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_competences_subject_year ON competences(subject_id, year_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS modules(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            specific_competences_json TEXT NOT NULL,
            selected_criteria_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_modules_subject ON modules(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_situations(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_learning_situations_subject ON learning_situations(subject_id)",
        [],
    )?;

    // No foreign key on module_id: a link to a module that is gone or not
    // synced yet surfaces as an unresolved module reference.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_situation_modules(
            situation_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(situation_id, module_id),
            FOREIGN KEY(situation_id) REFERENCES learning_situations(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS planning_units(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            unit_number INTEGER NOT NULL,
            learning_situation_id TEXT,
            start_date TEXT,
            end_date TEXT,
            title TEXT,
            notes TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE(subject_id, unit_number),
            FOREIGN KEY(learning_situation_id) REFERENCES learning_situations(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_planning_units_situation ON planning_units(learning_situation_id)",
        [],
    )?;

    Ok(conn)
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
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
