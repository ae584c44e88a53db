//! Snapshot reads and writes against the workspace database.
//!
//! These are the local stand-in for the system of record: they hand the
//! coverage and planning code complete snapshots, and apply the writes that
//! planner gestures turn into.

use crate::model::{Competence, Criterion, LearningSituation, Module, ModuleRef, PlanningUnit, SituationSummary};
use crate::planning::UnitUpsert;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

fn new_id_if_blank(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        trimmed.to_string()
    }
}

fn format_date(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

pub fn list_competences(conn: &Connection, subject_id: &str, year_id: &str) -> anyhow::Result<Vec<Competence>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, description, criteria_json
         FROM competences
         WHERE subject_id = ? AND year_id = ?
         ORDER BY sort_order, code, id",
    )?;
    let rows = stmt.query_map(params![subject_id, year_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, code, description, criteria_raw) = row?;
        let evaluation_criteria: Vec<Criterion> = serde_json::from_str(&criteria_raw)?;
        out.push(Competence {
            id,
            code,
            description,
            evaluation_criteria,
        });
    }
    Ok(out)
}

pub fn upsert_competence(
    conn: &Connection,
    subject_id: &str,
    year_id: &str,
    competence: &Competence,
) -> anyhow::Result<String> {
    let id = new_id_if_blank(&competence.id);
    let criteria_json = serde_json::to_string(&competence.evaluation_criteria)?;
    if let Some((owner_subject, owner_year)) = competence_scope(conn, &id)? {
        if owner_subject != subject_id || owner_year != year_id {
            anyhow::bail!("competence {} belongs to {}/{}", id, owner_subject, owner_year);
        }
    }
    let updated = conn.execute(
        "UPDATE competences
         SET code = ?, description = ?, criteria_json = ?
         WHERE id = ?",
        params![competence.code, competence.description, criteria_json, id],
    )?;
    if updated == 0 {
        let sort_order: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM competences WHERE subject_id = ? AND year_id = ?",
            params![subject_id, year_id],
            |r| r.get(0),
        )?;
        conn.execute(
            "INSERT INTO competences(id, subject_id, year_id, code, description, criteria_json, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                subject_id,
                year_id,
                competence.code,
                competence.description,
                criteria_json,
                sort_order
            ],
        )?;
    }
    Ok(id)
}

/// Subject and year of a stored competence.
pub fn competence_scope(conn: &Connection, competence_id: &str) -> anyhow::Result<Option<(String, String)>> {
    Ok(conn
        .query_row(
            "SELECT subject_id, year_id FROM competences WHERE id = ?",
            [competence_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?)
}

pub fn delete_competence(conn: &Connection, competence_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM competences WHERE id = ?", [competence_id])?;
    Ok(n > 0)
}

fn module_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
}

fn decode_module(raw: (String, String, String, String, String)) -> anyhow::Result<Module> {
    let (id, title, description, competences_raw, criteria_raw) = raw;
    let specific_competences: Vec<String> = serde_json::from_str(&competences_raw)?;
    let selected_criteria: BTreeMap<String, Vec<String>> = serde_json::from_str(&criteria_raw)?;
    Ok(Module {
        id,
        title,
        description,
        specific_competences,
        selected_criteria,
    })
}

pub fn list_modules(conn: &Connection, subject_id: &str) -> anyhow::Result<Vec<Module>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, specific_competences_json, selected_criteria_json
         FROM modules
         WHERE subject_id = ?
         ORDER BY title, id",
    )?;
    let rows = stmt.query_map([subject_id], module_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode_module(row?)?);
    }
    Ok(out)
}

pub fn upsert_module(conn: &Connection, subject_id: &str, module: &Module) -> anyhow::Result<String> {
    let id = new_id_if_blank(&module.id);
    if let Some(owner) = module_subject(conn, &id)? {
        if owner != subject_id {
            anyhow::bail!("module {} belongs to subject {}", id, owner);
        }
    }
    let competences_json = serde_json::to_string(&module.specific_competences)?;
    let criteria_json = serde_json::to_string(&module.selected_criteria)?;
    conn.execute(
        "INSERT INTO modules(id, subject_id, title, description, specific_competences_json, selected_criteria_json, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            specific_competences_json = excluded.specific_competences_json,
            selected_criteria_json = excluded.selected_criteria_json,
            updated_at = excluded.updated_at",
        params![
            id,
            subject_id,
            module.title,
            module.description,
            competences_json,
            criteria_json,
            now_ts()
        ],
    )?;
    Ok(id)
}

pub fn module_subject(conn: &Connection, module_id: &str) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row("SELECT subject_id FROM modules WHERE id = ?", [module_id], |r| r.get(0))
        .optional()?)
}

/// Removes the module and its situation links.
pub fn delete_module(conn: &Connection, module_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM learning_situation_modules WHERE module_id = ?",
        [module_id],
    )?;
    let n = tx.execute("DELETE FROM modules WHERE id = ?", [module_id])?;
    tx.commit()?;
    Ok(n > 0)
}

fn load_modules_by_id(conn: &Connection, ids: &[String]) -> anyhow::Result<HashMap<String, Module>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, specific_competences_json, selected_criteria_json
         FROM modules
         WHERE id = ?",
    )?;
    let mut out = HashMap::new();
    for id in ids {
        if out.contains_key(id) {
            continue;
        }
        if let Some(raw) = stmt.query_row([id], module_from_row).optional()? {
            out.insert(id.clone(), decode_module(raw)?);
        }
    }
    Ok(out)
}

/// Learning situations for a subject with their modules resolved. A link to a
/// module id the store does not hold comes back as `ModuleRef::Unresolved`.
pub fn list_situations(
    conn: &Connection,
    subject_id: &str,
    only_ids: Option<&[String]>,
) -> anyhow::Result<Vec<LearningSituation>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description
         FROM learning_situations
         WHERE subject_id = ?
         ORDER BY created_at, title, id",
    )?;
    let heads = stmt
        .query_map([subject_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut link_stmt = conn.prepare(
        "SELECT module_id FROM learning_situation_modules
         WHERE situation_id = ?
         ORDER BY sort_order, module_id",
    )?;
    let mut out = Vec::new();
    for (id, title, description) in heads {
        if let Some(filter) = only_ids {
            if !filter.iter().any(|f| *f == id) {
                continue;
            }
        }
        let module_ids = link_stmt
            .query_map([&id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut resolved = load_modules_by_id(conn, &module_ids)?;
        let modules = module_ids
            .into_iter()
            .map(|mid| match resolved.remove(&mid) {
                Some(m) => ModuleRef::Resolved(m),
                None => ModuleRef::Unresolved(mid),
            })
            .collect();
        out.push(LearningSituation {
            id,
            title,
            description,
            modules,
        });
    }
    Ok(out)
}

pub fn situation_subject(conn: &Connection, situation_id: &str) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT subject_id FROM learning_situations WHERE id = ?",
            [situation_id],
            |r| r.get(0),
        )
        .optional()?)
}

#[derive(Debug, Clone)]
pub struct SituationInput {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub module_ids: Vec<String>,
}

/// Creates or replaces a learning situation, including its ordered module
/// list. An id already stored under another subject is an error.
pub fn upsert_situation(conn: &Connection, subject_id: &str, input: &SituationInput) -> anyhow::Result<String> {
    let id = new_id_if_blank(input.id.as_deref().unwrap_or(""));
    let ts = now_ts();
    let tx = conn.unchecked_transaction()?;
    if let Some(owner) = situation_subject(&tx, &id)? {
        if owner != subject_id {
            anyhow::bail!("learning situation {} belongs to subject {}", id, owner);
        }
    }
    tx.execute(
        "INSERT INTO learning_situations(id, subject_id, title, description, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            updated_at = excluded.updated_at",
        params![id, subject_id, input.title, input.description, ts, ts],
    )?;
    tx.execute(
        "DELETE FROM learning_situation_modules WHERE situation_id = ?",
        [&id],
    )?;
    for (i, module_id) in input.module_ids.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO learning_situation_modules(situation_id, module_id, sort_order)
             VALUES(?, ?, ?)",
            params![id, module_id, i as i64],
        )?;
    }
    tx.commit()?;
    Ok(id)
}

/// Deleting a situation empties every unit that held it; the units stay.
pub fn delete_situation(conn: &Connection, situation_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM learning_situations WHERE id = ?", [situation_id])?;
    Ok(n > 0)
}

const UNIT_COLUMNS: &str = "pu.id, pu.unit_number, pu.learning_situation_id, pu.start_date, pu.end_date, pu.title, pu.notes, ls.title, ls.description";

fn unit_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PlanningUnit> {
    let learning_situation: Option<String> = r.get(2)?;
    let ls_title: Option<String> = r.get(7)?;
    let ls_description: Option<String> = r.get(8)?;
    let learning_situation_details = match (&learning_situation, ls_title) {
        (Some(id), Some(title)) => Some(SituationSummary {
            id: id.clone(),
            title,
            description: ls_description.unwrap_or_default(),
        }),
        _ => None,
    };
    Ok(PlanningUnit {
        id: Some(r.get(0)?),
        unit_number: r.get(1)?,
        learning_situation,
        start_date: parse_date(r.get(3)?),
        end_date: parse_date(r.get(4)?),
        title: r.get(5)?,
        notes: r.get(6)?,
        learning_situation_details,
    })
}

pub fn list_units(conn: &Connection, subject_id: &str) -> anyhow::Result<Vec<PlanningUnit>> {
    let sql = format!(
        "SELECT {UNIT_COLUMNS}
         FROM planning_units pu
         LEFT JOIN learning_situations ls ON ls.id = pu.learning_situation_id
         WHERE pu.subject_id = ?
         ORDER BY pu.unit_number"
    );
    let mut stmt = conn.prepare(&sql)?;
    let units = stmt
        .query_map([subject_id], unit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(units)
}

fn unit_by_number(conn: &Connection, subject_id: &str, unit_number: u32) -> anyhow::Result<Option<PlanningUnit>> {
    let sql = format!(
        "SELECT {UNIT_COLUMNS}
         FROM planning_units pu
         LEFT JOIN learning_situations ls ON ls.id = pu.learning_situation_id
         WHERE pu.subject_id = ? AND pu.unit_number = ?"
    );
    Ok(conn
        .query_row(&sql, params![subject_id, unit_number], unit_from_row)
        .optional()?)
}

/// Get-or-create by `(subject, unit_number)`, all in one transaction.
///
/// A new record takes the given dates, title, notes and situation. An
/// existing record has all of those overwritten, so an absent field clears
/// it.
pub fn bulk_update_units(
    conn: &Connection,
    subject_id: &str,
    units: &[UnitUpsert],
) -> anyhow::Result<Vec<PlanningUnit>> {
    let ts = now_ts();
    let tx = conn.unchecked_transaction()?;
    for u in units {
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM planning_units WHERE subject_id = ? AND unit_number = ?",
                params![subject_id, u.unit_number],
                |r| r.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE planning_units
                     SET learning_situation_id = ?, start_date = ?, end_date = ?, title = ?, notes = ?, updated_at = ?
                     WHERE id = ?",
                    params![
                        u.learning_situation,
                        format_date(u.start_date),
                        format_date(u.end_date),
                        u.title,
                        u.notes,
                        ts,
                        id
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO planning_units(id, subject_id, unit_number, learning_situation_id, start_date, end_date, title, notes, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        Uuid::new_v4().to_string(),
                        subject_id,
                        u.unit_number,
                        u.learning_situation,
                        format_date(u.start_date),
                        format_date(u.end_date),
                        u.title,
                        u.notes,
                        ts
                    ],
                )?;
            }
        }
    }
    tx.commit()?;

    let mut out = Vec::with_capacity(units.len());
    for u in units {
        if let Some(unit) = unit_by_number(conn, subject_id, u.unit_number)? {
            out.push(unit);
        }
    }
    Ok(out)
}

/// Writes back a persisted unit's situation, dates, title and notes.
pub fn save_unit(conn: &Connection, unit: &PlanningUnit) -> anyhow::Result<bool> {
    let Some(id) = unit.id.as_deref() else {
        return Ok(false);
    };
    let n = conn.execute(
        "UPDATE planning_units
         SET learning_situation_id = ?, start_date = ?, end_date = ?, title = ?, notes = ?, updated_at = ?
         WHERE id = ?",
        params![
            unit.learning_situation,
            format_date(unit.start_date),
            format_date(unit.end_date),
            unit.title,
            unit.notes,
            now_ts(),
            id
        ],
    )?;
    Ok(n > 0)
}

pub fn reload_unit(conn: &Connection, subject_id: &str, unit_number: u32) -> anyhow::Result<Option<PlanningUnit>> {
    unit_by_number(conn, subject_id, unit_number)
}

pub fn delete_unit(conn: &Connection, unit_id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM planning_units WHERE id = ?", [unit_id])?;
    Ok(n > 0)
}
