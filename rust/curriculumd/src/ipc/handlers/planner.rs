use crate::ipc::error::{db_err, err, ok};
use crate::ipc::handlers::setup::load_unit_cadence;
use crate::ipc::helpers::{db_conn, parse_iso_date, parse_opt_date, required_str, required_typed, required_unit_index};
use crate::ipc::types::{AppState, Request};
use crate::model::{PlanningUnit, SituationSummary};
use crate::planning::{
    apply_date_edit, available_situations, build_unit_sequence, clear_situation, plan_assignment,
    plan_removal, unit_at, validate_upsert, DateField, RemovalAction, UnitUpsert,
};
use crate::store;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

fn load_units(conn: &Connection, req: &Request, subject_id: &str) -> Result<Vec<PlanningUnit>, serde_json::Value> {
    store::list_units(conn, subject_id).map_err(|e| db_err(&req.id, "db_query_failed", e))
}

/// The persisted unit at `index`, or a `not_found` envelope.
fn existing_unit(
    units: &[PlanningUnit],
    req: &Request,
    index: u32,
) -> Result<PlanningUnit, serde_json::Value> {
    unit_at(units, index)
        .cloned()
        .ok_or_else(|| err(&req.id, "not_found", format!("no planning unit at index {}", index), None))
}

/// Checks that every referenced situation belongs to the subject.
fn ensure_situations_exist(
    conn: &Connection,
    req: &Request,
    subject_id: &str,
    ids: &[&str],
) -> Result<(), serde_json::Value> {
    for id in ids {
        match store::situation_subject(conn, id) {
            Ok(Some(s)) if s == subject_id => {}
            Ok(_) => {
                return Err(err(
                    &req.id,
                    "not_found",
                    format!("learning situation not found: {}", id),
                    None,
                ))
            }
            Err(e) => return Err(db_err(&req.id, "db_query_failed", e)),
        }
    }
    Ok(())
}

fn saved_unit_result(conn: &Connection, req: &Request, subject_id: &str, index: u32) -> serde_json::Value {
    match store::reload_unit(conn, subject_id, index) {
        Ok(Some(unit)) => ok(&req.id, json!({ "unit": unit })),
        Ok(None) => err(&req.id, "not_found", "planning unit disappeared", None),
        Err(e) => db_err(&req.id, "db_query_failed", e),
    }
}

fn handle_units_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match load_units(conn, req, &subject_id) {
        Ok(units) => ok(&req.id, json!({ "units": units })),
        Err(e) => e,
    }
}

fn handle_units_bulk_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let upserts: Vec<UnitUpsert> = match required_typed(req, "units") {
        Ok(v) => v,
        Err(e) => return e,
    };
    for (i, u) in upserts.iter().enumerate() {
        if let Err(m) = validate_upsert(u) {
            return err(&req.id, "bad_params", format!("units[{}]: {}", i, m), None);
        }
    }
    let referenced: Vec<&str> = upserts
        .iter()
        .filter_map(|u| u.learning_situation.as_deref())
        .collect();
    if let Err(e) = ensure_situations_exist(conn, req, &subject_id, &referenced) {
        return e;
    }
    match store::bulk_update_units(conn, &subject_id, &upserts) {
        Ok(units) => {
            log::info!(
                "event=planning_units_saved subject={} count={}",
                subject_id,
                units.len()
            );
            ok(&req.id, json!({ "units": units }))
        }
        Err(e) => db_err(&req.id, "db_update_failed", e),
    }
}

fn handle_sequence(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let units = match load_units(conn, req, &subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let situations = match store::list_situations(conn, &subject_id, None) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let slots = build_unit_sequence(&units);
    let available: Vec<SituationSummary> = available_situations(&situations, &units)
        .into_iter()
        .map(|ls| ls.summary())
        .collect();
    log::debug!(
        "event=planner_sequence subject={} slots={} filled={} last={}",
        subject_id,
        slots.len(),
        slots.iter().filter(|s| s.is_filled()).count(),
        slots.last().map(|s| s.index()).unwrap_or(0)
    );
    ok(
        &req.id,
        json!({
            "slots": slots,
            "availableSituations": available,
        }),
    )
}

fn handle_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match required_unit_index(req, "unitIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let situation_id = match required_str(req, "learningSituationId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let today = match parse_opt_date(req.params.get("today")) {
        Ok(v) => v.unwrap_or_else(|| Utc::now().date_naive()),
        Err(m) => return err(&req.id, "bad_params", format!("today {}", m), None),
    };
    if let Err(e) = ensure_situations_exist(conn, req, &subject_id, &[situation_id.as_str()]) {
        return e;
    }
    let units = match load_units(conn, req, &subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some(planned) = units
        .iter()
        .find(|u| u.learning_situation.as_deref() == Some(situation_id.as_str()))
    {
        if planned.unit_number == index {
            return ok(&req.id, json!({ "unit": planned }));
        }
        return err(
            &req.id,
            "conflict",
            format!(
                "learning situation is already planned in unit {}",
                planned.unit_number
            ),
            Some(json!({ "unitIndex": planned.unit_number })),
        );
    }

    let cadence = load_unit_cadence(conn);
    let Some(upsert) = plan_assignment(&units, index, &situation_id, today, &cadence) else {
        return err(
            &req.id,
            "bad_params",
            format!("no default dates for unit {} from {}", index, today),
            None,
        );
    };
    match store::bulk_update_units(conn, &subject_id, std::slice::from_ref(&upsert)) {
        Ok(mut saved) if !saved.is_empty() => {
            log::info!(
                "event=situation_planned subject={} unit={} situation={}",
                subject_id,
                index,
                situation_id
            );
            ok(&req.id, json!({ "unit": saved.remove(0) }))
        }
        Ok(_) => err(&req.id, "not_found", "planning unit disappeared", None),
        Err(e) => db_err(&req.id, "db_update_failed", e),
    }
}

fn handle_units_update_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match required_unit_index(req, "unitIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field = match required_str(req, "field") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(field) = DateField::parse(&field) else {
        return err(&req.id, "bad_params", "field must be one of: startDate, endDate", None);
    };
    let value = match required_str(req, "value") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match parse_iso_date(&value) {
        Ok(d) => d,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let units = match load_units(conn, req, &subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let unit = match existing_unit(&units, req, index) {
        Ok(u) => u,
        Err(e) => return e,
    };
    let edited = match apply_date_edit(&unit, field, date) {
        Ok(u) => u,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(e) = store::save_unit(conn, &edited) {
        return db_err(&req.id, "db_update_failed", e);
    }
    saved_unit_result(conn, req, &subject_id, index)
}

fn handle_units_clear_situation(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match required_unit_index(req, "unitIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let units = match load_units(conn, req, &subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let unit = match existing_unit(&units, req, index) {
        Ok(u) => u,
        Err(e) => return e,
    };
    if let Err(e) = store::save_unit(conn, &clear_situation(&unit)) {
        return db_err(&req.id, "db_update_failed", e);
    }
    log::info!(
        "event=situation_unplanned subject={} unit={} situation={}",
        subject_id,
        index,
        unit.learning_situation.as_deref().unwrap_or("-")
    );
    saved_unit_result(conn, req, &subject_id, index)
}

fn handle_units_delete_empty(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match required_unit_index(req, "unitIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let units = match load_units(conn, req, &subject_id) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if unit_at(&units, index).is_some_and(|u| u.learning_situation.is_some()) {
        return err(
            &req.id,
            "conflict",
            "unit holds a learning situation; clear it first",
            None,
        );
    }
    let action = plan_removal(&units, index);
    if let RemovalAction::DeleteRecord { unit_id } = &action {
        match store::delete_unit(conn, unit_id) {
            Ok(_) => log::info!("event=planning_unit_deleted subject={} unit={}", subject_id, index),
            Err(e) => return db_err(&req.id, "db_delete_failed", e),
        }
    }
    ok(&req.id, json!(action))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "planner.units.list" => Some(handle_units_list(state, req)),
        "planner.units.bulkUpdate" => Some(handle_units_bulk_update(state, req)),
        "planner.sequence" => Some(handle_sequence(state, req)),
        "planner.assign" => Some(handle_assign(state, req)),
        "planner.units.updateDate" => Some(handle_units_update_date(state, req)),
        "planner.units.clearSituation" => Some(handle_units_clear_situation(state, req)),
        "planner.units.deleteEmpty" => Some(handle_units_delete_empty(state, req)),
        _ => None,
    }
}
