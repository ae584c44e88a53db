use crate::coverage::{compute_coverage, grid_rings, radar_points, CoverageReport, RadarGeometry};
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::handlers::setup::load_coverage_setup;
use crate::ipc::helpers::{db_conn, parse_string_array, required_str, required_typed};
use crate::ipc::types::{AppState, Request};
use crate::model::{Competence, LearningSituation};
use crate::store;
use serde_json::json;

fn report_payload(report: &CoverageReport, geometry: &RadarGeometry, levels: u32) -> serde_json::Value {
    json!({
        "report": report,
        "radar": radar_points(&report.per_competence, geometry),
        "rings": grid_rings(geometry, levels),
        "geometry": geometry,
    })
}

fn log_report(req: &Request, report: &CoverageReport) {
    let s = &report.stats;
    log::debug!(
        "event=coverage_computed id={} competences={} full={} partial={} uncovered={} criteria={}/{}",
        req.id,
        s.total_competences,
        s.fully_covered_count,
        s.partially_covered_count,
        s.uncovered_count,
        s.total_covered_criteria,
        s.total_criteria
    );
}

fn handle_coverage_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match required_str(req, "yearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let only_ids = match req.params.get("situationIds") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => match parse_string_array(Some(v)) {
            Ok(ids) => Some(ids),
            Err(m) => return err(&req.id, "bad_params", format!("situationIds {}", m), None),
        },
    };

    let competences = match store::list_competences(conn, &subject_id, &year_id) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let situations = match store::list_situations(conn, &subject_id, only_ids.as_deref()) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let unresolved: Vec<&str> = situations
        .iter()
        .flat_map(|ls| ls.modules.iter())
        .filter(|m| m.resolved().is_none())
        .map(|m| m.id())
        .collect();
    if !unresolved.is_empty() {
        log::warn!(
            "event=coverage_unresolved_modules id={} subject={} modules={}",
            req.id,
            subject_id,
            unresolved.join(",")
        );
    }

    let report = compute_coverage(&competences, &situations);
    log_report(req, &report);
    let (geometry, levels) = load_coverage_setup(conn);
    ok(&req.id, report_payload(&report, &geometry, levels))
}

/// Coverage over a snapshot supplied in the request; needs no workspace.
fn handle_coverage_evaluate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let competences: Vec<Competence> = match required_typed(req, "competences") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let situations: Vec<LearningSituation> = match req.params.get("learningSituations") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(_) => match required_typed(req, "learningSituations") {
            Ok(v) => v,
            Err(e) => return e,
        },
    };
    let report = compute_coverage(&competences, &situations);
    log_report(req, &report);
    let (geometry, levels) = match state.db.as_ref() {
        Some(conn) => load_coverage_setup(conn),
        None => (RadarGeometry::default(), 4),
    };
    ok(&req.id, report_payload(&report, &geometry, levels))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "coverage.compute" => Some(handle_coverage_compute(state, req)),
        "coverage.evaluate" => Some(handle_coverage_evaluate(state, req)),
        _ => None,
    }
}
