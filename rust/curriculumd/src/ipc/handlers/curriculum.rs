use crate::coverage::module_competence_details;
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{db_conn, parse_opt_string, parse_string_array, required_str, required_typed};
use crate::ipc::types::{AppState, Request};
use crate::model::{Competence, Module, ModuleRef};
use crate::store::{self, SituationInput};
use serde_json::json;

fn owner_conflict(req: &Request, kind: &str, id: &str, owner: &str) -> serde_json::Value {
    err(
        &req.id,
        "conflict",
        format!("{} {} belongs to {}", kind, id, owner),
        Some(json!({ "owner": owner })),
    )
}

fn handle_competences_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match store::list_competences(conn, &subject_id, &year_id) {
        Ok(competences) => ok(&req.id, json!({ "competences": competences })),
        Err(e) => db_err(&req.id, "db_query_failed", e),
    }
}

fn handle_competences_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let competence: Competence = match required_typed(req, "competence") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if competence.code.trim().is_empty() {
        return err(&req.id, "bad_params", "competence.code must not be empty", None);
    }
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = competence
        .evaluation_criteria
        .iter()
        .find(|c| !seen.insert(c.id.as_str()))
    {
        return err(
            &req.id,
            "bad_params",
            format!("duplicate evaluation criterion id: {}", dup.id),
            None,
        );
    }
    match store::competence_scope(conn, &competence.id) {
        Ok(Some((s, y))) if s != subject_id || y != year_id => {
            return owner_conflict(req, "competence", &competence.id, &format!("{}/{}", s, y))
        }
        Ok(_) => {}
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    }
    match store::upsert_competence(conn, &subject_id, &year_id, &competence) {
        Ok(id) => ok(&req.id, json!({ "competenceId": id })),
        Err(e) => db_err(&req.id, "db_update_failed", e),
    }
}

fn handle_competences_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let competence_id = match required_str(req, "competenceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::delete_competence(conn, &competence_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "competence not found", None),
        Err(e) => db_err(&req.id, "db_delete_failed", e),
    }
}

fn handle_modules_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::list_modules(conn, &subject_id) {
        Ok(modules) => ok(&req.id, json!({ "modules": modules })),
        Err(e) => db_err(&req.id, "db_query_failed", e),
    }
}

fn handle_modules_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut module: Module = match required_typed(req, "module") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if module.title.trim().is_empty() {
        return err(&req.id, "bad_params", "module.title must not be empty", None);
    }
    // Selections only make sense for competences the module lists.
    let dropped: Vec<String> = module
        .selected_criteria
        .keys()
        .filter(|k| !module.addresses(k))
        .cloned()
        .collect();
    for key in &dropped {
        module.selected_criteria.remove(key);
    }
    if !dropped.is_empty() {
        log::debug!(
            "event=module_selection_pruned module={} competences={}",
            module.id,
            dropped.join(",")
        );
    }
    match store::module_subject(conn, &module.id) {
        Ok(Some(owner)) if owner != subject_id => {
            return owner_conflict(req, "module", &module.id, &owner)
        }
        Ok(_) => {}
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    }
    match store::upsert_module(conn, &subject_id, &module) {
        Ok(id) => ok(&req.id, json!({ "moduleId": id })),
        Err(e) => db_err(&req.id, "db_update_failed", e),
    }
}

fn handle_modules_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::delete_module(conn, &module_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "module not found", None),
        Err(e) => db_err(&req.id, "db_delete_failed", e),
    }
}

fn handle_situations_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match parse_opt_string(req.params.get("yearId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("yearId {}", m), None),
    };
    let situations = match store::list_situations(conn, &subject_id, None) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let Some(year_id) = year_id else {
        return ok(&req.id, json!({ "situations": situations }));
    };

    let competences = match store::list_competences(conn, &subject_id, &year_id) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let enriched: Vec<serde_json::Value> = situations
        .iter()
        .map(|ls| {
            let modules: Vec<serde_json::Value> = ls
                .modules
                .iter()
                .map(|m| match m {
                    ModuleRef::Resolved(module) => {
                        let mut v = json!(module);
                        v["competenceDetails"] =
                            json!(module_competence_details(module, &competences));
                        v
                    }
                    ModuleRef::Unresolved(id) => json!(id),
                })
                .collect();
            json!({
                "id": ls.id,
                "title": ls.title,
                "description": ls.description,
                "modules": modules,
            })
        })
        .collect();
    ok(&req.id, json!({ "situations": enriched }))
}

fn handle_situations_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(input) = req.params.get("situation").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing situation", None);
    };
    let id = match parse_opt_string(input.get("id")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("situation.id {}", m), None),
    };
    let title = match parse_opt_string(input.get("title")) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "bad_params", "situation.title is required", None),
        Err(m) => return err(&req.id, "bad_params", format!("situation.title {}", m), None),
    };
    let description = match parse_opt_string(input.get("description")) {
        Ok(v) => v.unwrap_or_default(),
        Err(m) => {
            return err(
                &req.id,
                "bad_params",
                format!("situation.description {}", m),
                None,
            )
        }
    };
    let module_ids = match parse_string_array(input.get("moduleIds")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("situation.moduleIds {}", m), None),
    };
    if let Some(existing) = id.as_deref() {
        match store::situation_subject(conn, existing) {
            Ok(Some(owner)) if owner != subject_id => {
                return owner_conflict(req, "learning situation", existing, &owner)
            }
            Ok(_) => {}
            Err(e) => return db_err(&req.id, "db_query_failed", e),
        }
    }
    let input = SituationInput {
        id,
        title,
        description,
        module_ids,
    };
    match store::upsert_situation(conn, &subject_id, &input) {
        Ok(id) => ok(&req.id, json!({ "situationId": id })),
        Err(e) => db_err(&req.id, "db_update_failed", e),
    }
}

fn handle_situations_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let situation_id = match required_str(req, "situationId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::delete_situation(conn, &situation_id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(&req.id, "not_found", "learning situation not found", None),
        Err(e) => db_err(&req.id, "db_delete_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "competences.list" => Some(handle_competences_list(state, req)),
        "competences.upsert" => Some(handle_competences_upsert(state, req)),
        "competences.delete" => Some(handle_competences_delete(state, req)),
        "modules.list" => Some(handle_modules_list(state, req)),
        "modules.upsert" => Some(handle_modules_upsert(state, req)),
        "modules.delete" => Some(handle_modules_delete(state, req)),
        "situations.list" => Some(handle_situations_list(state, req)),
        "situations.upsert" => Some(handle_situations_upsert(state, req)),
        "situations.delete" => Some(handle_situations_delete(state, req)),
        _ => None,
    }
}
