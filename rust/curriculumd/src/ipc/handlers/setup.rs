use crate::coverage::RadarGeometry;
use crate::db;
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::planning::UnitCadence;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Coverage,
    Planner,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "coverage" => Some(Self::Coverage),
            "planner" => Some(Self::Planner),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Coverage => "setup.coverage",
            Self::Planner => "setup.planner",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Coverage => {
            let g = RadarGeometry::default();
            json!({
                "radarCenter": g.center,
                "radarMaxRadius": g.max_radius,
                "radarLabelOffset": g.label_offset,
                "gridLevels": 4
            })
        }
        SetupSection::Planner => {
            let c = UnitCadence::default();
            json!({
                "unitCadenceDays": c.cadence_days,
                "unitSpanDays": c.span_days
            })
        }
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Coverage => match k.as_str() {
                "radarCenter" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 50.0, 1000.0)?));
                }
                "radarMaxRadius" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 10.0, 1000.0)?));
                }
                "radarLabelOffset" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 200.0)?));
                }
                "gridLevels" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10)?));
                }
                _ => return Err(format!("unknown coverage field: {}", k)),
            },
            SetupSection::Planner => match k.as_str() {
                "unitCadenceDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 60)?));
                }
                "unitSpanDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 59)?));
                }
                _ => return Err(format!("unknown planner field: {}", k)),
            },
        }
    }
    if let SetupSection::Planner = section {
        let cadence = obj.get("unitCadenceDays").and_then(|v| v.as_i64()).unwrap_or(14);
        let span = obj.get("unitSpanDays").and_then(|v| v.as_i64()).unwrap_or(13);
        if span >= cadence {
            return Err("unitSpanDays must be less than unitCadenceDays".into());
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            let mut candidate = current.clone();
            // Malformed saved values fall back to the defaults as a whole.
            match merge_section_patch(section, &mut candidate, saved_obj) {
                Ok(()) => current = candidate,
                Err(e) => log::warn!("event=setup_ignored key={} reason={}", section.key(), e),
            }
        }
    }
    Ok(current)
}

/// Radar geometry and ring count for the workspace.
pub fn load_coverage_setup(conn: &Connection) -> (RadarGeometry, u32) {
    let obj = match load_section(conn, SetupSection::Coverage) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("event=setup_read_failed key=setup.coverage error={:#}", e);
            default_section(SetupSection::Coverage)
        }
    };
    let d = RadarGeometry::default();
    let geometry = RadarGeometry {
        center: obj.get("radarCenter").and_then(|v| v.as_f64()).unwrap_or(d.center),
        max_radius: obj
            .get("radarMaxRadius")
            .and_then(|v| v.as_f64())
            .unwrap_or(d.max_radius),
        label_offset: obj
            .get("radarLabelOffset")
            .and_then(|v| v.as_f64())
            .unwrap_or(d.label_offset),
    };
    let levels = obj
        .get("gridLevels")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(4);
    (geometry, levels)
}

pub fn load_unit_cadence(conn: &Connection) -> UnitCadence {
    let obj = match load_section(conn, SetupSection::Planner) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("event=setup_read_failed key=setup.planner error={:#}", e);
            default_section(SetupSection::Planner)
        }
    };
    let d = UnitCadence::default();
    UnitCadence {
        cadence_days: obj
            .get("unitCadenceDays")
            .and_then(|v| v.as_i64())
            .unwrap_or(d.cadence_days),
        span_days: obj
            .get("unitSpanDays")
            .and_then(|v| v.as_i64())
            .unwrap_or(d.span_days),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let coverage = match load_section(conn, SetupSection::Coverage) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    let planner = match load_section(conn, SetupSection::Planner) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    ok(&req.id, json!({ "coverage": coverage, "planner": planner }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return db_err(&req.id, "db_update_failed", e);
    }
    log::info!("event=setup_updated key={}", section.key());
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_patch_rejects_span_not_shorter_than_cadence() {
        let mut current = default_section(SetupSection::Planner);
        let patch = json!({ "unitCadenceDays": 7 });
        let e = merge_section_patch(SetupSection::Planner, &mut current, patch.as_object().expect("obj"))
            .expect_err("13-day span cannot fit a 7-day cadence");
        assert!(e.contains("unitSpanDays"));

        let mut current = default_section(SetupSection::Planner);
        let patch = json!({ "unitCadenceDays": 7, "unitSpanDays": 6 });
        merge_section_patch(SetupSection::Planner, &mut current, patch.as_object().expect("obj"))
            .expect("weekly cadence");
        assert_eq!(current["unitCadenceDays"], json!(7));
    }

    #[test]
    fn coverage_patch_validates_ranges_and_fields() {
        let mut current = default_section(SetupSection::Coverage);
        let bad = json!({ "gridLevels": 0 });
        assert!(merge_section_patch(SetupSection::Coverage, &mut current, bad.as_object().expect("obj")).is_err());
        let unknown = json!({ "colour": "red" });
        assert!(merge_section_patch(SetupSection::Coverage, &mut current, unknown.as_object().expect("obj")).is_err());
        let good = json!({ "radarMaxRadius": 90 });
        merge_section_patch(SetupSection::Coverage, &mut current, good.as_object().expect("obj"))
            .expect("valid radius");
        assert_eq!(current["radarMaxRadius"].as_f64(), Some(90.0));
    }
}
