mod test_support;

use serde_json::json;
use test_support::{open_workspace, request_err, request_ok, spawn_sidecar};

#[test]
fn setup_defaults_and_planner_cadence_override() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-setup-planner");

    let setup = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(setup["planner"]["unitCadenceDays"], json!(14));
    assert_eq!(setup["planner"]["unitSpanDays"], json!(13));
    assert_eq!(setup["coverage"]["gridLevels"], json!(4));
    assert_eq!(setup["coverage"]["radarCenter"].as_f64(), Some(175.0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "planner", "patch": { "unitCadenceDays": 7, "unitSpanDays": 4 } }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "setup.update",
            json!({ "section": "planner", "patch": { "unitSpanDays": 7 } }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "setup.update",
            json!({ "section": "grading", "patch": {} }),
        ),
        "bad_params"
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "situations.upsert",
        json!({ "subjectId": "bio", "situation": { "id": "ls-a", "title": "Pond survey" } }),
    );
    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 1, "learningSituationId": "ls-a", "today": "2026-09-01" }),
    );
    assert_eq!(assigned["unit"]["startDate"], json!("2026-09-08"));
    assert_eq!(assigned["unit"]["endDate"], json!("2026-09-12"));
}

#[test]
fn coverage_setup_shapes_radar_output() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-setup-coverage");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "coverage", "patch": { "gridLevels": 5, "radarMaxRadius": 100 } }),
    );
    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["coverage"]["gridLevels"], json!(5));
    assert_eq!(setup["coverage"]["radarCenter"].as_f64(), Some(175.0));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "coverage.evaluate",
        json!({ "competences": [ { "id": "c1", "code": "CE1", "evaluationCriteria": [ { "id": "a" } ] } ],
                "learningSituations": [ { "id": "ls", "modules": [
                    { "id": "m", "specificCompetences": ["c1"], "selectedCriteria": { "c1": ["a"] } }
                ] } ] }),
    );
    let rings = res["rings"].as_array().expect("rings");
    assert_eq!(rings.len(), 5);
    let first = rings[0]["radius"].as_f64().expect("radius");
    assert!((first - 20.0).abs() < 1e-9);
    let pct = rings[0]["percentage"].as_f64().expect("percentage");
    assert!((pct - 20.0).abs() < 1e-9);
    let top = &res["radar"][0];
    let radius = top["radius"].as_f64().expect("radius");
    assert!((radius - 100.0).abs() < 1e-9);
    let label_y = top["labelY"].as_f64().expect("labelY");
    assert!((label_y - 35.0).abs() < 1e-9);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "setup.update",
            json!({ "section": "coverage", "patch": { "gridLevels": 0 } }),
        ),
        "bad_params"
    );
}
