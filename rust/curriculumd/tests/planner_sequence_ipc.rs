mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{open_workspace, request_err, request_ok, spawn_sidecar};

fn seed_situations(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    for (id, title) in [("ls-a", "Pond survey"), ("ls-b", "Lab week"), ("ls-c", "Field trip")] {
        let _ = request_ok(
            stdin,
            reader,
            id,
            "situations.upsert",
            json!({ "subjectId": "bio", "situation": { "id": id, "title": title } }),
        );
    }
}

fn sequence(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, id: &str) -> serde_json::Value {
    request_ok(stdin, reader, id, "planner.sequence", json!({ "subjectId": "bio" }))
}

#[test]
fn sequence_fills_gaps_and_keeps_a_trailing_slot() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-planner-sequence");
    seed_situations(&mut stdin, &mut reader);

    let empty = sequence(&mut stdin, &mut reader, "1");
    assert_eq!(empty["slots"], json!([{ "kind": "empty", "index": 0, "unit": null }]));
    assert_eq!(empty["availableSituations"].as_array().map(|a| a.len()), Some(3));

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 2, "learningSituationId": "ls-a", "today": "2026-09-01" }),
    );
    assert_eq!(assigned["unit"]["unitNumber"], json!(2));
    assert_eq!(assigned["unit"]["startDate"], json!("2026-09-29"));
    assert_eq!(assigned["unit"]["endDate"], json!("2026-10-12"));
    assert_eq!(assigned["unit"]["learningSituationDetails"]["title"], json!("Pond survey"));

    let seq = sequence(&mut stdin, &mut reader, "3");
    let slots = seq["slots"].as_array().expect("slots");
    assert_eq!(slots.len(), 4);
    let kinds: Vec<&str> = slots.iter().filter_map(|s| s["kind"].as_str()).collect();
    assert_eq!(kinds, vec!["empty", "empty", "filled", "empty"]);
    for (i, s) in slots.iter().enumerate() {
        assert_eq!(s["index"], json!(i));
    }
    assert_eq!(slots[2]["situation"]["id"], json!("ls-a"));
    assert_eq!(slots[2]["situation"]["title"], json!("Pond survey"));
    assert_eq!(slots[2]["situation"]["startDate"], json!("2026-09-29"));
    assert!(slots[2]["unitId"].as_str().is_some());

    let available: Vec<&str> = seq["availableSituations"]
        .as_array()
        .expect("available")
        .iter()
        .filter_map(|s| s["id"].as_str())
        .collect();
    assert_eq!(available.len(), 2);
    assert!(!available.contains(&"ls-a"));
}

#[test]
fn assign_rejects_double_planning_and_unknown_situations() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-planner-conflict");
    seed_situations(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 0, "learningSituationId": "ls-a", "today": "2026-09-01" }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "2",
            "planner.assign",
            json!({ "subjectId": "bio", "unitIndex": 1, "learningSituationId": "ls-a" }),
        ),
        "conflict"
    );
    // Same slot again is a no-op.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 0, "learningSituationId": "ls-a" }),
    );
    assert_eq!(again["unit"]["startDate"], json!("2026-09-01"));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "planner.assign",
            json!({ "subjectId": "bio", "unitIndex": 1, "learningSituationId": "ls-missing" }),
        ),
        "not_found"
    );
    // A situation of another subject is not plannable here.
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "5",
            "planner.assign",
            json!({ "subjectId": "chem", "unitIndex": 0, "learningSituationId": "ls-b" }),
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "6",
            "planner.assign",
            json!({ "subjectId": "bio", "unitIndex": -1, "learningSituationId": "ls-b" }),
        ),
        "bad_params"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "planner.assign",
            json!({ "subjectId": "bio", "unitIndex": 1, "learningSituationId": "ls-b", "today": "01/09/2026" }),
        ),
        "bad_params"
    );
}

#[test]
fn clear_edit_and_remove_units() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-planner-edit");
    seed_situations(&mut stdin, &mut reader);

    for (id, index, situation) in [("1", 0, "ls-b"), ("2", 2, "ls-a")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "planner.assign",
            json!({ "subjectId": "bio", "unitIndex": index, "learningSituationId": situation, "today": "2026-09-01" }),
        );
    }

    let edited = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "planner.units.updateDate",
        json!({ "subjectId": "bio", "unitIndex": 0, "field": "endDate", "value": "2026-09-20" }),
    );
    assert_eq!(edited["unit"]["startDate"], json!("2026-09-01"));
    assert_eq!(edited["unit"]["endDate"], json!("2026-09-20"));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "4",
            "planner.units.updateDate",
            json!({ "subjectId": "bio", "unitIndex": 5, "field": "startDate", "value": "2026-09-20" }),
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "5",
            "planner.units.updateDate",
            json!({ "subjectId": "bio", "unitIndex": 0, "field": "dueDate", "value": "2026-09-20" }),
        ),
        "bad_params"
    );

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "planner.units.clearSituation",
        json!({ "subjectId": "bio", "unitIndex": 2 }),
    );
    assert_eq!(cleared["unit"]["learningSituation"], json!(null));
    assert_eq!(cleared["unit"]["startDate"], json!("2026-09-29"));

    let seq = sequence(&mut stdin, &mut reader, "7");
    assert_eq!(seq["slots"][2]["kind"], json!("empty"));
    assert!(seq["slots"][2]["unit"]["id"].as_str().is_some());
    assert_eq!(seq["slots"].as_array().map(|s| s.len()), Some(4));

    // A dated record keeps its window when a new situation lands in it.
    let reassigned = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 2, "learningSituationId": "ls-c", "today": "2027-01-10" }),
    );
    assert_eq!(reassigned["unit"]["startDate"], json!("2026-09-29"));
    assert_eq!(reassigned["unit"]["endDate"], json!("2026-10-12"));

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "planner.units.deleteEmpty",
            json!({ "subjectId": "bio", "unitIndex": 2 }),
        ),
        "conflict"
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "planner.units.clearSituation",
        json!({ "subjectId": "bio", "unitIndex": 2 }),
    );
    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "planner.units.deleteEmpty",
        json!({ "subjectId": "bio", "unitIndex": 2 }),
    );
    assert_eq!(deleted["action"], json!("deleted"));
    assert!(deleted["unitId"].as_str().is_some());

    let view_only = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "planner.units.deleteEmpty",
        json!({ "subjectId": "bio", "unitIndex": 1 }),
    );
    assert_eq!(view_only, json!({ "action": "removedFromView" }));

    let seq = sequence(&mut stdin, &mut reader, "13");
    assert_eq!(seq["slots"].as_array().map(|s| s.len()), Some(2));
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "14",
            "planner.units.clearSituation",
            json!({ "subjectId": "bio", "unitIndex": 2 }),
        ),
        "not_found"
    );
}

#[test]
fn deleting_a_situation_empties_its_unit() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-planner-situation-delete");
    seed_situations(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 0, "learningSituationId": "ls-b", "today": "2026-09-01" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "situations.delete",
        json!({ "situationId": "ls-b" }),
    );
    let seq = sequence(&mut stdin, &mut reader, "3");
    assert_eq!(seq["slots"][0]["kind"], json!("empty"));
    assert_eq!(seq["slots"][0]["unit"]["startDate"], json!("2026-09-01"));
    assert_eq!(seq["slots"][0]["unit"]["learningSituation"], json!(null));
}
