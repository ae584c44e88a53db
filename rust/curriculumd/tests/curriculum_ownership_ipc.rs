mod test_support;

use serde_json::json;
use test_support::{open_workspace, request_err, request_ok, spawn_sidecar};

#[test]
fn upserts_do_not_move_records_between_subjects() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ws = open_workspace(&mut stdin, &mut reader, "curriculum-ownership");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "situations.upsert",
        json!({ "subjectId": "bio", "situation": { "id": "ls-a", "title": "Pond survey" } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "planner.assign",
        json!({ "subjectId": "bio", "unitIndex": 0, "learningSituationId": "ls-a", "today": "2026-09-01" }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "3",
            "situations.upsert",
            json!({ "subjectId": "chem", "situation": { "id": "ls-a", "title": "Titration" } }),
        ),
        "conflict"
    );

    let seq = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "planner.sequence",
        json!({ "subjectId": "bio" }),
    );
    assert_eq!(seq["slots"][0]["situation"]["title"], json!("Pond survey"));
    let chem = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "situations.list",
        json!({ "subjectId": "chem" }),
    );
    assert_eq!(chem["situations"], json!([]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "modules.upsert",
        json!({ "subjectId": "bio", "module": { "id": "m1", "title": "Ponds" } }),
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "7",
            "modules.upsert",
            json!({ "subjectId": "chem", "module": { "id": "m1", "title": "Acids" } }),
        ),
        "conflict"
    );
    let bio_modules = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "modules.list",
        json!({ "subjectId": "bio" }),
    );
    assert_eq!(bio_modules["modules"][0]["title"], json!("Ponds"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "competences.upsert",
        json!({ "subjectId": "bio", "yearId": "y1", "competence": { "id": "ce1", "code": "CE1" } }),
    );
    for (id, subject, year) in [("10", "chem", "y1"), ("11", "bio", "y2")] {
        assert_eq!(
            request_err(
                &mut stdin,
                &mut reader,
                id,
                "competences.upsert",
                json!({ "subjectId": subject, "yearId": year, "competence": { "id": "ce1", "code": "CX" } }),
            ),
            "conflict"
        );
    }
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "competences.list",
        json!({ "subjectId": "bio", "yearId": "y1" }),
    );
    assert_eq!(listed["competences"][0]["code"], json!("CE1"));

    // Updating in place under the owning subject still works.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "situations.upsert",
        json!({ "subjectId": "bio", "situation": { "id": "ls-a", "title": "Pond survey II" } }),
    );
    let seq = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "planner.sequence",
        json!({ "subjectId": "bio" }),
    );
    assert_eq!(seq["slots"][0]["situation"]["title"], json!("Pond survey II"));
}
