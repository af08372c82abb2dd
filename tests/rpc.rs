mod common;

use common::{completed_dump, location, range, temp_store, FakeBundles};
use lsifq::deadline::Deadline;
use lsifq::engine::Engine;
use lsifq::error::Error;
use lsifq::rpc::handle_method;
use serde_json::{json, Value};

fn engine_with_one_dump(label: &str) -> (Engine, i64) {
    let store = temp_store(label);
    let dump_id = store
        .insert_upload(&completed_dump(42, "deadbeef", "svc/", "lsif-go"))
        .unwrap();

    let mut bundles = FakeBundles::default();
    bundles.add_definitions(
        dump_id,
        "a.go",
        3,
        5,
        vec![location(dump_id, "def.go", range(1, 0, 1, 4))],
    );
    bundles.add_references(
        dump_id,
        "a.go",
        3,
        5,
        vec![
            location(dump_id, "a.go", range(3, 5, 3, 9)),
            location(dump_id, "b.go", range(4, 0, 4, 4)),
            location(dump_id, "c.go", range(5, 0, 5, 4)),
        ],
    );
    bundles.add_hover(dump_id, "a.go", 3, 5, "fn a()", range(3, 0, 3, 8));

    (Engine::new(store, Box::new(bundles)), dump_id)
}

#[test]
fn definitions_answer_api_locations() {
    let (engine, dump_id) = engine_with_one_dump("rpc-defs");
    let value = handle_method(
        &engine,
        Deadline::none(),
        "definitions",
        json!({"path": "svc/a.go", "line": 3, "character": 5, "uploadId": dump_id}),
    )
    .unwrap();

    let locations = value["locations"].as_array().unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0]["repositoryId"], 42);
    assert_eq!(locations[0]["commit"], "deadbeef");
    assert_eq!(locations[0]["path"], "svc/def.go");
    assert_eq!(locations[0]["range"]["start"]["line"], 1);
}

#[test]
fn references_page_carries_an_opaque_next_cursor() {
    let (engine, dump_id) = engine_with_one_dump("rpc-refs");
    let params = json!({
        "repositoryId": 42, "commit": "deadbeef", "path": "svc/a.go",
        "line": 3, "character": 5, "uploadId": dump_id, "limit": 2,
    });

    let value = handle_method(&engine, Deadline::none(), "references", params.clone()).unwrap();
    assert_eq!(value["locations"].as_array().unwrap().len(), 2);
    let next_cursor = value["nextCursor"].as_str().unwrap().to_string();

    let mut resumed = params;
    resumed["cursor"] = json!(next_cursor);
    let value = handle_method(&engine, Deadline::none(), "references", resumed).unwrap();
    assert_eq!(value["locations"].as_array().unwrap().len(), 1);
    assert!(
        value.get("nextCursor").is_none(),
        "an absent cursor means done"
    );
}

#[test]
fn hover_answers_text_or_null() {
    let (engine, dump_id) = engine_with_one_dump("rpc-hover");
    let value = handle_method(
        &engine,
        Deadline::none(),
        "hover",
        json!({"path": "svc/a.go", "line": 3, "character": 5, "uploadId": dump_id}),
    )
    .unwrap();
    assert_eq!(value["text"], "fn a()");

    let value = handle_method(
        &engine,
        Deadline::none(),
        "hover",
        json!({"path": "svc/other.go", "line": 1, "character": 1, "uploadId": dump_id}),
    )
    .unwrap();
    assert_eq!(value, Value::Null);
}

#[test]
fn unknown_upload_maps_to_missing_dump() {
    let (engine, _) = engine_with_one_dump("rpc-404");
    let err = handle_method(
        &engine,
        Deadline::none(),
        "definitions",
        json!({"path": "a.go", "line": 1, "character": 1, "uploadId": 9999}),
    )
    .unwrap_err();
    assert!(matches!(err, Error::MissingDump));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn garbage_cursor_maps_to_a_clean_400() {
    let (engine, dump_id) = engine_with_one_dump("rpc-cursor");
    let err = handle_method(
        &engine,
        Deadline::none(),
        "references",
        json!({
            "repositoryId": 42, "commit": "deadbeef", "path": "svc/a.go",
            "line": 3, "character": 5, "uploadId": dump_id,
            "cursor": "not!a!cursor",
        }),
    )
    .unwrap_err();
    assert!(matches!(err, Error::MalformedCursor(_)));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn bad_params_and_unknown_methods_are_invalid_requests() {
    let (engine, _) = engine_with_one_dump("rpc-invalid");

    let err = handle_method(
        &engine,
        Deadline::none(),
        "definitions",
        json!({"path": "a.go"}),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));

    let err = handle_method(&engine, Deadline::none(), "nonsense", json!({})).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[test]
fn expired_deadline_cancels_the_request() {
    let (engine, dump_id) = engine_with_one_dump("rpc-cancel");
    let deadline = Deadline::after(std::time::Duration::ZERO);
    let err = handle_method(
        &engine,
        deadline,
        "definitions",
        json!({"path": "svc/a.go", "line": 3, "character": 5, "uploadId": dump_id}),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(err.status_code(), 499);
}

#[test]
fn upload_management_round_trip() {
    let (engine, dump_id) = engine_with_one_dump("rpc-uploads");

    let value = handle_method(
        &engine,
        Deadline::none(),
        "get_upload",
        json!({"id": dump_id}),
    )
    .unwrap();
    assert_eq!(value["id"], dump_id);
    assert_eq!(value["state"], "completed");

    let value = handle_method(
        &engine,
        Deadline::none(),
        "list_uploads",
        json!({"repositoryId": 42}),
    )
    .unwrap();
    assert_eq!(value["totalCount"], 1);

    let value = handle_method(
        &engine,
        Deadline::none(),
        "delete_upload",
        json!({"id": dump_id}),
    )
    .unwrap();
    assert_eq!(value["id"], dump_id);

    let err = handle_method(
        &engine,
        Deadline::none(),
        "get_upload",
        json!({"id": dump_id}),
    )
    .unwrap_err();
    assert!(matches!(err, Error::MissingDump));
}

#[test]
fn list_methods_exposes_param_schemas() {
    let (engine, _) = engine_with_one_dump("rpc-list");
    let value = handle_method(&engine, Deadline::none(), "list_methods", json!({})).unwrap();
    let methods = value.as_array().unwrap();
    assert!(methods
        .iter()
        .any(|m| m["name"] == "references" && m["params"].is_object()));
}
