//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and either the expected parse result or the expected error code. Bodies
//! are compared as parsed JSON, so field order does not matter. Items in
//! `input` and `expected` use the local cache schema; request and response
//! bodies use the wire schema.

use serde_json::Value;
use todo_sync_core::{HttpMethod, HttpRequest, HttpResponse, Result, TodoClient, TodoItem};

const BASE_URL: &str = "http://localhost:3000";

fn client() -> TodoClient {
    TodoClient::new(BASE_URL, "secret", "device-1")
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn cases(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn check_request(name: &str, req: &HttpRequest, expected: &Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.path, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: path");

    let expected_headers: Vec<(String, String)> = expected["headers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(req.headers, expected_headers, "{name}: headers");

    match expected.get("body") {
        Some(body) => {
            let sent: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(&sent, body, "{name}: body");
        }
        None => assert!(req.body.is_none(), "{name}: unexpected body"),
    }
}

/// A JSON body is serialized; a string body is sent as-is so vectors can
/// describe plain-text and malformed responses.
fn response(case: &Value) -> HttpResponse {
    let status = case["response"]["status"].as_u64().unwrap() as u16;
    let body = match &case["response"]["body"] {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    HttpResponse::new(status, body)
}

fn check_outcome<T: PartialEq + std::fmt::Debug>(name: &str, case: &Value, parsed: Result<(T, i64)>, key: &str)
where
    T: serde::de::DeserializeOwned,
{
    match case.get("expected_error") {
        Some(code) => {
            let err = parsed.expect_err(name);
            assert_eq!(err.code(), code.as_str().unwrap(), "{name}: error code");
        }
        None => {
            let (value, revision) = parsed.unwrap_or_else(|e| panic!("{name}: {e}"));
            let expected: T = serde_json::from_value(case["expected"][key].clone()).unwrap();
            assert_eq!(value, expected, "{name}: {key}");
            assert_eq!(revision, case["expected"]["revision"].as_i64().unwrap(), "{name}: revision");
        }
    }
}

fn input_item(case: &Value) -> TodoItem {
    serde_json::from_value(case["input"]["item"].clone()).unwrap()
}

fn input_revision(case: &Value) -> i64 {
    case["input"]["revision"].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[test]
fn list_test_vectors() {
    let c = client();
    for case in cases(include_str!("../../test-vectors/list.json")) {
        let name = case["name"].as_str().unwrap();
        let req = c.build_list(input_revision(&case));
        check_request(name, &req, &case["expected_request"]);
        check_outcome::<Vec<TodoItem>>(name, &case, c.parse_list(response(&case)), "items");
    }
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

#[test]
fn get_test_vectors() {
    let c = client();
    for case in cases(include_str!("../../test-vectors/get.json")) {
        let name = case["name"].as_str().unwrap();
        let id = case["input"]["id"].as_str().unwrap();
        let req = c.build_get(id, input_revision(&case));
        check_request(name, &req, &case["expected_request"]);
        check_outcome::<TodoItem>(name, &case, c.parse_element(response(&case)), "item");
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[test]
fn create_test_vectors() {
    let c = client();
    for case in cases(include_str!("../../test-vectors/create.json")) {
        let name = case["name"].as_str().unwrap();
        let req = c.build_create(&input_item(&case), input_revision(&case)).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_outcome::<TodoItem>(name, &case, c.parse_element(response(&case)), "item");
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[test]
fn update_test_vectors() {
    let c = client();
    for case in cases(include_str!("../../test-vectors/update.json")) {
        let name = case["name"].as_str().unwrap();
        let req = c.build_update(&input_item(&case), input_revision(&case)).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_outcome::<TodoItem>(name, &case, c.parse_element(response(&case)), "item");
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[test]
fn delete_test_vectors() {
    let c = client();
    for case in cases(include_str!("../../test-vectors/delete.json")) {
        let name = case["name"].as_str().unwrap();
        let id = case["input"]["id"].as_str().unwrap();
        let req = c.build_delete(id, input_revision(&case));
        check_request(name, &req, &case["expected_request"]);
        check_outcome::<TodoItem>(name, &case, c.parse_element(response(&case)), "item");
    }
}

// ---------------------------------------------------------------------------
// Replace all
// ---------------------------------------------------------------------------

#[test]
fn replace_all_test_vectors() {
    let c = client();
    for case in cases(include_str!("../../test-vectors/replace_all.json")) {
        let name = case["name"].as_str().unwrap();
        let items: Vec<TodoItem> = serde_json::from_value(case["input"]["items"].clone()).unwrap();
        let req = c.build_replace_all(&items, input_revision(&case)).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_outcome::<Vec<TodoItem>>(name, &case, c.parse_list(response(&case)), "items");
    }
}
