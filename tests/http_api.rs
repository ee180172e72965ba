use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use mortuary::{AppState, Database, OccupancyManager, build_router};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> axum::Router {
    build_router(AppState::new(OccupancyManager::new(Database::in_memory())))
}

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    payload: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }

    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

async fn create_chamber(app: &axum::Router, name: &str, capacity: i64) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/chambers",
        Some(json!({ "name": name, "capacity": capacity })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body["data"].clone()
}

async fn create_deceased(app: &axum::Router, first_name: &str, extra: Value) -> Value {
    let mut payload = json!({
        "first_name": first_name,
        "last_name": "Example",
        "date_of_birth": "1938-04-02",
        "date_of_death": "2024-09-18",
    });
    if let (Some(target), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }
    let (status, body) = send(app, Method::POST, "/deceased", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body["data"].clone()
}

#[tokio::test]
async fn healthcheck_reports_ok() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["persistent"], false);
}

#[tokio::test]
async fn chamber_crud_flow() {
    let app = app();

    let chamber = create_chamber(&app, "A", 3).await;
    assert_eq!(chamber["name"], "A");
    assert_eq!(chamber["current_occupancy"], 0);
    assert_eq!(chamber["status"], "AVAILABLE");
    assert_eq!(chamber["available_units"], json!(["1A", "2A", "3A"]));

    let (status, body) = send(&app, Method::GET, "/chambers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(&app, Method::GET, "/chambers?chamber_name=A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["capacity"], 3);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/chambers?chamber_name=A",
        Some(json!({ "status": "MAINTENANCE" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "MAINTENANCE");
    assert_eq!(body["data"]["available_units"], json!([]));

    let (status, _) = send(&app, Method::DELETE, "/chambers?chamber_name=A", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/chambers?chamber_name=A", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn chamber_validation_and_conflicts() {
    let app = app();
    create_chamber(&app, "A", 2).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/chambers",
        Some(json!({ "name": "A", "capacity": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "chamber_exists");

    for payload in [
        json!({ "name": "aa", "capacity": 2 }),
        json!({ "name": "B", "capacity": 0 }),
        json!({ "name": "B", "capacity": -1 }),
        json!({ "name": "B", "capacity": 10_001 }),
        json!({ "name": "B", "capacity": 4_294_967_295u64 }),
        json!({ "name": "B", "capacity": 2, "status": "FULL" }),
    ] {
        let (status, body) = send(&app, Method::POST, "/chambers", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation_error");
    }

    let (status, _) = send(&app, Method::PUT, "/chambers", Some(json!({ "capacity": 3 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/chambers?chamber_name=A",
        Some(json!({ "capacity": 1_000_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/chambers?chamber_name=Q",
        Some(json!({ "capacity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chambers")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .expect("request should build");

    let response = app.oneshot(request).await.expect("response expected");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assignment_flow_and_release() {
    let app = app();
    create_chamber(&app, "A", 1).await;

    let record = create_deceased(&app, "Jane", json!({})).await;
    assert_eq!(record["status"], "IN_FACILITY");
    assert_eq!(record["chamber_name"], Value::Null);
    let id = record["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/deceased/assign?id={id}"),
        Some(json!({ "chamber_name": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unit_name"], "1A");
    assert_eq!(body["data"]["unit_number"], 1);

    let (_, body) = send(&app, Method::GET, "/chambers?chamber_name=A", None).await;
    assert_eq!(body["data"]["current_occupancy"], 1);
    assert_eq!(body["data"]["status"], "OCCUPIED");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/deceased/assign?id={id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_assigned");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/deceased?id={id}"),
        Some(json!({ "status": "RELEASED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "RELEASED");
    assert_eq!(body["data"]["unit_name"], Value::Null);

    let (_, body) = send(&app, Method::GET, "/chambers?chamber_name=A", None).await;
    assert_eq!(body["data"]["current_occupancy"], 0);
    assert_eq!(body["data"]["status"], "AVAILABLE");

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/deceased?id={id}"),
        Some(json!({ "status": "IN_FACILITY" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn full_chamber_is_unavailable() {
    let app = app();
    create_chamber(&app, "A", 1).await;
    create_deceased(&app, "First", json!({ "chamber_name": "A" })).await;
    let waiting = create_deceased(&app, "Second", json!({})).await;
    let id = waiting["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/deceased/assign?id={id}"),
        Some(json!({ "chamber_name": "A" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "chamber_unavailable");

    let (status, body) = send(&app, Method::GET, "/chambers/available", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = send(&app, Method::DELETE, "/chambers?chamber_name=A", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn auto_assign_uses_first_available_chamber() {
    let app = app();
    create_chamber(&app, "B", 2).await;
    create_chamber(&app, "A", 1).await;

    let first = create_deceased(&app, "One", json!({ "auto_assign": true })).await;
    let second = create_deceased(&app, "Two", json!({ "auto_assign": true })).await;
    assert_eq!(first["unit_name"], "1A");
    assert_eq!(second["unit_name"], "1B");

    let (status, body) = send(&app, Method::GET, "/chambers/available", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "B");
    assert_eq!(body["data"]["available_units"], json!(["2B"]));
}

#[tokio::test]
async fn auto_assign_with_every_chamber_full_is_bad_request() {
    let app = app();
    create_chamber(&app, "A", 1).await;
    create_deceased(&app, "Only", json!({ "auto_assign": true })).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/deceased",
        Some(json!({
            "first_name": "Overflow",
            "last_name": "Example",
            "date_of_death": "2024-09-18",
            "auto_assign": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "chamber_unavailable");

    let waiting = create_deceased(&app, "Waiting", json!({})).await;
    let id = waiting["id"].as_str().unwrap();
    let (status, body) = send(&app, Method::POST, &format!("/deceased/assign?id={id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "chamber_unavailable");

    // Nothing was created by the rejected request.
    let (_, body) = send(&app, Method::GET, "/deceased", None).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn deceased_queries_and_validation() {
    let app = app();
    create_chamber(&app, "A", 2).await;
    let placed = create_deceased(&app, "Placed", json!({ "chamber_name": "A" })).await;
    create_deceased(&app, "Waiting", json!({})).await;

    let (status, body) = send(&app, Method::GET, "/deceased", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));

    let (status, body) = send(&app, Method::GET, "/deceased?chamber_name=A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], placed["id"]);

    let (status, body) = send(&app, Method::GET, "/deceased?unit_name=1A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["id"], placed["id"]);

    let (status, body) = send(&app, Method::GET, "/deceased?unit_name=2A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, body) = send(&app, Method::GET, "/deceased?unit_name=A1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let id = placed["id"].as_str().unwrap();
    let (status, body) = send(&app, Method::GET, &format!("/deceased?id={id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["first_name"], "Placed");

    let (status, body) = send(&app, Method::GET, "/deceased?id=nope", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = send(&app, Method::GET, "/deceased?status=LOST", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/deceased?id=8d7d2f4a-0c39-4b8e-9a52-8b2b8f0d6c11",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::POST,
        "/deceased",
        Some(json!({
            "first_name": " ",
            "last_name": "Blank",
            "date_of_death": "2024-01-01",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = send(
        &app,
        Method::POST,
        "/deceased",
        Some(json!({
            "first_name": "Both",
            "last_name": "Targets",
            "date_of_death": "2024-01-01",
            "chamber_name": "A",
            "auto_assign": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_deceased_frees_unit() {
    let app = app();
    create_chamber(&app, "C", 1).await;
    let record = create_deceased(&app, "Temp", json!({ "chamber_name": "C" })).await;
    let id = record["id"].as_str().unwrap();

    let (status, body) = send(&app, Method::DELETE, &format!("/deceased?id={id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], record["id"]);

    let (_, body) = send(&app, Method::GET, "/chambers?chamber_name=C", None).await;
    assert_eq!(body["data"]["current_occupancy"], 0);

    let (status, _) = send(&app, Method::DELETE, &format!("/deceased?id={id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reconcile_endpoint_returns_nothing_when_consistent() {
    let app = app();
    create_chamber(&app, "A", 2).await;
    create_deceased(&app, "Kept", json!({ "chamber_name": "A" })).await;

    let (status, body) = send(&app, Method::POST, "/chambers/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}
