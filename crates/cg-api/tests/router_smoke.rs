use axum::{body::Body, http::Request, http::StatusCode, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn resume(name: &str, skills: Value) -> Value {
    json!({ "name": name, "skills": skills })
}

#[tokio::test]
async fn livez_is_open_and_api_requires_auth_when_keyed() {
    let app = cg_api::create_router(cg_api::test_state(Some("test-key")));

    let (status, _) = send(&app, "GET", "/livez", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/candidates/search", Some(json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn ingest_search_match_and_paths_round_trip() {
    let app = cg_api::create_router(cg_api::test_state(None));

    let (status, ada) = send(
        &app,
        "POST",
        "/api/candidates",
        Some(resume(
            "Ada",
            json!([{"name": "Python", "level": "expert"}, {"name": "SQL", "level": "intermediate"}]),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let ada_uid = ada["candidate_uid"].as_str().unwrap().to_string();

    let (status, brian) = send(
        &app,
        "POST",
        "/api/candidates",
        Some(resume("Brian", json!([{"name": "Python", "level": "beginner"}]))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let brian_uid = brian["candidate_uid"].as_str().unwrap().to_string();

    // Hard filter: only Ada meets the advanced floor.
    let (status, hits) = send(
        &app,
        "POST",
        "/api/candidates/search",
        Some(json!({"must_have": {"skills": [{"name": "python", "min_level": "advanced"}]}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["uid"], Value::String(ada_uid.clone()));

    // Soft scoring ranks Ada over Brian.
    let (status, ranked) = send(
        &app,
        "POST",
        "/api/candidates/match",
        Some(json!({
            "nice_to_have": {"skills": [{"name": "python"}]},
            "top_k": 5,
            "explain": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ranked = ranked.as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0]["candidate_uid"], Value::String(ada_uid.clone()));
    assert!(ranked[0]["explain"].is_array());

    // Shared Python skill connects them in two hops.
    let (status, path) = send(
        &app,
        "GET",
        &format!("/api/paths?from={ada_uid}&to={brian_uid}&max_hops=2&projection=candidate-skill"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(path["path"]["hops"], 2);

    let (status, related) = send(
        &app,
        "GET",
        &format!("/api/candidates/{ada_uid}/related?projection=candidate-skill&max_hops=2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(related[0]["candidate_uid"], Value::String(brian_uid));
}

#[tokio::test]
async fn malformed_criteria_is_a_bad_request() {
    let app = cg_api::create_router(cg_api::test_state(None));

    let (status, body) = send(
        &app,
        "POST",
        "/api/candidates/match",
        Some(json!({"must_have": {"skils": []}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let _ = body;

    let (status, body) = send(&app, "POST", "/api/candidates/match", Some(json!({"top_k": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn unknown_candidate_is_not_found() {
    let app = cg_api::create_router(cg_api::test_state(None));

    let (status, body) = send(&app, "GET", "/api/candidates/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn recalc_and_projection_lifecycle() {
    let app = cg_api::create_router(cg_api::test_state(None));

    send(
        &app,
        "POST",
        "/api/candidates",
        Some(resume("Ada", json!([{"name": "Rust", "level": "expert"}]))),
    )
    .await;

    // Ingestion already derived the weights, so a full recompute is a no-op.
    let (status, report) = send(&app, "POST", "/api/weights/recalc", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["updated"], 0);
    assert_eq!(report["examined"], 1);
    assert!(report["failures"].as_array().unwrap().is_empty());

    let (status, built) = send(
        &app,
        "POST",
        "/api/projections/candidate-skill/refresh",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(built["nodes"], 2);

    let (status, dropped) = send(&app, "DELETE", "/api/projections/candidate-skill", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dropped["dropped"], true);

    let (status, body) = send(&app, "POST", "/api/projections/bogus/refresh", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}
