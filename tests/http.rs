use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use pub_quiz_back::{
    build_router, config::AppConfig, services::game_service, state::rounds::RoundRegistry,
};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> Router {
    let state = game_service::bootstrap(AppConfig::demo(), &RoundRegistry::with_builtin()).unwrap();
    build_router(state)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn healthcheck_lists_bound_routes() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/healthcheck", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "ok", "routes": ["admin", "big_screen", "player"] })
    );
}

#[tokio::test]
async fn unbound_route_is_not_found() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/karaoke", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("karaoke"));
}

#[tokio::test]
async fn admin_commands_drive_the_game() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/admin",
        Some(json!({ "add_player": { "name": "Ada" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "player_added", "info_msg": "Ada" }));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/admin",
        Some(json!({ "advance": { "idx": 1 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, screen) = call(&app, Method::GET, "/api/big_screen", None).await;
    assert_eq!(screen["widget_name"], json!("question"));
    assert_eq!(screen["current_index"], json!(1));
    assert_eq!(screen["length"], json!(4));

    let (_, roster) = call(&app, Method::GET, "/api/player", None).await;
    assert_eq!(
        roster,
        json!({ "player_update": [ { "name": "Ada", "score": 0, "isplaying": true } ] })
    );
}

#[tokio::test]
async fn refused_and_malformed_commands_map_to_http_errors() {
    let app = app();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/admin",
        Some(json!({ "advance": { "idx": 99 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::POST, "/api/admin", Some(json!({ "dance": {} }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::POST, "/api/big_screen", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api-doc/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/api/{route}").is_some());
    assert!(body["paths"].get("/ws/{token}").is_some());
}
