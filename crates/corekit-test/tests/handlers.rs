//! Typed API handlers: decoding, error mapping, panics and route conflicts.

use std::sync::Arc;

use corekit_core::{ApiError, Level, MemoryLogger, RequestContext};
use corekit_server::Service;
use corekit_test::TestClient;
use http::StatusCode;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct Lookup {
    id: u32,
}

#[derive(Debug, Serialize)]
struct User {
    id: u32,
    name: &'static str,
}

async fn echo(_ctx: RequestContext, input: Value) -> Result<Value, ApiError> {
    Ok(input)
}

async fn find_user(_ctx: RequestContext, lookup: Lookup) -> Result<User, ApiError> {
    match lookup.id {
        1 => Ok(User { id: 1, name: "alice" }),
        id => Err(ApiError::not_found(format!("user {id} does not exist"))),
    }
}

fn echo_client() -> TestClient {
    let mut service = Service::builder().name("echo").build().unwrap();
    service.post("/echo", echo);
    TestClient::new(service)
}

/// JSON values whose numbers survive a text round trip unchanged.
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<u64>().prop_map(|n| json!(n)),
        ".{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_echo_returns_payload(payload in json_value()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let client = echo_client();

        let response = runtime.block_on(client.post("/echo").json(&payload).send());
        prop_assert_eq!(response.status(), StatusCode::OK);
        prop_assert_eq!(response.json::<Value>().unwrap(), payload);
    }
}

#[tokio::test]
async fn test_echo_with_empty_body_is_null() {
    echo_client()
        .post("/echo")
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json_eq(&Value::Null);
}

#[tokio::test]
async fn test_query_input_and_not_found() {
    let mut service = Service::builder().build().unwrap();
    service.get("/users", find_user);
    let client = TestClient::new(service);

    client
        .get("/users")
        .query(&[("id", "1")])
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json_eq(&json!({"id": 1, "name": "alice"}));

    let response = client.get("/users").query(&[("id", "7")]).send().await;
    response.assert_error(StatusCode::NOT_FOUND, "not_found");
    assert_eq!(
        response.error_body().unwrap().message,
        "user 7 does not exist"
    );
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mut service = Service::builder().build().unwrap();
    service.post("/users", find_user);
    let client = TestClient::new(service);

    client
        .post("/users")
        .content_type("application/json")
        .body("{\"id\":")
        .send()
        .await
        .assert_error(StatusCode::BAD_REQUEST, "decode_error");

    client
        .post("/users")
        .json(&json!({"id": "one"}))
        .send()
        .await
        .assert_error(StatusCode::BAD_REQUEST, "decode_error");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    echo_client()
        .get("/nope")
        .send()
        .await
        .assert_error(StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn test_path_params_reach_handler() {
    let mut service = Service::builder().build().unwrap();
    service.delete("/orders/:id", |ctx: RequestContext, (): ()| async move {
        let id = ctx.param("id").unwrap_or_default().to_string();
        Ok::<_, ApiError>(json!({"deleted": id, "route": ctx.route()}))
    });
    let client = TestClient::new(service);

    client
        .delete("/orders/a-17")
        .send()
        .await
        .assert_json_eq(&json!({"deleted": "a-17", "route": "/orders/:id"}));
}

#[tokio::test]
async fn test_duplicate_route_last_registration_wins() {
    let logger = Arc::new(MemoryLogger::new());
    let mut service = Service::builder().logger(logger.clone()).build().unwrap();

    service.get("/version", |_ctx: RequestContext, (): ()| async move {
        Ok::<_, ApiError>("first")
    });
    service.get("/version", |_ctx: RequestContext, (): ()| async move {
        Ok::<_, ApiError>("second")
    });

    let count = service
        .routes()
        .iter()
        .filter(|(_, pattern)| pattern == "/version")
        .count();
    assert_eq!(count, 1);
    assert!(logger.contains(Level::WARN, "GET /version registered twice"));

    TestClient::new(service)
        .get("/version")
        .send()
        .await
        .assert_json_eq(&json!("second"));
}

#[tokio::test]
async fn test_panicking_handler_is_500_and_service_keeps_serving() {
    let logger = Arc::new(MemoryLogger::new());
    let mut service = Service::builder().logger(logger.clone()).build().unwrap();
    service.get("/boom", |_ctx: RequestContext, (): ()| async move {
        if true {
            panic!("handler exploded");
        }
        Ok::<_, ApiError>(())
    });
    service.post("/echo", echo);
    let client = TestClient::new(service);

    let response = client.get("/boom").send().await;
    response.assert_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error");
    assert_eq!(
        response.error_body().unwrap().message,
        "internal server error"
    );
    assert!(logger.contains(Level::ERROR, "handler exploded"));

    client
        .post("/echo")
        .json(&json!({"still": "alive"}))
        .send()
        .await
        .assert_json_eq(&json!({"still": "alive"}));
}

#[tokio::test]
async fn test_server_error_is_logged_at_error_level() {
    let logger = Arc::new(MemoryLogger::new());
    let mut service = Service::builder().logger(logger.clone()).build().unwrap();
    service.get("/fail", |_ctx: RequestContext, (): ()| async move {
        Err::<(), _>(ApiError::unavailable("database is down"))
    });
    let client = TestClient::new(service);

    client
        .get("/fail")
        .send()
        .await
        .assert_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable");
    assert!(logger.contains(Level::ERROR, "GET /fail failed with 503"));
}
