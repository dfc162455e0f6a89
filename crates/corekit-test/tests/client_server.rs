//! The client helper against a live service.

use std::net::SocketAddr;

use corekit_client::{ClientError, HttpClient};
use corekit_core::{ApiError, RequestContext};
use corekit_server::{Service, ServiceInfo, ShutdownSignal};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    sku: String,
    quantity: u32,
}

async fn create_order(_ctx: RequestContext, order: Order) -> Result<Order, ApiError> {
    if order.quantity == 0 {
        return Err(ApiError::validation("quantity must be positive"));
    }
    Ok(order)
}

async fn get_order(ctx: RequestContext, (): ()) -> Result<Order, ApiError> {
    match ctx.param("sku") {
        Some("taken") => Err(ApiError::conflict("order is locked")),
        Some(sku) => Err(ApiError::not_found(format!("no order {sku}"))),
        None => Err(ApiError::bad_request("missing sku")),
    }
}

async fn start() -> (HttpClient, ShutdownSignal, JoinHandle<Result<(), corekit_server::ServerError>>) {
    let mut service = Service::builder()
        .name("orders")
        .version("3.0.0")
        .dependency("db", || "ok")
        .build()
        .unwrap();
    service.post("/orders", create_order);
    service.get("/orders/:sku", get_order);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = tokio::spawn(service.serve(listener, shutdown.clone()));

    let transport = reqwest::Client::builder().no_proxy().build().unwrap();
    let client = HttpClient::with_transport(format!("http://{addr}/"), transport);
    (client, shutdown, server)
}

#[tokio::test]
async fn test_round_trip_and_error_mapping() {
    let (client, shutdown, server) = start().await;

    let order = Order {
        sku: "a-1".to_string(),
        quantity: 2,
    };
    let created: Order = client.post("/orders", &order).await.unwrap();
    assert_eq!(created, order);

    let info: ServiceInfo = client.get("/info").await.unwrap();
    assert_eq!(info.name, "orders");
    assert_eq!(info.dependencies["db"], "ok");

    let err = client.get::<Order>("/orders/missing").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client.get::<Order>("/orders/taken").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    let body = err.error_body().unwrap();
    assert_eq!(body.code, "conflict");
    assert_eq!(body.message, "order is locked");

    let invalid = Order {
        sku: "a-2".to_string(),
        quantity: 0,
    };
    let err = client.post::<_, Order>("/orders", &invalid).await.unwrap_err();
    assert!(matches!(
        &err,
        ClientError::Api { status, body, .. }
            if *status == StatusCode::UNPROCESSABLE_ENTITY && body.code == "validation_error"
    ));
    assert_eq!(err.path(), "/orders");

    shutdown.trigger();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_health_through_execute() {
    let (client, shutdown, server) = start().await;

    client
        .execute::<()>(http::Method::GET, "/health", None)
        .await
        .unwrap();

    shutdown.trigger();
    server.await.unwrap().unwrap();
}
