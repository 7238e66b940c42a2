mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;
use kiln_storefront::api::router;
use kiln_storefront::session::{USER_ID_HEADER, USER_ROLE_HEADER};

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(h.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn as_user(method: &str, uri: &str, user: Uuid, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri).header(USER_ID_HEADER, user.to_string());
    match body {
        Some(b) => builder.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let (status, body) = send(&h, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "kiln-storefront");
}

#[tokio::test]
async fn test_cart_requires_session() {
    let h = Harness::new();
    let (status, body) = send(&h, Request::get("/api/v1/cart").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication required");
}

#[tokio::test]
async fn test_add_to_cart_uses_catalog_price() {
    let h = Harness::new();
    h.seed(7, 250, 3).await;
    let user = Uuid::new_v4();

    let (status, body) = send(&h, as_user("POST", "/api/v1/cart", user, Some(json!({"product_id": 7})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item_count"], 1);
    assert_eq!(body["items"][0]["product_name"], "Piece 7");

    let (status, _) = send(&h, as_user("POST", "/api/v1/cart", user, Some(json!({"product_id": 404})))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_need_admin_role() {
    let h = Harness::new();
    let draft = json!({"name": "Tea Bowl", "price": "1200", "stock_quantity": 4});

    let (status, _) = send(&h, as_user("POST", "/api/v1/admin/products", Uuid::new_v4(), Some(draft.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::post("/api/v1/admin/products")
        .header(USER_ID_HEADER, Uuid::new_v4().to_string())
        .header(USER_ROLE_HEADER, "admin")
        .header("content-type", "application/json")
        .body(Body::from(draft.to_string()))
        .unwrap();
    let (status, body) = send(&h, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["stock_quantity"], 4);

    let (status, body) = send(&h, Request::get("/api/v1/products").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_webhook_token_checked() {
    let h = Harness::with_token(Some("hook-secret".into()));
    let payload = json!({"order_id": "SR-1", "status_code": 6}).to_string();

    let request = Request::post("/api/v1/webhooks/shiprocket").header("content-type", "application/json").body(Body::from(payload.clone())).unwrap();
    let (status, _) = send(&h, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::post("/api/v1/webhooks/shiprocket")
        .header("content-type", "application/json")
        .header("x-api-key", "hook-secret")
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send(&h, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_postal_lookup() {
    let h = Harness::new();
    let (status, body) = send(&h, Request::get("/api/v1/postal/400001").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Maharashtra");

    let (status, _) = send(&h, Request::get("/api/v1/postal/000000").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h, Request::get("/api/v1/postal/40001").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
