use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use storefront_api::{
    errors::ServiceError,
    services::payments::{
        sign_payment, GatewayOrderRequest, PaymentGateway, RazorpayConfig, RazorpayGateway,
    },
};
use wiremock::{
    matchers::{basic_auth, body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn gateway(server: &MockServer) -> RazorpayGateway {
    RazorpayGateway::new(RazorpayConfig {
        key_id: "rzp_test_key".into(),
        key_secret: "rzp_test_secret".into(),
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn request(amount: i64) -> GatewayOrderRequest {
    GatewayOrderRequest {
        amount,
        currency: "INR".into(),
        receipt: "receipt_1700000000000".into(),
    }
}

#[tokio::test]
async fn creates_order_with_basic_auth_and_keeps_unknown_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .and(basic_auth("rzp_test_key", "rzp_test_secret"))
        .and(body_partial_json(json!({
            "amount": 198000,
            "currency": "INR",
            "receipt": "receipt_1700000000000",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_Nx1",
            "entity": "order",
            "amount": 198000,
            "amount_paid": 0,
            "currency": "INR",
            "receipt": "receipt_1700000000000",
            "status": "created",
            "attempts": 0,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = gateway(&server).create_order(request(198_000)).await.unwrap();

    assert_eq!(order.id, "order_Nx1");
    assert_eq!(order.amount, 198_000);
    assert_eq!(order.status.as_deref(), Some("created"));
    assert_eq!(order.extra.get("entity"), Some(&json!("order")));
    assert_eq!(order.extra.get("attempts"), Some(&json!(0)));
}

#[tokio::test]
async fn non_success_status_is_a_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": "SERVER_ERROR", "description": "The server encountered an error"}
        })))
        .mount(&server)
        .await;

    assert_matches!(
        gateway(&server).create_order(request(500)).await,
        Err(ServiceError::GatewayError(msg)) if msg.contains("500")
    );
}

#[tokio::test]
async fn response_without_order_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"amount": 500})))
        .mount(&server)
        .await;

    assert_matches!(
        gateway(&server).create_order(request(500)).await,
        Err(ServiceError::GatewayError(_))
    );
}

#[tokio::test]
async fn unreachable_gateway_is_a_gateway_error() {
    let server = MockServer::start().await;
    let client = gateway(&server);
    drop(server);

    assert_matches!(
        client.create_order(request(500)).await,
        Err(ServiceError::GatewayError(_))
    );
}

#[test]
fn payment_signature_uses_the_key_secret() {
    let client = RazorpayGateway::new(RazorpayConfig {
        key_id: "rzp_test_key".into(),
        key_secret: "rzp_test_secret".into(),
        base_url: "http://localhost".into(),
        timeout: Duration::from_secs(1),
    })
    .unwrap();

    let good = sign_payment("rzp_test_secret", "order_Nx1", "pay_42").unwrap();
    assert!(client.verify_payment("order_Nx1", "pay_42", &good).is_ok());

    let other_key = sign_payment("another_secret", "order_Nx1", "pay_42").unwrap();
    assert_matches!(
        client.verify_payment("order_Nx1", "pay_42", &other_key),
        Err(ServiceError::GatewayError(_))
    );
    assert!(client.verify_payment("order_Nx2", "pay_42", &good).is_err());
}
