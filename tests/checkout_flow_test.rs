mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{test_config, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use storefront_api::{
    entities::{
        coupon::Entity as Coupon,
        order::{Entity as Order, OrderStatus, PaymentMode},
    },
    errors::ServiceError,
    services::{
        commerce::{
            checkout_service::{GatewayPaymentError, PaymentResult, PlaceOrderInput},
            CheckoutStep, DiscountKind,
        },
        coupons::NewCoupon,
        orders::ShippingAddress,
    },
};

const BUYER: &str = "uid-checkout";

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ravi Kumar".into(),
        phone: "+91 98450 00000".into(),
        email: Some("ravi@example.com".into()),
        address_line1: "4th Cross, Indiranagar".into(),
        postal_code: Some("560038".into()),
        city: Some("Bengaluru".into()),
        state: Some("KA".into()),
        ..Default::default()
    }
}

fn input(mode: PaymentMode, coupon: Option<&str>) -> PlaceOrderInput {
    PlaceOrderInput {
        payment_mode: mode,
        address: address(),
        coupon_code: coupon.map(str::to_string),
    }
}

fn paid_with(payment_id: &str, signature: String) -> PaymentResult {
    PaymentResult {
        razorpay_payment_id: Some(payment_id.into()),
        razorpay_signature: Some(signature),
        error: None,
    }
}

async fn used_count(app: &TestApp, code: &str) -> i32 {
    Coupon::find_by_id(code.to_string())
        .one(app.db())
        .await
        .unwrap()
        .unwrap()
        .used_count
}

fn fixed_coupon(code: &str, value: rust_decimal::Decimal, max_uses: i32) -> NewCoupon {
    NewCoupon {
        code: code.into(),
        kind: DiscountKind::Fixed,
        value,
        expires_at: None,
        max_uses: Some(max_uses),
    }
}

async fn stocked_cart(app: &TestApp) {
    app.seed_product("A", dec!(600), Some(dec!(500)), 10).await;
    app.seed_product("B", dec!(1200), None, 3).await;
    app.add_to_cart(BUYER, "A", 2).await;
    app.add_to_cart(BUYER, "B", 1).await;
}

#[tokio::test]
async fn cash_on_delivery_is_confirmed_at_placement() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;

    let placed = app
        .state
        .services
        .checkout
        .place_order(BUYER, input(PaymentMode::Cod, None))
        .await
        .unwrap();

    assert!(placed.checkout_id.starts_with("cod_"));
    assert_eq!(placed.status, OrderStatus::Pending);
    assert_eq!(placed.step, CheckoutStep::Confirmed);
    assert!(placed.gateway_order.is_none());
    assert_eq!(placed.totals.total, dec!(2200));
    assert!(app.gateway.requests().is_empty());

    let follow_up = placed.follow_up.unwrap();
    assert_eq!(follow_up.cart_lines_removed, 2);
    assert!(follow_up.is_clean());
    assert_eq!(app.product_orders("A").await, 2);
    assert_eq!(app.product_orders("B").await, 1);

    let cart = app.state.services.carts.get_cart(BUYER).await.unwrap();
    assert!(cart.lines.is_empty());
}

#[tokio::test]
async fn prepaid_checkout_with_coupon_then_verified_payment() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;
    app.state
        .services
        .coupons
        .create_coupon(NewCoupon {
            code: "SAVE10".into(),
            kind: DiscountKind::Percentage,
            value: dec!(10),
            expires_at: None,
            max_uses: Some(10),
        })
        .await
        .unwrap();
    let checkout = &app.state.services.checkout;

    let placed = checkout
        .place_order(BUYER, input(PaymentMode::Prepaid, Some("save10")))
        .await
        .unwrap();

    assert_eq!(placed.checkout_id, "order_test0001");
    assert_eq!(placed.status, OrderStatus::Pending);
    assert_eq!(placed.step, CheckoutStep::GatewayPending);
    assert_eq!(placed.totals.subtotal, dec!(2200));
    assert_eq!(placed.totals.discount, dec!(220));
    assert_eq!(placed.totals.total, dec!(1980));
    assert_eq!(placed.totals.amount_minor, 198_000);
    assert_eq!(used_count(&app, "SAVE10").await, 1);

    let requests = app.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, 198_000);
    assert_eq!(requests[0].currency, "INR");

    // Nothing is reconciled until the payment lands.
    assert_eq!(app.product_orders("A").await, 0);
    assert_eq!(
        app.state.services.carts.get_cart(BUYER).await.unwrap().lines.len(),
        2
    );

    let signature = app.gateway.sign("order_test0001", "pay_001");
    let outcome = checkout
        .handle_payment_result(BUYER, "order_test0001", paid_with("pay_001", signature.clone()))
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.status, OrderStatus::Paid);
    assert_eq!(outcome.step, CheckoutStep::Confirmed);
    assert_eq!(app.product_orders("A").await, 2);
    assert!(app
        .state
        .services
        .carts
        .get_cart(BUYER)
        .await
        .unwrap()
        .lines
        .is_empty());

    let replay = checkout
        .handle_payment_result(BUYER, "order_test0001", paid_with("pay_001", signature))
        .await
        .unwrap();
    assert!(!replay.created);
    assert_eq!(replay.status, OrderStatus::Paid);
    assert_eq!(app.product_orders("A").await, 2);

    let order = app
        .state
        .services
        .orders
        .get_order(BUYER, "order_test0001")
        .await
        .unwrap();
    assert_eq!(order.coupon_code.as_deref(), Some("SAVE10"));
    assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_001"));
}

#[tokio::test]
async fn last_coupon_slot_goes_to_exactly_one_checkout() {
    let app = TestApp::new().await;
    app.seed_product("P", dec!(500), None, 10).await;
    for buyer in ["uid-1", "uid-2"] {
        app.add_to_cart(buyer, "P", 1).await;
    }
    let coupons = &app.state.services.coupons;
    coupons
        .create_coupon(fixed_coupon("ONE", dec!(50), 1))
        .await
        .unwrap();
    let checkout = &app.state.services.checkout;

    // Previewing the coupon does not spend the slot.
    coupons.lookup("one").await.unwrap();
    let first = checkout
        .place_order("uid-1", input(PaymentMode::Cod, Some("one")))
        .await
        .unwrap();
    assert_eq!(first.totals.discount, dec!(50));
    assert_eq!(first.totals.total, dec!(450));
    assert_eq!(used_count(&app, "ONE").await, 1);

    assert_matches!(
        checkout
            .place_order("uid-2", input(PaymentMode::Cod, Some("one")))
            .await,
        Err(ServiceError::LimitReached(_))
    );
    assert_eq!(used_count(&app, "ONE").await, 1);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 1);
    assert_eq!(
        app.state.services.carts.get_cart("uid-2").await.unwrap().lines.len(),
        1
    );
}

#[tokio::test]
async fn refused_totals_do_not_spend_a_coupon_use() {
    let app = TestApp::new().await;
    app.seed_product("P", dec!(500), None, 10).await;
    app.add_to_cart(BUYER, "P", 1).await;
    app.state
        .services
        .coupons
        .create_coupon(fixed_coupon("BIG", dec!(1000), 3))
        .await
        .unwrap();

    assert_matches!(
        app.state
            .services
            .checkout
            .place_order(BUYER, input(PaymentMode::Cod, Some("BIG")))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_eq!(used_count(&app, "BIG").await, 0);
}

#[tokio::test]
async fn bad_signature_and_gateway_errors_leave_order_pending() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;
    let checkout = &app.state.services.checkout;
    let placed = checkout
        .place_order(BUYER, input(PaymentMode::Prepaid, None))
        .await
        .unwrap();
    let id = placed.checkout_id.as_str();

    assert_matches!(
        checkout
            .handle_payment_result(BUYER, id, paid_with("pay_x", "deadbeef".into()))
            .await,
        Err(ServiceError::GatewayError(_))
    );

    let declined = PaymentResult {
        razorpay_payment_id: None,
        razorpay_signature: None,
        error: Some(GatewayPaymentError {
            code: Some("BAD_REQUEST_ERROR".into()),
            description: Some("Card declined".into()),
        }),
    };
    assert_matches!(
        checkout.handle_payment_result(BUYER, id, declined).await,
        Err(ServiceError::GatewayError(reason)) if reason == "Card declined"
    );

    let order = app.state.services.orders.get_order(BUYER, id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.gateway_payment_id.is_none());
    assert_eq!(app.product_orders("A").await, 0);
}

#[tokio::test]
async fn payment_result_without_payment_id_reports_current_state() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;
    let checkout = &app.state.services.checkout;
    let placed = checkout
        .place_order(BUYER, input(PaymentMode::Prepaid, None))
        .await
        .unwrap();

    let outcome = checkout
        .handle_payment_result(BUYER, &placed.checkout_id, PaymentResult::default())
        .await
        .unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.status, OrderStatus::Pending);
    assert_eq!(outcome.step, CheckoutStep::GatewayPending);
}

#[tokio::test]
async fn success_page_finalizes_a_recorded_payment() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;
    let checkout = &app.state.services.checkout;
    let placed = checkout
        .place_order(BUYER, input(PaymentMode::Prepaid, None))
        .await
        .unwrap();
    let id = placed.checkout_id.as_str();

    // Nothing recorded yet: the page only reports the pending state.
    let early = checkout.confirm_success(BUYER, id).await.unwrap();
    assert_eq!(early.status, OrderStatus::Pending);
    assert!(!early.created);

    app.state
        .services
        .orders
        .record_payment(id, "pay_late", None)
        .await
        .unwrap();
    let confirmed = checkout.confirm_success(BUYER, id).await.unwrap();
    assert!(confirmed.created);
    assert_eq!(confirmed.status, OrderStatus::Paid);
    assert_eq!(confirmed.step, CheckoutStep::Confirmed);

    let again = checkout.confirm_success(BUYER, id).await.unwrap();
    assert!(!again.created);
    assert_eq!(app.product_orders("B").await, 1);
}

#[tokio::test]
async fn checkout_rejects_bad_input() {
    let app = TestApp::new().await;
    let checkout = &app.state.services.checkout;

    assert_matches!(
        checkout
            .place_order(BUYER, input(PaymentMode::Prepaid, None))
            .await,
        Err(ServiceError::ValidationError(_))
    );

    stocked_cart(&app).await;
    let mut blank = input(PaymentMode::Cod, None);
    blank.address.full_name = "   ".into();
    assert_matches!(
        checkout.place_order(BUYER, blank).await,
        Err(ServiceError::ValidationError(_))
    );

    assert_matches!(
        checkout
            .place_order(BUYER, input(PaymentMode::Prepaid, Some("NOSUCH")))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert!(app.gateway.requests().is_empty());

    assert_matches!(
        checkout
            .handle_payment_result(BUYER, "order_unknown", PaymentResult::default())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn cod_orders_do_not_take_payment_results() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;
    let checkout = &app.state.services.checkout;
    let placed = checkout
        .place_order(BUYER, input(PaymentMode::Cod, None))
        .await
        .unwrap();

    assert_matches!(
        checkout
            .handle_payment_result(
                BUYER,
                &placed.checkout_id,
                paid_with("pay_1", "sig".into())
            )
            .await,
        Err(ServiceError::InvalidOperation(_))
    );
}

#[tokio::test]
async fn slow_gateway_times_out_without_writing_an_order() {
    let mut cfg = test_config();
    cfg.payment_gateway_timeout_secs = 1;
    let app = TestApp::with_config(cfg).await;
    stocked_cart(&app).await;
    app.gateway.set_delay(Duration::from_secs(3));

    assert_matches!(
        app.state
            .services
            .checkout
            .place_order(BUYER, input(PaymentMode::Prepaid, None))
            .await,
        Err(ServiceError::GatewayError(reason)) if reason.contains("timed out")
    );
    assert!(app
        .state
        .services
        .orders
        .list_orders(BUYER)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn gateway_failure_surfaces_as_gateway_error() {
    let app = TestApp::new().await;
    stocked_cart(&app).await;
    app.gateway.fail_next_orders(true);

    assert_matches!(
        app.state
            .services
            .checkout
            .place_order(BUYER, input(PaymentMode::Prepaid, None))
            .await,
        Err(ServiceError::GatewayError(_))
    );
}
