mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, WEBHOOK_SECRET};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{json, Value};
use uuid::Uuid;

use gadget_commerce_api::{
    entities::{
        checkout_attempt,
        order::{OrderStatus, PaymentStatus},
        order_item, product, CheckoutAttempt, Order, OrderItem, Product,
    },
    errors::ServiceError,
    services::{ledger::CommitOutcome, signature},
};

/// Decimal JSON values arrive as strings; SQLite roundtrips may strip
/// trailing zeros, so compare numerically.
fn as_f64(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().expect("numeric string"),
        Value::Number(n) => n.as_f64().expect("number"),
        other => panic!("expected numeric value, got {:?}", other),
    }
}

fn checkout_body() -> Value {
    json!({
        "customer_name": "Asha Rao",
        "customer_email": "asha@example.com",
        "phone": "9876543210",
        "address": "12 MG Road, Flat 4",
        "city": "Bengaluru",
        "postal_code": "560001"
    })
}

async fn add_to_cart(app: &TestApp, session: &str, product_id: Uuid, quantity: i32) -> StatusCode {
    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{}/items", session),
            &[],
            Some(json!({ "product_id": product_id, "quantity": quantity })),
        )
        .await;
    status
}

async fn begin_checkout(app: &TestApp, session: &str) -> (StatusCode, Value) {
    app.request(
        Method::POST,
        &format!("/api/v1/checkout/{}", session),
        &[],
        Some(checkout_body()),
    )
    .await
}

async fn send_callback(
    app: &TestApp,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    sig: &str,
) -> (StatusCode, Value) {
    app.request(
        Method::POST,
        "/api/v1/payments/callback",
        &[],
        Some(json!({
            "gateway_order_id": gateway_order_id,
            "gateway_payment_id": gateway_payment_id,
            "signature": sig
        })),
    )
    .await
}

#[tokio::test]
async fn full_checkout_and_payment_flow() {
    let app = TestApp::new().await;
    let product_id = app
        .seed_product("Gadget Laptop", dec!(1000), dec!(10), 10)
        .await;

    assert_eq!(add_to_cart(&app, "sess-1", product_id, 3).await, StatusCode::OK);

    let (status, receipt) = begin_checkout(&app, "sess-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(as_f64(&receipt["amount"]), 2700.0);
    assert_eq!(receipt["amount_minor"], 270000);
    assert_eq!(receipt["currency"], "INR");
    let gateway_order_id = receipt["gateway_order_id"].as_str().unwrap().to_string();

    // The cart survives until payment is confirmed.
    let (_, cart) = app
        .request(Method::GET, "/api/v1/carts/sess-1", &[], None)
        .await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);

    let sig = signature::sign(&gateway_order_id, "pay_77", WEBHOOK_SECRET);
    let (status, body) = send_callback(&app, &gateway_order_id, "pay_77", &sig).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();

    // Stock decremented by exactly the committed quantity.
    let stored = Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 7);

    // Order written as Placed/Paid with price-at-purchase lines.
    let placed = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(placed.status, OrderStatus::Placed);
    assert_eq!(placed.payment_status, PaymentStatus::Paid);
    assert_eq!(placed.gateway_payment_id.as_deref(), Some("pay_77"));

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 3);
    let line_sum: Decimal = items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();
    assert_eq!(line_sum, placed.total_amount);

    // Cart destroyed by the commit.
    let (_, cart) = app
        .request(Method::GET, "/api/v1/carts/sess-1", &[], None)
        .await;
    assert!(cart["lines"].as_array().unwrap().is_empty());

    // Attempt closed out.
    let attempt = CheckoutAttempt::find()
        .filter(checkout_attempt::Column::GatewayOrderId.eq(gateway_order_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, OrderStatus::Placed);
}

#[tokio::test]
async fn replayed_callback_is_idempotent() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Gadget Mouse", dec!(450), dec!(0), 5).await;

    assert_eq!(add_to_cart(&app, "sess-2", product_id, 2).await, StatusCode::OK);
    let (_, receipt) = begin_checkout(&app, "sess-2").await;
    let gateway_order_id = receipt["gateway_order_id"].as_str().unwrap();

    let sig = signature::sign(gateway_order_id, "pay_1", WEBHOOK_SECRET);
    let (first_status, first) = send_callback(&app, gateway_order_id, "pay_1", &sig).await;
    let (second_status, second) = send_callback(&app, gateway_order_id, "pay_1", &sig).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["order_id"], second["order_id"]);

    let order_count = Order::find().count(&*app.state.db).await.unwrap();
    assert_eq!(order_count, 1);

    // Stock decremented once, not twice.
    let stored = Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 3);
}

#[tokio::test]
async fn forged_callback_commits_nothing() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Gadget Kettle", dec!(900), dec!(0), 4).await;

    assert_eq!(add_to_cart(&app, "sess-3", product_id, 1).await, StatusCode::OK);
    let (_, receipt) = begin_checkout(&app, "sess-3").await;
    let gateway_order_id = receipt["gateway_order_id"].as_str().unwrap();

    let (status, _) =
        send_callback(&app, gateway_order_id, "pay_1", "deadbeef".repeat(8).as_str()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 0);
    let stored = Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 4);

    // The attempt is closed as failed and cannot be replayed into an order.
    let attempt = CheckoutAttempt::find()
        .filter(checkout_attempt::Column::GatewayOrderId.eq(gateway_order_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, OrderStatus::PaymentFailed);
}

#[tokio::test]
async fn shortage_after_payment_rolls_back_everything() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Gadget Fan", dec!(1500), dec!(0), 2).await;

    assert_eq!(add_to_cart(&app, "sess-4", product_id, 2).await, StatusCode::OK);
    let (_, receipt) = begin_checkout(&app, "sess-4").await;
    let gateway_order_id = receipt["gateway_order_id"].as_str().unwrap();

    // Someone else takes a unit between quote and callback.
    {
        use sea_orm::{ActiveModelTrait, ActiveValue::Set};
        let model = Product::find_by_id(product_id)
            .one(&*app.state.db)
            .await
            .unwrap()
            .unwrap();
        let mut active: product::ActiveModel = model.into();
        active.stock = Set(1);
        active.update(&*app.state.db).await.unwrap();
    }

    let sig = signature::sign(gateway_order_id, "pay_1", WEBHOOK_SECRET);
    let (status, body) = send_callback(&app, gateway_order_id, "pay_1", &sig).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let shortages = body["shortages"].as_array().unwrap();
    assert_eq!(shortages.len(), 1);
    assert_eq!(shortages[0]["requested"], 2);
    assert_eq!(shortages[0]["available"], 1);

    // Nothing committed, nothing decremented further.
    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 0);
    let stored = Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 1);

    // The attempt stays pending, so a later retry can still succeed.
    let attempt = CheckoutAttempt::find()
        .filter(checkout_attempt::Column::GatewayOrderId.eq(gateway_order_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status, OrderStatus::PendingPayment);
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new().await;
    let (status, _) = begin_checkout(&app, "sess-empty").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cart_add_beyond_stock_is_rejected_with_shortage() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Gadget Lamp", dec!(300), dec!(0), 2).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/carts/sess-5/items",
            &[],
            Some(json!({ "product_id": product_id, "quantity": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["shortages"][0]["available"], 2);
}

#[tokio::test]
async fn snapshot_prunes_unavailable_products() {
    let app = TestApp::new().await;
    let kept = app.seed_product("Gadget A", dec!(100), dec!(0), 5).await;
    let pulled = app.seed_product("Gadget B", dec!(200), dec!(0), 5).await;

    assert_eq!(add_to_cart(&app, "sess-6", kept, 1).await, StatusCode::OK);
    assert_eq!(add_to_cart(&app, "sess-6", pulled, 1).await, StatusCode::OK);

    // Catalog pulls the second product.
    use sea_orm::{ActiveModelTrait, ActiveValue::Set};
    let model = Product::find_by_id(pulled)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: product::ActiveModel = model.into();
    active.available = Set(false);
    active.update(&*app.state.db).await.unwrap();

    let (_, cart) = app
        .request(Method::GET, "/api/v1/carts/sess-6", &[], None)
        .await;
    let lines = cart["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["product_id"], kept.to_string());
}

#[tokio::test]
async fn racing_commits_for_last_unit_yield_one_winner() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Gadget Drone", dec!(5000), dec!(0), 1).await;

    assert_eq!(add_to_cart(&app, "buyer-a", product_id, 1).await, StatusCode::OK);
    assert_eq!(add_to_cart(&app, "buyer-b", product_id, 1).await, StatusCode::OK);

    let (_, receipt_a) = begin_checkout(&app, "buyer-a").await;
    let (_, receipt_b) = begin_checkout(&app, "buyer-b").await;
    let gw_a = receipt_a["gateway_order_id"].as_str().unwrap().to_string();
    let gw_b = receipt_b["gateway_order_id"].as_str().unwrap().to_string();

    let ledger = app.state.ledger.clone();
    let (res_a, res_b) = tokio::join!(
        ledger.commit(&gw_a, "pay_a"),
        ledger.commit(&gw_b, "pay_b"),
    );

    let results = [res_a, res_b];
    let wins = results
        .iter()
        .filter(|r| matches!(r, Ok(CommitOutcome::Committed(_))))
        .count();
    let shortages = results
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::StockShortage(_))))
        .count();
    assert_eq!(wins, 1, "exactly one buyer gets the last unit");
    assert_eq!(shortages, 1, "the other sees a shortage");

    let stored = Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 0);
    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_duplicate_callbacks_both_succeed() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("Gadget Watch", dec!(2000), dec!(0), 3).await;

    assert_eq!(add_to_cart(&app, "sess-dup", product_id, 1).await, StatusCode::OK);
    let (_, receipt) = begin_checkout(&app, "sess-dup").await;
    let gw = receipt["gateway_order_id"].as_str().unwrap().to_string();

    // The gateway delivers the same confirmation twice, overlapping.
    let ledger = app.state.ledger.clone();
    let (res_a, res_b) = tokio::join!(ledger.commit(&gw, "pay_dup"), ledger.commit(&gw, "pay_dup"));

    let outcome_a = res_a.expect("first delivery succeeds");
    let outcome_b = res_b.expect("second delivery succeeds");
    assert_eq!(outcome_a.order().id, outcome_b.order().id);

    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 1);
    let stored = Product::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 2);
}

#[tokio::test]
async fn order_totals_match_line_sums() {
    let app = TestApp::new().await;
    let a = app.seed_product("Gadget A", dec!(450), dec!(0), 10).await;
    let b = app.seed_product("Gadget B", dec!(120), dec!(0), 10).await;

    assert_eq!(add_to_cart(&app, "sess-7", a, 2).await, StatusCode::OK);
    assert_eq!(add_to_cart(&app, "sess-7", b, 4).await, StatusCode::OK);

    let (_, receipt) = begin_checkout(&app, "sess-7").await;
    assert_eq!(as_f64(&receipt["amount"]), 1380.0);
    let gateway_order_id = receipt["gateway_order_id"].as_str().unwrap();

    let sig = signature::sign(gateway_order_id, "pay_9", WEBHOOK_SECRET);
    let (status, body) = send_callback(&app, gateway_order_id, "pay_9", &sig).await;
    assert_eq!(status, StatusCode::OK);
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();

    let placed = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    let line_sum: Decimal = items
        .iter()
        .map(|i| i.price * Decimal::from(i.quantity))
        .sum();
    assert_eq!(line_sum, placed.total_amount);
}
