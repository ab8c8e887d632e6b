mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::*;
use wechat_checkout::{
    handlers::NOTIFY_ACK, models::TransactionState, services::TransactionStore,
};

// ============ Checkout page ============

#[tokio::test]
async fn qrcode_page_renders_code_for_session_order() {
    let mut gateway = mockito::Server::new_async().await;
    let unified_order = gateway
        .mock("POST", "/pay/unifiedorder")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::Regex("<out_trade_no><!\\[CDATA\\[SO1001\\]\\]>".to_string()),
            mockito::Matcher::Regex("<total_fee><!\\[CDATA\\[1250\\]\\]>".to_string()),
            mockito::Matcher::Regex("/checkout/notify".to_string()),
        ]))
        .with_status(200)
        .with_body(signed(&[
            ("return_code", "SUCCESS"),
            ("result_code", "SUCCESS"),
            ("code_url", "weixin://wxpay/bizpayurl?pr=abc123"),
        ]))
        .create_async()
        .await;
    let app = TestApp::new(gateway.url());

    let cookie = app.begin("SO1001", "12.50").await;
    let response = app.send(get("/checkout/qrcode", &cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["qrcode"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert_eq!(body["order"], "SO1001");
    assert_eq!(body["amount"], "12.50");
    unified_order.assert_async().await;

    let tx = app.transaction("SO1001").await;
    assert_eq!(tx.state, TransactionState::Draft);
}

#[tokio::test]
async fn qrcode_page_reports_gateway_failure() {
    let mut gateway = mockito::Server::new_async().await;
    gateway
        .mock("POST", "/pay/unifiedorder")
        .with_status(200)
        .with_body("<xml><return_code><![CDATA[FAIL]]></return_code><return_msg><![CDATA[mch_id invalid]]></return_msg></xml>")
        .create_async()
        .await;
    let app = TestApp::new(gateway.url());

    let cookie = app.begin("SO1001", "0.01").await;
    let body = body_json(app.send(get("/checkout/qrcode", &cookie)).await).await;

    assert!(body["error"].as_str().unwrap().contains("mch_id invalid"));
    assert!(body.get("qrcode").is_none());
}

#[tokio::test]
async fn qrcode_page_without_session_is_not_found() {
    let gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());

    let response = app.send(get("/checkout/qrcode", "checkout_session=unknown")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "NO_ACTIVE_ORDER");
}

#[tokio::test]
async fn begin_rejects_bad_requests() {
    let gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());
    app.begin("SO1001", "1").await;

    for body in [
        r#"{"reference":"SO1001","amount":"1"}"#,
        r#"{"reference":"SO1002","amount":"-5"}"#,
        r#"{"reference":"  ","amount":"1"}"#,
        r#"{"reference":"SO1003","amount":"0.001"}"#,
        r#"{"reference":"SO1004","amount":"79228162514264337593543950335"}"#,
    ] {
        let request = Request::post("/checkout/begin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);
    }
    assert!(app.store.search("SO1004").await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_begins_store_one_transaction() {
    let gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());

    let requests = (0..4).map(|_| {
        app.send(
            Request::post("/checkout/begin")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"reference":"SO1001","amount":"1"}"#))
                .unwrap(),
        )
    });
    let statuses: Vec<_> = futures::future::join_all(requests)
        .await
        .into_iter()
        .map(|response| response.status())
        .collect();

    assert_eq!(statuses.iter().filter(|s| s.is_success()).count(), 1);
    assert_eq!(app.transaction("SO1001").await.state, TransactionState::Draft);
}

// ============ Polling ============

#[tokio::test]
async fn poll_reports_pending_then_confirmed() {
    let mut gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());
    let cookie = app.begin("SO1001", "0.01").await;

    let not_paid = gateway
        .mock("POST", "/pay/orderquery")
        .with_status(200)
        .with_body(order_query("NOTPAY", ""))
        .create_async()
        .await;
    let body = body_json(app.send(get("/checkout/poll", &cookie)).await).await;
    assert_eq!(body, serde_json::json!({"result": 1, "order": "SO1001"}));
    assert_eq!(app.transaction("SO1001").await.state, TransactionState::Draft);
    not_paid.remove_async().await;

    gateway
        .mock("POST", "/pay/orderquery")
        .with_status(200)
        .with_body(order_query("SUCCESS", "WX777"))
        .create_async()
        .await;
    let body = body_json(app.send(get("/checkout/poll", &cookie)).await).await;
    assert_eq!(body, serde_json::json!({"result": 0, "order": "SO1001"}));

    let tx = app.transaction("SO1001").await;
    assert_eq!(tx.state, TransactionState::Done);
    assert_eq!(tx.acquirer_reference.as_deref(), Some("WX777"));
}

#[tokio::test]
async fn poll_treats_gateway_outage_as_unconfirmed() {
    let mut gateway = mockito::Server::new_async().await;
    gateway
        .mock("POST", "/pay/orderquery")
        .with_status(500)
        .create_async()
        .await;
    let app = TestApp::new(gateway.url());
    let cookie = app.begin("SO1001", "0.01").await;

    let response = app.send(get("/checkout/poll", &cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["result"], 1);
}

// ============ Notifications ============

#[tokio::test]
async fn notify_confirms_and_acknowledges_byte_exact() {
    let gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());
    app.insert("SO1001", TransactionState::Pending).await;

    for _ in 0..2 {
        let response = app
            .send(
                Request::post("/checkout/notify")
                    .body(Body::from(paid_push("SO1001", "WX777")))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");
        let body = body_bytes(response).await;
        assert_eq!(body, NOTIFY_ACK);
        assert_eq!(
            body,
            b"<xml><return_code><![CDATA[SUCCESS]]></return_code><return_msg><![CDATA[OK]]></return_msg></xml>"
        );
    }

    let tx = app.transaction("SO1001").await;
    assert_eq!(tx.state, TransactionState::Done);
    assert_eq!(tx.acquirer_reference.as_deref(), Some("WX777"));
}

#[tokio::test]
async fn notify_stays_silent_on_failure() {
    let gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());
    app.insert("SO2001", TransactionState::Cancel).await;

    let forged = paid_push("SO2001", "WX777").replace("WX777", "WX666");
    for payload in [
        paid_push("SO2001", "WX777"),
        paid_push("SO404", "WX777"),
        forged,
        "not xml".to_string(),
    ] {
        let response = app
            .send(Request::post("/checkout/notify").body(Body::from(payload)).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    let tx = app.transaction("SO2001").await;
    assert_eq!(tx.state, TransactionState::Cancel);
    assert_eq!(tx.acquirer_reference, None);
}

// ============ Browser return ============

#[tokio::test]
async fn return_always_redirects_to_processing_page() {
    let mut gateway = mockito::Server::new_async().await;
    gateway
        .mock("POST", "/pay/orderquery")
        .with_status(200)
        .with_body(order_query("SUCCESS", "WX777"))
        .create_async()
        .await;
    let app = TestApp::new(gateway.url());
    app.insert("SO1001", TransactionState::Pending).await;

    let response = app
        .send(Request::get("/checkout/return?order=SO1001").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], PROCESS_PAGE);
    assert_eq!(app.transaction("SO1001").await.state, TransactionState::Done);

    let response = app
        .send(
            Request::post("/checkout/return")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("order=SO404"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .send(Request::post("/checkout/return").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], PROCESS_PAGE);
}

// ============ Health ============

#[tokio::test]
async fn health_reports_store() {
    let gateway = mockito::Server::new_async().await;
    let app = TestApp::new(gateway.url());

    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], true);
}
