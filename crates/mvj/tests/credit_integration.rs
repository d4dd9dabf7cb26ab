//! Credit decisions fetched from an HTTP bureau, stored per business id, and linked to contacts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::Router;
use httpmock::prelude::*;
use serde_json::json;

use common::{app, contact, send, store, ADMIN, CLERK, OUTSIDER};
use mvj::credit_integration::{
    credit_integration_router, CreditIntegrationService, HttpCreditBureau,
};
use mvj::store::MemoryStore;

const INQUIRY: &str = "/api/v1/credit_integration/send_credit_decision_inquiry/";
const DECISIONS: &str = "/api/v1/credit_integration/get_credit_decisions/";

fn fixture(server: &MockServer) -> (Arc<MemoryStore>, Router) {
    let store = store();
    let bureau = HttpCreditBureau::new(&server.base_url(), "mvj", "secret", Duration::from_secs(5))
        .expect("client builds");
    let service = CreditIntegrationService::new(store.clone(), Arc::new(bureau));
    (store, app(credit_integration_router(Arc::new(service))))
}

#[tokio::test]
async fn business_inquiries_are_stored_for_the_matching_customer() {
    let server = MockServer::start_async().await;
    let bureau = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/business")
                .header("authorization", "Basic bXZqOnNlY3JldA==")
                .json_body(json!({ "business_id": "1234567-8" }));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "status": "consent",
                    "reasons": [],
                    "company": { "official_name": "Rakennus Oy", "industry_code": "41200" },
                }));
        })
        .await;
    let (store, app) = fixture(&server);
    let customer = contact(
        &store,
        json!({ "type": "business", "name": "Rakennus Oy", "business_id": "1234567-8" }),
    );

    let refused = send(
        &app,
        Method::POST,
        INQUIRY,
        Some(CLERK),
        Some(json!({ "business_id": "1234567-8" })),
    )
    .await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);

    let inquiry = send(
        &app,
        Method::POST,
        INQUIRY,
        Some(ADMIN),
        Some(json!({ "business_id": " 1234567-8 " })),
    )
    .await;
    assert_eq!(inquiry.status, StatusCode::OK, "{}", inquiry.text);
    let decision = inquiry.json();
    assert_eq!(decision["status"], "consent");
    assert_eq!(decision["customer"], customer.id.0);
    assert_eq!(decision["claimant"], 1);
    assert_eq!(decision["original_data"]["company"]["industry_code"], "41200");
    bureau.assert_async().await;

    let listed = send(
        &app,
        Method::GET,
        &format!("{DECISIONS}?customer_id={}", customer.id),
        Some(CLERK),
        None,
    )
    .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.json()[0]["business_id"], "1234567-8");

    let forbidden = send(
        &app,
        Method::GET,
        &format!("{DECISIONS}?business_id=1234567-8"),
        Some(OUTSIDER),
        None,
    )
    .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let unfiltered = send(&app, Method::GET, DECISIONS, Some(CLERK), None).await;
    assert_eq!(unfiltered.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_inquiries_never_reach_the_bureau() {
    let server = MockServer::start_async().await;
    let bureau = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;
    let (_store, app) = fixture(&server);

    let invalid = send(
        &app,
        Method::POST,
        INQUIRY,
        Some(ADMIN),
        Some(json!({ "business_id": "123-4" })),
    )
    .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    let both = send(
        &app,
        Method::POST,
        INQUIRY,
        Some(ADMIN),
        Some(json!({ "business_id": "1234567-8", "identity_number": "010101-123N" })),
    )
    .await;
    assert_eq!(both.status, StatusCode::BAD_REQUEST);

    bureau.assert_hits_async(0).await;
}

#[tokio::test]
async fn bureau_failures_surface_as_bad_gateway() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/business");
            then.status(503);
        })
        .await;
    let (_store, app) = fixture(&server);

    let failed = send(
        &app,
        Method::POST,
        INQUIRY,
        Some(ADMIN),
        Some(json!({ "business_id": "1234567-8" })),
    )
    .await;
    assert_eq!(failed.status, StatusCode::BAD_GATEWAY);

    let stored = send(
        &app,
        Method::GET,
        &format!("{DECISIONS}?business_id=1234567-8"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(stored.json().as_array().map(Vec::len), Some(0));
}
