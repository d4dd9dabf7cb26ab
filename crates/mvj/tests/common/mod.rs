//! Shared fixtures for the HTTP scenarios: a seeded store, users with tokens, and a request helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::{Extension, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use mvj::auth::{User, UserDirectory};
use mvj::forms::{Form, FormInput, FormService};
use mvj::http::PageDefaults;
use mvj::leasing::domain::{Contact, ContactInput};
use mvj::leasing::service::LeaseDraft;
use mvj::leasing::{Lease, LeasingService};
use mvj::store::memory::ReferenceData;
use mvj::store::MemoryStore;

pub const ADMIN: &str = "admin-token";
pub const CLERK: &str = "clerk-token";
pub const OUTSIDER: &str = "outsider-token";

pub fn store() -> Arc<MemoryStore> {
    let reference: ReferenceData = serde_json::from_value(json!({
        "receivable_types": [
            { "id": 1, "name": "Maanvuokraus", "is_active": true },
            { "id": 2, "name": "Rahavakuus", "is_active": true },
        ],
        "condition_types": [
            { "id": 1, "name": "Rakennusvelvoite" },
            { "id": 2, "name": "Vakuus" },
        ],
        "decision_makers": [{ "id": 1, "name": "Kaupunginhallitus" }],
        "bank_holidays": ["2024-12-24", "2024-12-25", "2024-12-26"],
        "field_types": [
            { "id": 1, "name": "Text field", "identifier": "textbox" },
            { "id": 2, "name": "Checkbox", "identifier": "checkbox" },
        ],
        "plot_search_types": [{ "id": 1, "name": "Asuntotontit" }],
        "plot_search_subtypes": [{ "id": 1, "name": "Omakotitontit", "plot_search_type": 1 }],
        "plot_search_stages": [{ "id": 1, "name": "In preparation" }],
        "intended_uses": [{ "id": 1, "name": "Varastointi" }],
    }))
    .expect("reference data");
    let store = Arc::new(MemoryStore::new());
    store.seed(reference).expect("seeded");
    store
}

pub fn users() -> Arc<UserDirectory> {
    let directory = UserDirectory::new();
    directory.insert(User::superuser(1, "admin"), ADMIN);
    directory.insert(
        User::new(2, "clerk").with_permissions([
            "leasing.view_lease",
            "leasing.view_invoice",
            "leasing.view_invoicepayment",
            "plotsearch.view_plotsearch",
            "credit_integration.view_creditdecision",
        ]),
        CLERK,
    );
    directory.insert(User::new(3, "outsider"), OUTSIDER);
    Arc::new(directory)
}

/// Wraps a domain router with the extensions the server installs.
pub fn app(router: Router) -> Router {
    router
        .layer(Extension(users()))
        .layer(Extension(PageDefaults(30)))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub text: String,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Token {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    TestResponse {
        status,
        content_type,
        text: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub fn contact(store: &Arc<MemoryStore>, body: Value) -> Contact {
    let input: ContactInput = serde_json::from_value(body).expect("contact input");
    LeasingService::new(store.clone())
        .create_contact(input)
        .expect("contact created")
}

/// A lease in `A1104` with one lease area holding a single master plan unit.
pub fn lease(store: &Arc<MemoryStore>, tenants: Value) -> Lease {
    let draft: LeaseDraft = serde_json::from_value(json!({
        "type": "A1",
        "municipality": 1,
        "district": 4,
        "state": "lease",
        "start_date": "2020-01-01",
        "is_invoicing_enabled": true,
        "tenants": tenants,
        "lease_areas": [{
            "identifier": "91-4-12-3",
            "area": 1200,
            "type": "plan_unit",
            "location": "surface",
            "addresses": [{ "address": "Laivurinkatu 8", "is_primary": true }],
            "plan_units": [{
                "identifier": "91-4-12-3-P1",
                "area": 1200,
                "in_contract": true,
                "is_master": true,
            }],
        }],
    }))
    .expect("lease draft");
    LeasingService::new(store.clone())
        .create_lease(draft, None)
        .expect("lease created")
}

pub fn template_form(store: &Arc<MemoryStore>) -> Form {
    let input: FormInput = serde_json::from_value(json!({
        "name": "Hakemuslomake",
        "is_template": true,
        "title": "Hakemus",
        "sections": [{
            "title": "Hakijan tiedot",
            "fields": [
                { "type": 1, "label": "Nimi", "required": true },
                { "type": 2, "label": "Hyväksyn ehdot" },
            ],
        }],
    }))
    .expect("form input");
    FormService::new(store.clone())
        .create_form(input)
        .expect("template created")
}
