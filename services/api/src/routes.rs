use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use mvj::credit_integration::{credit_integration_router, CreditBureau, CreditIntegrationService};
use mvj::forms::{form_router, FormService};
use mvj::leasing::invoice::{invoice_router, InvoiceService};
use mvj::leasing::report::{report_router, ReportService};
use mvj::leasing::{leasing_router, LeasingService};
use mvj::plotsearch::{plot_search_router, PlotSearchService};
use mvj::store::MemoryStore;
use serde::Serialize;
use std::sync::Arc;

/// Every domain router over one shared store.
pub(crate) fn api_routes(store: Arc<MemoryStore>, bureau: Arc<dyn CreditBureau>) -> Router {
    Router::new()
        .merge(leasing_router(Arc::new(LeasingService::new(store.clone()))))
        .merge(invoice_router(Arc::new(InvoiceService::new(store.clone()))))
        .merge(report_router(Arc::new(ReportService::new(store.clone()))))
        .merge(form_router(Arc::new(FormService::new(store.clone()))))
        .merge(plot_search_router(Arc::new(PlotSearchService::new(
            store.clone(),
        ))))
        .merge(credit_integration_router(Arc::new(
            CreditIntegrationService::new(store, bureau),
        )))
}

pub(crate) fn with_operational_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ServiceStatus {
    Ok,
    Ready,
    Initializing,
}

/// Body of the probe endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct StatusBody {
    status: ServiceStatus,
}

fn status_body(status: ServiceStatus) -> Json<StatusBody> {
    Json(StatusBody { status })
}

pub(crate) async fn healthcheck() -> Json<StatusBody> {
    status_body(ServiceStatus::Ok)
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let (code, status) = if ready {
        (StatusCode::OK, ServiceStatus::Ready)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, ServiceStatus::Initializing)
    };

    (code, status_body(status))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{demo_users, seed_demo};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use mvj::credit_integration::MockCreditBureau;
    use mvj::http::PageDefaults;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> Router {
        let store = Arc::new(MemoryStore::new());
        seed_demo(
            &store,
            NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date"),
        )
        .expect("demo seeds");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_operational_routes(api_routes(store, Arc::new(MockCreditBureau)))
            .layer(Extension(state))
            .layer(Extension(Arc::new(demo_users())))
            .layer(Extension(PageDefaults(10)))
    }

    async fn get_json(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let response = app
            .oneshot(request.body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let (status, body) = get_json(app(false), "/ready", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");

        let (status, body) = get_json(app(true), "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");

        let (status, body) = get_json(app(false), "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn domain_routes_share_the_seeded_store() {
        let (status, body) = get_json(app(true), "/api/v1/invoices/", Some("demo-viewer-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let (status, _) = get_json(app(true), "/api/v1/invoices/", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn metrics_render_as_prometheus_text() {
        let response = app(true)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }
}
