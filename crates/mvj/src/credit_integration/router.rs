use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::auth::Principal;
use crate::http::ApiError;
use crate::leasing::repository::LeasingRepository;

use super::repository::CreditIntegrationRepository;
use super::service::{CreditIntegrationService, DecisionQuery, InquiryRequest};

type SharedService<R> = State<Arc<CreditIntegrationService<R>>>;

const VIEW_PERMISSION: &str = "credit_integration.view_creditdecision";
const INQUIRY_PERMISSION: &str = "credit_integration.send_creditdecision_inquiry";

pub fn credit_integration_router<R>(service: Arc<CreditIntegrationService<R>>) -> Router
where
    R: CreditIntegrationRepository + LeasingRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/credit_integration/get_credit_decisions/",
            get(get_credit_decisions::<R>),
        )
        .route(
            "/api/v1/credit_integration/send_credit_decision_inquiry/",
            post(send_credit_decision_inquiry::<R>),
        )
        .with_state(service)
}

async fn get_credit_decisions<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Query(query): Query<DecisionQuery>,
) -> Result<Response, ApiError>
where
    R: CreditIntegrationRepository + LeasingRepository + 'static,
{
    principal.require_perm(VIEW_PERMISSION)?;
    Ok(Json(service.decisions(&query)?).into_response())
}

async fn send_credit_decision_inquiry<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(request): Json<InquiryRequest>,
) -> Result<Response, ApiError>
where
    R: CreditIntegrationRepository + LeasingRepository + 'static,
{
    let user = principal.require_perm(INQUIRY_PERMISSION)?.clone();
    let outcome = service.send_inquiry(&user, request).await?;
    Ok(Json(outcome).into_response())
}
