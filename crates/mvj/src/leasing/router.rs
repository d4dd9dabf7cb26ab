use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::field_permissions::{LEASE_AREA, PLAN_UNIT};
use crate::auth::{Action, Principal};
use crate::http::{from_json, json_response, merge_patch, ApiError, Pagination};

use super::domain::{ContactInput, DecisionId, DecisionInput, Lease, LeaseId};
use super::land_area::{LeaseAreaId, PlanUnitId, PlanUnitInput};
use super::repository::LeasingRepository;
use super::service::{LeaseDraft, LeaseUpdate, LeasingService, PlanUnitDraft};

type SharedService<R> = State<Arc<LeasingService<R>>>;

/// Lease, lease area, plan unit, contact, and decision endpoints.
pub fn leasing_router<R>(service: Arc<LeasingService<R>>) -> Router
where
    R: LeasingRepository + 'static,
{
    Router::new()
        .route("/api/v1/leases/", get(list_leases::<R>).post(create_lease::<R>))
        .route(
            "/api/v1/leases/:id/",
            get(get_lease::<R>)
                .put(update_lease::<R>)
                .patch(update_lease::<R>)
                .delete(delete_lease::<R>),
        )
        .route("/api/v1/lease_areas/:id/", get(get_lease_area::<R>))
        .route(
            "/api/v1/plan_units/",
            get(list_plan_units::<R>).post(create_plan_unit::<R>),
        )
        .route(
            "/api/v1/plan_units/:id/",
            get(get_plan_unit::<R>)
                .patch(update_plan_unit::<R>)
                .delete(delete_plan_unit::<R>),
        )
        .route(
            "/api/v1/contacts/",
            get(list_contacts::<R>).post(create_contact::<R>),
        )
        .route(
            "/api/v1/decisions/",
            get(list_decisions::<R>).post(create_decision::<R>),
        )
        .route(
            "/api/v1/decisions/:id/",
            get(get_decision::<R>).patch(update_decision::<R>),
        )
        .with_state(service)
}

/// Lease JSON with lease area fields filtered for the caller.
fn lease_json(principal: &Principal, lease: &Lease) -> Result<Value, ApiError> {
    let mut json = serde_json::to_value(lease).map_err(|err| ApiError::Internal(err.to_string()))?;
    if let Some(areas) = json.get_mut("lease_areas") {
        *areas = principal.visible(LEASE_AREA, &*areas)?;
    }
    Ok(json)
}

fn writable_lease(principal: &Principal, mut body: Value) -> Value {
    if let Some(areas) = body.get_mut("lease_areas") {
        *areas = principal.writable(LEASE_AREA, areas.take());
    }
    body
}

#[derive(Debug, Default, Deserialize)]
struct LeaseQuery {
    identifier: Option<String>,
}

async fn list_leases<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
    Query(query): Query<LeaseQuery>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "lease")?;
    let leases: Vec<Lease> = service
        .leases()?
        .into_iter()
        .filter(|lease| {
            query
                .identifier
                .as_deref()
                .map_or(true, |needle| lease.identifier.to_string().contains(needle))
        })
        .collect();
    let page = pagination.paginate(leases)?;
    let results = page
        .results
        .iter()
        .map(|lease| lease_json(&principal, lease))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(serde_json::json!({
        "count": page.count,
        "next": page.next,
        "previous": page.previous,
        "results": results,
    }))
    .into_response())
}

async fn create_lease<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    let user = principal.require_model_perm("leasing", Action::Add, "lease")?.id;
    let draft: LeaseDraft = from_json(writable_lease(&principal, body))?;
    let lease = service.create_lease(draft, Some(user))?;
    Ok(json_response(StatusCode::CREATED, lease_json(&principal, &lease)?))
}

async fn get_lease<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<LeaseId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "lease")?;
    let lease = service.lease(id)?;
    Ok(Json(lease_json(&principal, &lease)?).into_response())
}

async fn update_lease<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<LeaseId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    let user = principal.require_model_perm("leasing", Action::Change, "lease")?.id;
    let current = service.lease(id)?;
    let update: LeaseUpdate = merge_patch(&current, writable_lease(&principal, body))?;
    let lease = service.update_lease(id, update, Some(user))?;
    Ok(Json(lease_json(&principal, &lease)?).into_response())
}

async fn delete_lease<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<LeaseId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Delete, "lease")?;
    service.delete_lease(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn get_lease_area<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<LeaseAreaId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "leasearea")?;
    let area = service.lease_area(id)?;
    Ok(Json(principal.visible(LEASE_AREA, &area)?).into_response())
}

async fn list_plan_units<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "planunit")?;
    let page = pagination.paginate(service.plan_units()?)?;
    Ok(Json(principal.visible_page(PLAN_UNIT, &page)?).into_response())
}

async fn create_plan_unit<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "planunit")?;
    let draft: PlanUnitDraft = from_json(principal.writable(PLAN_UNIT, body))?;
    let unit = service.create_plan_unit(draft)?;
    Ok(json_response(
        StatusCode::CREATED,
        principal.visible(PLAN_UNIT, &unit)?,
    ))
}

async fn get_plan_unit<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<PlanUnitId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "planunit")?;
    let unit = service.plan_unit(id)?;
    Ok(Json(principal.visible(PLAN_UNIT, &unit)?).into_response())
}

async fn update_plan_unit<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<PlanUnitId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Change, "planunit")?;
    let current = service.plan_unit(id)?;
    let input: PlanUnitInput = merge_patch(&current.plan_unit, principal.writable(PLAN_UNIT, body))?;
    let unit = service.update_plan_unit(id, input)?;
    Ok(Json(principal.visible(PLAN_UNIT, &unit)?).into_response())
}

async fn delete_plan_unit<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<PlanUnitId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Delete, "planunit")?;
    service.delete_plan_unit(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_contacts<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "contact")?;
    let page = pagination.paginate(service.contacts()?)?;
    Ok(Json(page).into_response())
}

async fn create_contact<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(input): Json<ContactInput>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "contact")?;
    let contact = service.create_contact(input)?;
    Ok(json_response(StatusCode::CREATED, contact))
}

#[derive(Debug, Default, Deserialize)]
struct DecisionQuery {
    lease: Option<LeaseId>,
}

async fn list_decisions<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
    Query(query): Query<DecisionQuery>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "decision")?;
    let page = pagination.paginate(service.decisions(query.lease)?)?;
    Ok(Json(page).into_response())
}

async fn create_decision<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(input): Json<DecisionInput>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "decision")?;
    let decision = service.create_decision(input)?;
    Ok(json_response(StatusCode::CREATED, decision))
}

async fn get_decision<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<DecisionId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "decision")?;
    Ok(Json(service.decision(id)?).into_response())
}

async fn update_decision<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<DecisionId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Change, "decision")?;
    let current = service.decision(id)?;
    let input: DecisionInput = merge_patch(&current, body)?;
    Ok(Json(service.update_decision(id, input)?).into_response())
}
