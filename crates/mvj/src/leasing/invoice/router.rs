use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::field_permissions::{INVOICE, INVOICE_PAYMENT};
use crate::auth::{Action, Principal};
use crate::http::{from_json, json_response, merge_patch, ApiError, Pagination};
use crate::leasing::domain::LeaseId;
use crate::leasing::repository::LeasingRepository;

use super::charge::ChargeRequest;
use super::credit::CreditRequest;
use super::domain::{InvoiceDraft, InvoiceId, InvoicePaymentId, InvoiceSetId, InvoiceUpdate};
use super::repository::InvoiceRepository;
use super::service::{
    InvoiceFilter, InvoiceService, PaymentDraft, PaymentUpdate, SetCreditRequest,
};

type SharedService<R> = State<Arc<InvoiceService<R>>>;

/// Invoice, payment, invoice set, and custom charge endpoints.
pub fn invoice_router<R>(service: Arc<InvoiceService<R>>) -> Router
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/invoices/",
            get(list_invoices::<R>).post(create_invoice::<R>),
        )
        .route(
            "/api/v1/invoices/:id/",
            get(get_invoice::<R>)
                .put(update_invoice::<R>)
                .patch(update_invoice::<R>)
                .delete(delete_invoice::<R>),
        )
        .route("/api/v1/invoices/:id/credit/", post(credit_invoice::<R>))
        .route(
            "/api/v1/invoice_sets/:id/credit/",
            post(credit_invoice_set::<R>),
        )
        .route(
            "/api/v1/invoice_sets/:id/credit_for_amount/",
            post(credit_invoice_set_for_amount::<R>),
        )
        .route(
            "/api/v1/invoice_payments/",
            get(list_payments::<R>).post(create_payment::<R>),
        )
        .route(
            "/api/v1/invoice_payments/:id/",
            get(get_payment::<R>)
                .patch(update_payment::<R>)
                .delete(delete_payment::<R>),
        )
        .route(
            "/api/v1/leases/:id/create_charge/",
            post(create_charge::<R>),
        )
        .with_state(service)
}

async fn list_invoices<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "invoice")?;
    let page = pagination.paginate(service.list(&filter)?)?;
    Ok(Json(principal.visible_page(INVOICE, &page)?).into_response())
}

async fn create_invoice<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "invoice")?;
    let draft: InvoiceDraft = from_json(principal.writable(INVOICE, body))?;
    let view = service.create(draft)?;
    Ok(json_response(
        StatusCode::CREATED,
        principal.visible(INVOICE, &view)?,
    ))
}

async fn get_invoice<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoiceId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "invoice")?;
    let view = service.get(id)?;
    Ok(Json(principal.visible(INVOICE, &view)?).into_response())
}

async fn update_invoice<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoiceId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Change, "invoice")?;
    let current = service.update_template(id)?;
    let update: InvoiceUpdate = merge_patch(&current, principal.writable(INVOICE, body))?;
    let view = service.update(id, update)?;
    Ok(Json(principal.visible(INVOICE, &view)?).into_response())
}

async fn delete_invoice<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoiceId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Delete, "invoice")?;
    service.delete(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn credit_invoice<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoiceId>,
    body: Option<Json<CreditRequest>>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "invoice")?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let note = service.credit(id, &request)?;
    Ok(json_response(
        StatusCode::CREATED,
        principal.visible(INVOICE, &note)?,
    ))
}

async fn credit_invoice_set<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoiceSetId>,
    body: Option<Json<SetCreditRequest>>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "invoice")?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    credited_set(&service, &principal, id, &request)
}

async fn credit_invoice_set_for_amount<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoiceSetId>,
    Json(request): Json<SetCreditRequest>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "invoice")?;
    if request.amount.is_none() {
        return Err(ApiError::bad_request("amount is required"));
    }
    credited_set(&service, &principal, id, &request)
}

fn credited_set<R>(
    service: &InvoiceService<R>,
    principal: &Principal,
    id: InvoiceSetId,
    request: &SetCreditRequest,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    let set = service.credit_set(id, request)?;
    let mut json =
        serde_json::to_value(&set).map_err(|err| ApiError::Internal(err.to_string()))?;
    if let Some(invoices) = json.get_mut("invoices") {
        *invoices = principal.visible(INVOICE, &*invoices)?;
    }
    Ok(json_response(StatusCode::CREATED, json))
}

async fn create_charge<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(lease): Path<LeaseId>,
    Json(request): Json<ChargeRequest>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "invoice")?;
    let invoices = service.create_charge(lease, &request)?;
    Ok(json_response(
        StatusCode::CREATED,
        principal.visible(INVOICE, &invoices)?,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct PaymentQuery {
    invoice: Option<InvoiceId>,
}

async fn list_payments<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
    Query(query): Query<PaymentQuery>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "invoicepayment")?;
    let page = pagination.paginate(service.payments(query.invoice)?)?;
    Ok(Json(principal.visible_page(INVOICE_PAYMENT, &page)?).into_response())
}

async fn create_payment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Add, "invoicepayment")?;
    let draft: PaymentDraft = from_json(principal.writable(INVOICE_PAYMENT, body))?;
    let payment = service.add_payment(draft)?;
    Ok(json_response(
        StatusCode::CREATED,
        principal.visible(INVOICE_PAYMENT, &payment)?,
    ))
}

async fn get_payment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoicePaymentId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::View, "invoicepayment")?;
    let payment = service.payment(id)?;
    Ok(Json(principal.visible(INVOICE_PAYMENT, &payment)?).into_response())
}

async fn update_payment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoicePaymentId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Change, "invoicepayment")?;
    let current = PaymentUpdate::from(&service.payment(id)?);
    let update: PaymentUpdate = merge_patch(&current, principal.writable(INVOICE_PAYMENT, body))?;
    let payment = service.update_payment(id, update)?;
    Ok(Json(principal.visible(INVOICE_PAYMENT, &payment)?).into_response())
}

async fn delete_payment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<InvoicePaymentId>,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_model_perm("leasing", Action::Delete, "invoicepayment")?;
    service.delete_payment(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
