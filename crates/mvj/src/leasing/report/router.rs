use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::{Action, Principal};
use crate::http::{ApiError, Pagination};
use crate::leasing::invoice::InvoiceRepository;
use crate::leasing::repository::LeasingRepository;

use super::service::ReportService;

type SharedService<R> = State<Arc<ReportService<R>>>;

pub fn report_router<R>(service: Arc<ReportService<R>>) -> Router
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    Router::new()
        .route("/api/v1/reports/", get(list_reports::<R>))
        .route("/api/v1/reports/:slug/", get(run_report::<R>))
        .with_state(service)
}

async fn list_reports<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    principal.require_user()?;
    let page = pagination.paginate(service.list())?;
    Ok(Json(page).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct FormatQuery {
    format: Option<String>,
}

async fn run_report<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(slug): Path<String>,
    Query(query): Query<FormatQuery>,
    uri: Uri,
) -> Result<Response, ApiError>
where
    R: LeasingRepository + InvoiceRepository + 'static,
{
    let report = service.report(&slug)?;
    principal.require_model_perm("leasing", Action::View, report.permission())?;
    let output = service.run(&slug, &uri)?;

    match query.format.as_deref() {
        Some("csv") => {
            let body = output.to_csv()?;
            let disposition = format!("attachment; filename=\"{slug}.csv\"");
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response())
        }
        None | Some("json") => Ok(Json(output).into_response()),
        Some(other) => Err(ApiError::bad_request(format!(
            "unsupported report format '{other}'"
        ))),
    }
}
