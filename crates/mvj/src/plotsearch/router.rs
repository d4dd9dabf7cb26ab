use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::auth::{Action, Principal};
use crate::forms::FormRepository;
use crate::http::{from_json, json_response, merge_patch, ApiError, Pagination};
use crate::leasing::repository::LeasingRepository;

use super::domain::{AreaSearchDraft, AreaSearchId, PlotSearchId, PlotSearchInput};
use super::repository::PlotSearchRepository;
use super::service::PlotSearchService;

type SharedService<R> = State<Arc<PlotSearchService<R>>>;

/// Plot search and area search endpoints.
pub fn plot_search_router<R>(service: Arc<PlotSearchService<R>>) -> Router
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/plot_searches/",
            get(list_plot_searches::<R>).post(create_plot_search::<R>),
        )
        .route(
            "/api/v1/plot_searches/:id/",
            get(get_plot_search::<R>)
                .put(update_plot_search::<R>)
                .patch(update_plot_search::<R>)
                .delete(delete_plot_search::<R>),
        )
        .route(
            "/api/v1/area_searches/",
            get(list_area_searches::<R>).post(create_area_search::<R>),
        )
        .route("/api/v1/area_searches/:id/", get(get_area_search::<R>))
        .with_state(service)
}

async fn list_plot_searches<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::View, "plotsearch")?;
    let page = pagination.paginate(service.list()?)?;
    Ok(Json(page).into_response())
}

async fn create_plot_search<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::Add, "plotsearch")?;
    let input: PlotSearchInput = from_json(body)?;
    Ok(json_response(StatusCode::CREATED, service.create(input)?))
}

async fn get_plot_search<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<PlotSearchId>,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::View, "plotsearch")?;
    Ok(Json(service.get(id)?).into_response())
}

async fn update_plot_search<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<PlotSearchId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::Change, "plotsearch")?;
    let current = service.get(id)?;
    let input: PlotSearchInput = merge_patch(&current, body)?;
    Ok(Json(service.update(id, input)?).into_response())
}

async fn delete_plot_search<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<PlotSearchId>,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::Delete, "plotsearch")?;
    service.delete(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_area_searches<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::View, "areasearch")?;
    let page = pagination.paginate(service.area_searches()?)?;
    Ok(Json(page).into_response())
}

async fn create_area_search<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(draft): Json<AreaSearchDraft>,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    let user = principal.require_model_perm("plotsearch", Action::Add, "areasearch")?;
    let search = service.create_area_search(user, draft)?;
    Ok(json_response(StatusCode::CREATED, search))
}

async fn get_area_search<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<AreaSearchId>,
) -> Result<Response, ApiError>
where
    R: PlotSearchRepository + LeasingRepository + FormRepository + 'static,
{
    principal.require_model_perm("plotsearch", Action::View, "areasearch")?;
    Ok(Json(service.area_search(id)?).into_response())
}
