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

use crate::auth::{Action, Principal, UserId};
use crate::http::{json_response, merge_patch, ApiError, Pagination};

use super::answer::{AnswerDraft, AnswerId, AttachmentDraft, AttachmentId};
use super::domain::{FieldTypeDraft, FormId, FormInput};
use super::repository::FormRepository;
use super::service::FormService;

type SharedService<R> = State<Arc<FormService<R>>>;

/// Form, answer, and attachment endpoints.
pub fn form_router<R>(service: Arc<FormService<R>>) -> Router
where
    R: FormRepository + 'static,
{
    Router::new()
        .route("/api/v1/forms/", get(list_forms::<R>))
        .route(
            "/api/v1/forms/:id/",
            get(get_form::<R>)
                .put(update_form::<R>)
                .patch(update_form::<R>)
                .delete(delete_form::<R>),
        )
        .route(
            "/api/v1/field_types/",
            get(list_field_types::<R>).post(create_field_type::<R>),
        )
        .route(
            "/api/v1/answers/",
            get(list_answers::<R>).post(create_answer::<R>),
        )
        .route("/api/v1/answers/:id/", get(get_answer::<R>))
        .route(
            "/api/v1/answers/:id/attachments/",
            get(list_answer_attachments::<R>),
        )
        .route(
            "/api/v1/attachments/",
            get(list_attachments::<R>).post(create_attachment::<R>),
        )
        .route(
            "/api/v1/attachments/:id/",
            get(get_attachment::<R>).delete(delete_attachment::<R>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
struct FormQuery {
    is_template: Option<bool>,
}

async fn list_forms<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
    Query(query): Query<FormQuery>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm_or_anon_read("forms", Action::View, "form")?;
    let page = pagination.paginate(service.forms(query.is_template)?)?;
    Ok(Json(page).into_response())
}

async fn get_form<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<FormId>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm_or_anon_read("forms", Action::View, "form")?;
    Ok(Json(service.form(id)?).into_response())
}

async fn update_form<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<FormId>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm_or_anon_read("forms", Action::Change, "form")?;
    let current = service.form(id)?;
    let input: FormInput = merge_patch(&current, body)?;
    Ok(Json(service.update_form(id, input)?).into_response())
}

async fn delete_form<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<FormId>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm_or_anon_read("forms", Action::Delete, "form")?;
    service.delete_form(id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_field_types<R>(
    State(service): SharedService<R>,
    principal: Principal,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm_or_anon_read("forms", Action::View, "fieldtype")?;
    Ok(Json(service.field_types()?).into_response())
}

async fn create_field_type<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(draft): Json<FieldTypeDraft>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm("forms", Action::Add, "fieldtype")?;
    let field_type = service.create_field_type(&draft.name)?;
    Ok(json_response(StatusCode::CREATED, field_type))
}

async fn list_answers<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm("forms", Action::View, "answer")?;
    let page = pagination.paginate(service.answers()?)?;
    Ok(Json(page).into_response())
}

async fn create_answer<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(draft): Json<AnswerDraft>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    let user = principal.require_user()?;
    let answer = service.submit_answer(user, draft)?;
    Ok(json_response(StatusCode::CREATED, answer))
}

async fn get_answer<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<AnswerId>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm("forms", Action::View, "answer")?;
    Ok(Json(service.answer(id)?).into_response())
}

async fn list_answer_attachments<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<AnswerId>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    principal.require_model_perm("forms", Action::View, "answer")?;
    Ok(Json(service.answer_attachments(id)?).into_response())
}

/// Users without `forms.view_attachment` only reach their own uploads.
fn attachment_owner(principal: &Principal) -> Result<Option<UserId>, ApiError> {
    let user = principal.require_user()?;
    if user.has_perm("forms.view_attachment") {
        Ok(None)
    } else {
        Ok(Some(user.id))
    }
}

async fn list_attachments<R>(
    State(service): SharedService<R>,
    principal: Principal,
    pagination: Pagination,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    let owner = attachment_owner(&principal)?;
    let page = pagination.paginate(service.pending_attachments(owner)?)?;
    Ok(Json(page).into_response())
}

async fn create_attachment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Json(draft): Json<AttachmentDraft>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    let user = principal.require_user()?;
    let attachment = service.add_attachment(user, draft)?;
    Ok(json_response(StatusCode::CREATED, attachment))
}

async fn get_attachment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<AttachmentId>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    let owner = attachment_owner(&principal)?;
    Ok(Json(service.attachment(id, owner)?).into_response())
}

async fn delete_attachment<R>(
    State(service): SharedService<R>,
    principal: Principal,
    Path(id): Path<AttachmentId>,
) -> Result<Response, ApiError>
where
    R: FormRepository + 'static,
{
    let owner = attachment_owner(&principal)?;
    service.delete_attachment(id, owner)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
