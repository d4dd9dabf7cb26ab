//! HTTP plumbing shared by the domain routers.

mod error;
mod pagination;

pub use error::ApiError;
pub use pagination::{Page, PageDefaults, Pagination, DEFAULT_PAGE_SIZE};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// JSON body with an explicit status.
pub fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

/// Parses a JSON body into `T`, reporting the serde message as a 400.
pub fn from_json<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|err| ApiError::BadRequest(err.to_string()))
}

/// Overlays the top-level keys of `patch` onto the serialized `current` and parses the
/// result, so absent keys keep their stored values.
pub fn merge_patch<C, T>(current: &C, patch: Value) -> Result<T, ApiError>
where
    C: Serialize,
    T: DeserializeOwned,
{
    let mut merged =
        serde_json::to_value(current).map_err(|err| ApiError::Internal(err.to_string()))?;
    match (&mut merged, patch) {
        (Value::Object(base), Value::Object(changes)) => base.extend(changes),
        _ => return Err(ApiError::bad_request("expected a JSON object")),
    }
    from_json(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        body: Option<String>,
    }

    #[test]
    fn patch_keeps_absent_keys() {
        let current = Note {
            title: "old".into(),
            body: Some("text".into()),
        };
        let merged: Note = merge_patch(&current, json!({"title": "new"})).expect("merges");
        assert_eq!(
            merged,
            Note {
                title: "new".into(),
                body: Some("text".into())
            }
        );

        let cleared: Note = merge_patch(&current, json!({"body": null})).expect("merges");
        assert_eq!(cleared.body, None);
    }

    #[test]
    fn patch_must_be_an_object() {
        let current = Note {
            title: "old".into(),
            body: None,
        };
        let result: Result<Note, _> = merge_patch(&current, json!([1, 2]));
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
