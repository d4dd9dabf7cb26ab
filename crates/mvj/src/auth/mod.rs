//! Request authentication and permission checks.
//!
//! Users carry Django-style permission codenames (`{app}.{action}_{model}`); superusers
//! implicitly hold every permission. Requests authenticate with an
//! `Authorization: Token <token>` (or `Bearer`) header resolved through the
//! [`UserDirectory`] installed as a request extension.

pub mod field_permissions;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{ApiError, Page};

pub use field_permissions::{FieldPermissions, ModelKey};

entity_id!(
    /// Identifier for an authenticated user.
    UserId
);

/// Account known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl User {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            is_superuser: false,
            permissions: BTreeSet::new(),
        }
    }

    pub fn superuser(id: u64, username: impl Into<String>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(id, username)
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn has_perm(&self, permission: &str) -> bool {
        self.is_superuser || self.permissions.contains(permission)
    }

    /// Public summary used when a user is embedded in another record.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Model-level action, mirroring the codename prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    pub const fn prefix(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
        }
    }
}

/// `{app}.{action}_{model}`
pub fn model_permission(app: &str, action: Action, model: &str) -> String {
    format!("{app}.{}_{model}", action.prefix())
}

/// Token-to-user lookup table.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: RwLock<HashMap<UserId, User>>,
    tokens: RwLock<HashMap<String, UserId>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User, token: impl Into<String>) {
        let id = user.id;
        if let Ok(mut users) = self.users.write() {
            users.insert(id, user);
        }
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.into(), id);
        }
    }

    pub fn by_token(&self, token: &str) -> Option<User> {
        let id = *self.tokens.read().ok()?.get(token)?;
        self.get(id)
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.read().ok()?.get(&id).cloned()
    }

    pub fn all(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .read()
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default();
        users.sort_by_key(|user| user.id);
        users
    }
}

/// The caller of the current request, anonymous when no credentials were sent.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    user: Option<User>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_superuser(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_superuser)
    }

    pub fn has_perm(&self, permission: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.has_perm(permission))
    }

    pub fn require_user(&self) -> Result<&User, ApiError> {
        self.user.as_ref().ok_or(ApiError::Unauthenticated)
    }

    pub fn require_perm(&self, permission: &str) -> Result<&User, ApiError> {
        let user = self.require_user()?;
        if user.has_perm(permission) {
            Ok(user)
        } else {
            Err(ApiError::Forbidden(format!(
                "missing permission {permission}"
            )))
        }
    }

    pub fn require_model_perm(
        &self,
        app: &str,
        action: Action,
        model: &str,
    ) -> Result<&User, ApiError> {
        self.require_perm(&model_permission(app, action, model))
    }

    /// Reads are open to everybody; writes need the model permission.
    pub fn require_model_perm_or_anon_read(
        &self,
        app: &str,
        action: Action,
        model: &str,
    ) -> Result<(), ApiError> {
        if action == Action::View {
            return Ok(());
        }
        self.require_model_perm(app, action, model).map(|_| ())
    }

    /// Serializes `value` without the fields of `key` this caller may not view.
    pub fn visible<T: Serialize>(&self, key: ModelKey, value: &T) -> Result<Value, ApiError> {
        let mut json =
            serde_json::to_value(value).map_err(|err| ApiError::Internal(err.to_string()))?;
        field_permissions::registry().filter_output(self.user(), key, &mut json);
        Ok(json)
    }

    /// Like [`Principal::visible`] for the results of a list page.
    pub fn visible_page<T: Serialize>(
        &self,
        key: ModelKey,
        page: &Page<T>,
    ) -> Result<Value, ApiError> {
        let mut json =
            serde_json::to_value(page).map_err(|err| ApiError::Internal(err.to_string()))?;
        if let Some(results) = json.get_mut("results") {
            field_permissions::registry().filter_output(self.user(), key, results);
        }
        Ok(json)
    }

    /// Drops the input fields of `key` this caller may not change.
    pub fn writable(&self, key: ModelKey, mut body: Value) -> Value {
        field_permissions::registry().filter_input(self.user(), key, &mut body);
        body
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Principal::anonymous());
        };

        let token = header
            .to_str()
            .ok()
            .and_then(extract_token)
            .ok_or(ApiError::Unauthenticated)?;

        let directory = parts
            .extensions
            .get::<Arc<UserDirectory>>()
            .ok_or_else(|| ApiError::Internal("user directory not configured".to_string()))?;

        directory
            .by_token(token)
            .map(Principal::authenticated)
            .ok_or(ApiError::Unauthenticated)
    }
}

fn extract_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(token)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn directory() -> Arc<UserDirectory> {
        let directory = UserDirectory::new();
        directory.insert(
            User::new(1, "clerk").with_permissions(["credit_integration.view_creditdecision"]),
            "clerk-token",
        );
        directory.insert(User::superuser(2, "admin"), "admin-token");
        Arc::new(directory)
    }

    async fn principal_for(header: Option<&str>) -> Result<Principal, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let request = builder.body(()).expect("request builds");
        let (mut parts, _) = request.into_parts();
        parts.extensions.insert(directory());
        Principal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let principal = principal_for(None).await.expect("anonymous allowed");
        assert!(!principal.is_authenticated());
        assert!(matches!(
            principal.require_user(),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn resolves_token_and_bearer_schemes() {
        let clerk = principal_for(Some("Token clerk-token"))
            .await
            .expect("token resolves");
        assert!(clerk.has_perm("credit_integration.view_creditdecision"));
        assert!(!clerk.has_perm("credit_integration.send_creditdecision_inquiry"));

        let admin = principal_for(Some("Bearer admin-token"))
            .await
            .expect("bearer resolves");
        assert!(admin.is_superuser());
        assert!(admin.has_perm("anything.at_all"));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        assert!(matches!(
            principal_for(Some("Token nope")).await,
            Err(ApiError::Unauthenticated)
        ));
        assert!(matches!(
            principal_for(Some("Basic Zm9vOmJhcg==")).await,
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn visible_pages_filter_each_result() {
        let viewer = Principal::authenticated(
            User::new(3, "viewer").with_permissions(["leasing.view_planunit_identifier"]),
        );
        let page = Page {
            count: 1,
            next: None,
            previous: None,
            results: vec![serde_json::json!({"id": 4, "identifier": "91-1-1-1", "area": 120})],
        };
        let json = viewer
            .visible_page(field_permissions::PLAN_UNIT, &page)
            .expect("serializes");
        assert_eq!(
            json["results"],
            serde_json::json!([{"id": 4, "identifier": "91-1-1-1"}])
        );
        assert_eq!(json["count"], 1);
    }

    #[test]
    fn anonymous_reads_are_allowed_but_writes_are_not() {
        let principal = Principal::anonymous();
        assert!(principal
            .require_model_perm_or_anon_read("forms", Action::View, "form")
            .is_ok());
        assert!(matches!(
            principal.require_model_perm_or_anon_read("forms", Action::Change, "form"),
            Err(ApiError::Unauthenticated)
        ));

        let clerk = Principal::authenticated(User::new(5, "clerk"));
        assert!(matches!(
            clerk.require_model_perm("forms", Action::Delete, "form"),
            Err(ApiError::Forbidden(_))
        ));
    }
}
