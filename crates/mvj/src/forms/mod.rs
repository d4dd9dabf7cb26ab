//! Dynamic forms, their answers, and uploaded attachment metadata.

pub mod answer;
pub mod domain;
pub mod identifier;
pub mod repository;
pub mod router;
pub mod service;

pub use answer::{Answer, AnswerDraft, AnswerId, Attachment, AttachmentDraft, AttachmentId};
pub use domain::{
    Field, FieldId, FieldType, FieldTypeDraft, FieldTypeId, Form, FormId, FormInput, Section,
};
pub use identifier::{generate_unique_identifier, slugify};
pub use repository::FormRepository;
pub use router::form_router;
pub use service::FormService;

use crate::http::ApiError;
use crate::store::{NestedError, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("form {0} is not a template")]
    NotATemplate(FormId),
    #[error("template form {0} can not be deleted")]
    TemplateProtected(FormId),
    #[error("field {0} does not belong to the form")]
    UnknownField(FieldId),
    #[error("field '{0}' is required")]
    MissingRequiredField(String),
    #[error("field type {0} does not exist")]
    UnknownFieldType(FieldTypeId),
    #[error("field type name must not be blank")]
    BlankFieldTypeName,
    #[error("identifier '{0}' is used more than once")]
    DuplicateIdentifier(String),
    #[error("attachment {0} is not available to this answer")]
    AttachmentUnavailable(AttachmentId),
    #[error(transparent)]
    Nested(#[from] NestedError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<FormError> for ApiError {
    fn from(value: FormError) -> Self {
        match value {
            FormError::Repository(err) => err.into(),
            FormError::TemplateProtected(_) => ApiError::Conflict(value.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
