use crate::store::{IdSource, RepositoryError};

use super::answer::{Answer, AnswerId, Attachment, AttachmentId};
use super::domain::{FieldType, Form, FormId};

/// Storage for forms, field types, answers, and attachments.
pub trait FormRepository: IdSource {
    fn forms(&self) -> Result<Vec<Form>, RepositoryError>;
    fn form(&self, id: FormId) -> Result<Option<Form>, RepositoryError>;
    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError>;
    fn update_form(&self, form: Form) -> Result<Form, RepositoryError>;
    /// Fails with `Protected` while answers or plot searches reference the form.
    fn delete_form(&self, id: FormId) -> Result<Form, RepositoryError>;

    fn field_types(&self) -> Result<Vec<FieldType>, RepositoryError>;
    fn insert_field_type(&self, field_type: FieldType) -> Result<FieldType, RepositoryError>;

    fn answers(&self) -> Result<Vec<Answer>, RepositoryError>;
    fn answer(&self, id: AnswerId) -> Result<Option<Answer>, RepositoryError>;
    /// Stores the answer and binds `attachments` to it in one step.
    fn insert_answer(
        &self,
        answer: Answer,
        attachments: &[AttachmentId],
    ) -> Result<Answer, RepositoryError>;

    fn attachments(&self) -> Result<Vec<Attachment>, RepositoryError>;
    fn insert_attachment(&self, attachment: Attachment) -> Result<Attachment, RepositoryError>;
    fn delete_attachment(&self, id: AttachmentId) -> Result<Attachment, RepositoryError>;

    fn attachment(&self, id: AttachmentId) -> Result<Option<Attachment>, RepositoryError> {
        Ok(self
            .attachments()?
            .into_iter()
            .find(|attachment| attachment.id == id))
    }
}
