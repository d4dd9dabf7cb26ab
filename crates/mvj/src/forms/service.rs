use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{User, UserId};
use crate::store::{IdSource, RepositoryError};

use super::answer::{Answer, AnswerDraft, AnswerId, Attachment, AttachmentDraft, AttachmentId};
use super::domain::{FieldType, FieldTypeId, Form, FormId, FormInput, SectionInput};
use super::identifier::{generate_unique_identifier, IDENTIFIER_MAX_LENGTH};
use super::repository::FormRepository;
use super::FormError;

/// Forms, answers, and attachments.
pub struct FormService<R> {
    repository: Arc<R>,
}

impl<R> FormService<R>
where
    R: FormRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    fn ids(&self) -> &dyn IdSource {
        self.repository.as_ref()
    }

    pub fn forms(&self, is_template: Option<bool>) -> Result<Vec<Form>, FormError> {
        let mut forms: Vec<Form> = self
            .repository
            .forms()?
            .into_iter()
            .filter(|form| is_template.map_or(true, |wanted| form.is_template == wanted))
            .collect();
        forms.sort_by_key(|form| form.id);
        Ok(forms)
    }

    pub fn form(&self, id: FormId) -> Result<Form, FormError> {
        self.repository
            .form(id)?
            .ok_or_else(|| RepositoryError::not_found("form", id.0).into())
    }

    /// Stores a new form; forms enter the system this way from seeding and template cloning.
    pub fn create_form(&self, input: FormInput) -> Result<Form, FormError> {
        self.validate_field_types(&input.sections)?;
        let form = Form::create(FormId(self.ids().next_id()), input, self.ids())?;
        let stored = self.repository.insert_form(form)?;
        info!(form_id = %stored.id, template = stored.is_template, "form created");
        Ok(stored)
    }

    pub fn update_form(&self, id: FormId, input: FormInput) -> Result<Form, FormError> {
        self.validate_field_types(&input.sections)?;
        let mut form = self.form(id)?;
        form.apply(input, self.ids())?;
        let stored = self.repository.update_form(form)?;
        info!(form_id = %id, "form updated");
        Ok(stored)
    }

    pub fn delete_form(&self, id: FormId) -> Result<(), FormError> {
        let form = self.form(id)?;
        if form.is_template {
            warn!(form_id = %id, "refusing to delete template form");
            return Err(FormError::TemplateProtected(id));
        }
        self.repository
            .delete_form(id)
            .inspect_err(|err| warn!(form_id = %id, error = %err, "form deletion rejected"))?;
        info!(form_id = %id, "form deleted");
        Ok(())
    }

    pub fn clone_template(&self, id: FormId) -> Result<Form, FormError> {
        let copy = self.form(id)?.clone_template(self.ids())?;
        let stored = self.repository.insert_form(copy)?;
        info!(template_id = %id, form_id = %stored.id, "template cloned");
        Ok(stored)
    }

    pub fn field_types(&self) -> Result<Vec<FieldType>, FormError> {
        Ok(self.repository.field_types()?)
    }

    /// Field type identifiers are unique across every field type.
    pub fn create_field_type(&self, name: &str) -> Result<FieldType, FormError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FormError::BlankFieldTypeName);
        }
        let taken: HashSet<String> = self
            .repository
            .field_types()?
            .into_iter()
            .map(|field_type| field_type.identifier)
            .collect();
        let field_type = FieldType {
            id: FieldTypeId(self.ids().next_id()),
            name: name.to_string(),
            identifier: generate_unique_identifier(name, IDENTIFIER_MAX_LENGTH, |candidate| {
                taken.contains(candidate)
            }),
        };
        let stored = self.repository.insert_field_type(field_type)?;
        info!(field_type_id = %stored.id, identifier = %stored.identifier, "field type created");
        Ok(stored)
    }

    pub fn answers(&self) -> Result<Vec<Answer>, FormError> {
        let mut answers = self.repository.answers()?;
        answers.sort_by_key(|answer| answer.id);
        Ok(answers)
    }

    pub fn answer(&self, id: AnswerId) -> Result<Answer, FormError> {
        self.repository
            .answer(id)?
            .ok_or_else(|| RepositoryError::not_found("answer", id.0).into())
    }

    pub fn submit_answer(&self, user: &User, draft: AnswerDraft) -> Result<Answer, FormError> {
        let form = self.form(draft.form)?;
        form.validate_answer(&draft.entry_sections)
            .inspect_err(|err| warn!(form_id = %form.id, error = %err, "answer rejected"))?;

        for id in &draft.attachments {
            let usable = self
                .repository
                .attachment(*id)?
                .is_some_and(|attachment| attachment.user == user.id && attachment.answer.is_none());
            if !usable {
                return Err(FormError::AttachmentUnavailable(*id));
            }
        }

        let attachments = draft.attachments.clone();
        let answer = Answer::create(AnswerId(self.ids().next_id()), user.id, draft);
        let stored = self.repository.insert_answer(answer, &attachments)?;
        info!(answer_id = %stored.id, form_id = %stored.form, user_id = %user.id, "answer submitted");
        Ok(stored)
    }

    /// Attachments bound to `answer`.
    pub fn answer_attachments(&self, answer: AnswerId) -> Result<Vec<Attachment>, FormError> {
        self.answer(answer)?;
        Ok(self
            .repository
            .attachments()?
            .into_iter()
            .filter(|attachment| attachment.answer == Some(answer))
            .collect())
    }

    /// Attachments visible to `owner` (all of them when `None`) not yet bound to an answer.
    pub fn pending_attachments(&self, owner: Option<UserId>) -> Result<Vec<Attachment>, FormError> {
        let mut attachments: Vec<Attachment> = self
            .repository
            .attachments()?
            .into_iter()
            .filter(|attachment| attachment.answer.is_none())
            .filter(|attachment| owner.map_or(true, |user| attachment.user == user))
            .collect();
        attachments.sort_by_key(|attachment| attachment.id);
        Ok(attachments)
    }

    pub fn attachment(
        &self,
        id: AttachmentId,
        owner: Option<UserId>,
    ) -> Result<Attachment, FormError> {
        self.repository
            .attachment(id)?
            .filter(|attachment| owner.map_or(true, |user| attachment.user == user))
            .ok_or_else(|| RepositoryError::not_found("attachment", id.0).into())
    }

    pub fn add_attachment(
        &self,
        user: &User,
        draft: AttachmentDraft,
    ) -> Result<Attachment, FormError> {
        let known = self
            .repository
            .forms()?
            .iter()
            .any(|form| form.field(draft.field).is_some());
        if !known {
            return Err(FormError::UnknownField(draft.field));
        }
        let attachment = Attachment {
            id: AttachmentId(self.ids().next_id()),
            path: Attachment::upload_path(draft.field, &user.username, &draft.name),
            name: draft.name,
            field: draft.field,
            answer: None,
            user: user.id,
            created_at: Utc::now(),
        };
        let stored = self.repository.insert_attachment(attachment)?;
        info!(attachment_id = %stored.id, field_id = %stored.field, "attachment stored");
        Ok(stored)
    }

    pub fn delete_attachment(
        &self,
        id: AttachmentId,
        owner: Option<UserId>,
    ) -> Result<(), FormError> {
        self.attachment(id, owner)?;
        self.repository.delete_attachment(id)?;
        info!(attachment_id = %id, "attachment deleted");
        Ok(())
    }

    fn validate_field_types(&self, sections: &[SectionInput]) -> Result<(), FormError> {
        let known: HashSet<FieldTypeId> = self
            .repository
            .field_types()?
            .into_iter()
            .map(|field_type| field_type.id)
            .collect();
        check_field_types(sections, &known)
    }
}

fn check_field_types(
    sections: &[SectionInput],
    known: &HashSet<FieldTypeId>,
) -> Result<(), FormError> {
    for section in sections {
        if let Some(field) = section
            .fields
            .iter()
            .find(|field| !known.contains(&field.field_type))
        {
            return Err(FormError::UnknownFieldType(field.field_type));
        }
        check_field_types(&section.subsections, known)?;
    }
    Ok(())
}
