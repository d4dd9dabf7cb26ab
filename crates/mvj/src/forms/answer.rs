//! Submitted answers and their attachment metadata.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::UserId;

use super::domain::{FieldId, Form, FormId};
use super::FormError;

entity_id!(AnswerId);
entity_id!(AttachmentId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub form: FormId,
    pub user: UserId,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub ready: bool,
    pub entry_sections: Vec<EntrySection>,
}

/// Entries given under one root section of the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySection {
    pub identifier: String,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub field: FieldId,
    pub value: String,
    #[serde(default)]
    pub extra_value: Option<String>,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerDraft {
    pub form: FormId,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entry_sections: Vec<EntrySection>,
    /// Attachments uploaded by the same user to bind to the new answer.
    #[serde(default)]
    pub attachments: Vec<AttachmentId>,
}

/// Metadata of an uploaded file; the bytes themselves are not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    pub field: FieldId,
    pub answer: Option<AnswerId>,
    pub user: UserId,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentDraft {
    pub name: String,
    pub field: FieldId,
}

impl Attachment {
    /// `plot_search_attachments/{field}/{username}/{name}`
    pub fn upload_path(field: FieldId, username: &str, name: &str) -> String {
        format!("plot_search_attachments/{field}/{username}/{name}")
    }
}

impl Form {
    /// Checks that every entry targets a field of this form and that each enabled
    /// required field received a non-blank value.
    pub fn validate_answer(&self, sections: &[EntrySection]) -> Result<(), FormError> {
        let fields = self.fields();
        let known: HashSet<FieldId> = fields.iter().map(|field| field.id).collect();

        let mut answered = HashSet::new();
        for entry in sections.iter().flat_map(|section| section.entries.iter()) {
            if !known.contains(&entry.field) {
                return Err(FormError::UnknownField(entry.field));
            }
            if !entry.value.trim().is_empty() {
                answered.insert(entry.field);
            }
        }

        match fields
            .iter()
            .find(|field| field.enabled && field.required && !answered.contains(&field.id))
        {
            Some(missing) => Err(FormError::MissingRequiredField(missing.identifier.clone())),
            None => Ok(()),
        }
    }
}

impl Answer {
    pub fn create(id: AnswerId, user: UserId, draft: AnswerDraft) -> Answer {
        Answer {
            id,
            form: draft.form,
            user,
            created_at: Utc::now(),
            opened_at: draft.opened_at,
            ready: draft.ready,
            entry_sections: draft.entry_sections,
        }
    }
}
