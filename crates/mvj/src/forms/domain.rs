use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{create_nested, merge_nested, IdSource, NestedError, NestedRecord};

use super::identifier::{generate_unique_identifier, IDENTIFIER_MAX_LENGTH};
use super::FormError;

entity_id!(FormId);
entity_id!(SectionId);
entity_id!(FieldId);
entity_id!(FieldTypeId);
entity_id!(ChoiceId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    #[default]
    WorkInProgress,
    ReadyToBeUsed,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    #[default]
    ShowAlways,
    ShowIfDefined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub id: FieldTypeId,
    pub name: String,
    pub identifier: String,
}

/// Body of a new field type; its identifier is derived from the name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldTypeDraft {
    pub name: String,
}

/// A questionnaire: a tree of sections holding fields and their choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub name: String,
    pub description: String,
    pub is_template: bool,
    pub state: FormState,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub form: FormId,
    pub parent: Option<SectionId>,
    pub title: String,
    pub identifier: String,
    pub visible: bool,
    pub sort_order: u32,
    pub add_new_allowed: bool,
    pub add_new_text: Option<String>,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub subsections: Vec<Section>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub section: SectionId,
    #[serde(rename = "type")]
    pub field_type: FieldTypeId,
    pub label: String,
    pub hint_text: Option<String>,
    pub identifier: String,
    pub enabled: bool,
    pub required: bool,
    pub validation: Option<String>,
    pub action: Option<String>,
    pub sort_order: u32,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub field: FieldId,
    pub text: String,
    pub value: String,
    pub action: Option<String>,
    pub has_text_input: bool,
}

fn default_true() -> bool {
    true
}

/// Writable form representation used for creation and updates.
#[derive(Debug, Clone, Deserialize)]
pub struct FormInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub state: FormState,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<SectionInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionInput {
    #[serde(default)]
    pub id: Option<SectionId>,
    pub title: String,
    /// Generated from the title when absent.
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub sort_order: u32,
    #[serde(default)]
    pub add_new_allowed: bool,
    #[serde(default)]
    pub add_new_text: Option<String>,
    #[serde(default, rename = "type")]
    pub section_type: SectionType,
    #[serde(default)]
    pub subsections: Vec<SectionInput>,
    #[serde(default)]
    pub fields: Vec<FieldInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    #[serde(default)]
    pub id: Option<FieldId>,
    #[serde(rename = "type")]
    pub field_type: FieldTypeId,
    pub label: String,
    #[serde(default)]
    pub hint_text: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub validation: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub sort_order: u32,
    #[serde(default)]
    pub choices: Vec<ChoiceInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceInput {
    #[serde(default)]
    pub id: Option<ChoiceId>,
    pub text: String,
    pub value: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub has_text_input: bool,
}

impl NestedRecord for Choice {
    type Input = ChoiceInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &ChoiceInput) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: ChoiceInput, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Choice {
            id: ChoiceId(id),
            field: FieldId(0),
            text: input.text,
            value: input.value,
            action: input.action,
            has_text_input: input.has_text_input,
        })
    }

    fn apply(&mut self, input: ChoiceInput, _ids: &dyn IdSource) -> Result<(), NestedError> {
        self.text = input.text;
        self.value = input.value;
        self.action = input.action;
        self.has_text_input = input.has_text_input;
        Ok(())
    }
}

impl NestedRecord for Field {
    type Input = FieldInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &FieldInput) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: FieldInput, ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Field {
            id: FieldId(id),
            section: SectionId(0),
            field_type: input.field_type,
            label: input.label,
            hint_text: input.hint_text,
            identifier: input.identifier.unwrap_or_default(),
            enabled: input.enabled,
            required: input.required,
            validation: input.validation,
            action: input.action,
            sort_order: input.sort_order,
            choices: create_nested(input.choices, ids)?,
        })
    }

    fn apply(&mut self, input: FieldInput, ids: &dyn IdSource) -> Result<(), NestedError> {
        self.field_type = input.field_type;
        self.label = input.label;
        self.hint_text = input.hint_text;
        if let Some(identifier) = input.identifier {
            self.identifier = identifier;
        }
        self.enabled = input.enabled;
        self.required = input.required;
        self.validation = input.validation;
        self.action = input.action;
        self.sort_order = input.sort_order;
        self.choices = merge_nested("choice", std::mem::take(&mut self.choices), input.choices, ids)?;
        Ok(())
    }
}

impl NestedRecord for Section {
    type Input = SectionInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &SectionInput) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: SectionInput, ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Section {
            id: SectionId(id),
            form: FormId(0),
            parent: None,
            title: input.title,
            identifier: input.identifier.unwrap_or_default(),
            visible: input.visible,
            sort_order: input.sort_order,
            add_new_allowed: input.add_new_allowed,
            add_new_text: input.add_new_text,
            section_type: input.section_type,
            subsections: create_nested(input.subsections, ids)?,
            fields: create_nested(input.fields, ids)?,
        })
    }

    fn apply(&mut self, input: SectionInput, ids: &dyn IdSource) -> Result<(), NestedError> {
        self.title = input.title;
        if let Some(identifier) = input.identifier {
            self.identifier = identifier;
        }
        self.visible = input.visible;
        self.sort_order = input.sort_order;
        self.add_new_allowed = input.add_new_allowed;
        self.add_new_text = input.add_new_text;
        self.section_type = input.section_type;
        self.subsections = merge_nested(
            "section",
            std::mem::take(&mut self.subsections),
            input.subsections,
            ids,
        )?;
        self.fields = merge_nested("field", std::mem::take(&mut self.fields), input.fields, ids)?;
        Ok(())
    }
}

impl Section {
    /// Top-level ancestor of `section` within `form`.
    pub fn root<'a>(form: &'a Form, section: &'a Section) -> &'a Section {
        let index: HashMap<SectionId, &Section> = form
            .all_sections()
            .into_iter()
            .map(|candidate| (candidate.id, candidate))
            .collect();
        let mut current = section;
        while let Some(parent) = current.parent.and_then(|id| index.get(&id).copied()) {
            current = parent;
        }
        current
    }

    fn collect<'a>(&'a self, into: &mut Vec<&'a Section>) {
        into.push(self);
        for child in &self.subsections {
            child.collect(into);
        }
    }

    fn renumber(&mut self, ids: &dyn IdSource) {
        self.id = SectionId(ids.next_id());
        for field in &mut self.fields {
            field.id = FieldId(ids.next_id());
            for choice in &mut field.choices {
                choice.id = ChoiceId(ids.next_id());
            }
        }
        for child in &mut self.subsections {
            child.renumber(ids);
        }
    }
}

/// Sets back-references, orders children, and assigns field identifiers per section.
fn link(
    sections: &mut [Section],
    form: FormId,
    parent: Option<SectionId>,
) -> Result<(), FormError> {
    sections.sort_by_key(|section| section.sort_order);
    for section in sections.iter_mut() {
        section.form = form;
        section.parent = parent;
        section.fields.sort_by_key(|field| field.sort_order);
        assign_identifiers(
            section
                .fields
                .iter_mut()
                .map(|Field { label, identifier, .. }| (&*label, identifier)),
        )?;
        for field in &mut section.fields {
            field.section = section.id;
            for choice in &mut field.choices {
                choice.field = field.id;
            }
        }
        link(&mut section.subsections, form, Some(section.id))?;
    }
    Ok(())
}

/// Keeps explicit identifiers, rejecting duplicates, and generates the missing ones from
/// their source text.
fn assign_identifiers<'a>(
    entries: impl Iterator<Item = (&'a String, &'a mut String)>,
) -> Result<(), FormError> {
    let entries: Vec<_> = entries.collect();
    let mut taken = HashSet::new();
    for (_, identifier) in &entries {
        if !identifier.is_empty() && !taken.insert(identifier.to_string()) {
            return Err(FormError::DuplicateIdentifier(identifier.to_string()));
        }
    }
    for (source, identifier) in entries {
        if identifier.is_empty() {
            *identifier =
                generate_unique_identifier(source, IDENTIFIER_MAX_LENGTH, |candidate| {
                    taken.contains(candidate)
                });
            taken.insert(identifier.clone());
        }
    }
    Ok(())
}

impl Form {
    pub fn create(id: FormId, input: FormInput, ids: &dyn IdSource) -> Result<Form, FormError> {
        let now = Utc::now();
        let mut form = Form {
            id,
            name: input.name,
            description: input.description,
            is_template: input.is_template,
            state: input.state,
            title: input.title,
            created_at: now,
            modified_at: now,
            sections: create_nested(input.sections, ids)?,
        };
        form.normalize()?;
        Ok(form)
    }

    pub fn apply(&mut self, input: FormInput, ids: &dyn IdSource) -> Result<(), FormError> {
        self.name = input.name;
        self.description = input.description;
        self.is_template = input.is_template;
        self.state = input.state;
        self.title = input.title;
        self.sections = merge_nested(
            "section",
            std::mem::take(&mut self.sections),
            input.sections,
            ids,
        )?;
        self.modified_at = Utc::now();
        self.normalize()
    }

    /// Every section of the tree, parents before their subsections.
    pub fn all_sections(&self) -> Vec<&Section> {
        let mut all = Vec::new();
        for section in &self.sections {
            section.collect(&mut all);
        }
        all
    }

    pub fn fields(&self) -> Vec<&Field> {
        self.all_sections()
            .into_iter()
            .flat_map(|section| section.fields.iter())
            .collect()
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields().into_iter().find(|field| field.id == id)
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.all_sections()
            .into_iter()
            .find(|section| section.id == id)
    }

    /// Deep copy of a template with fresh ids for every section, field, and choice.
    pub fn clone_template(&self, ids: &dyn IdSource) -> Result<Form, FormError> {
        if !self.is_template {
            return Err(FormError::NotATemplate(self.id));
        }
        let now = Utc::now();
        let mut copy = Form {
            id: FormId(ids.next_id()),
            is_template: false,
            created_at: now,
            modified_at: now,
            ..self.clone()
        };
        for section in &mut copy.sections {
            section.renumber(ids);
        }
        copy.normalize()?;
        Ok(copy)
    }

    fn normalize(&mut self) -> Result<(), FormError> {
        link(&mut self.sections, self.id, None)?;
        let mut flat = Vec::new();
        flatten_mut(&mut self.sections, &mut flat);
        assign_identifiers(flat.into_iter())
    }
}

/// Title and identifier slots of every section in the tree, parents first.
fn flatten_mut<'a>(sections: &'a mut [Section], into: &mut Vec<(&'a String, &'a mut String)>) {
    for section in sections {
        into.push((&section.title, &mut section.identifier));
        flatten_mut(&mut section.subsections, into);
    }
}
