use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Fraction;
use crate::store::{IdSource, NestedError, NestedRecord};

use super::land_area::LeaseArea;
use super::rent::Rent;

entity_id!(LeaseId);
entity_id!(ContactId);
entity_id!(TenantId);
entity_id!(TenantContactId);
entity_id!(DecisionId);
entity_id!(ConditionId);
entity_id!(ConditionTypeId);
entity_id!(DecisionMakerId);
entity_id!(ReceivableTypeId);

/// `{type}{municipality}{district:02}-{sequence}`, e.g. `A1104-12`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeaseIdentifier {
    pub type_code: String,
    pub municipality: u8,
    pub district: u8,
    pub sequence: u32,
}

impl LeaseIdentifier {
    /// Identifiers sharing a prefix draw sequence numbers from the same counter.
    pub fn prefix(&self) -> String {
        format!(
            "{}{}{:02}",
            self.type_code, self.municipality, self.district
        )
    }
}

impl fmt::Display for LeaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix(), self.sequence)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a lease identifier")]
pub struct LeaseIdentifierParseError(String);

impl FromStr for LeaseIdentifier {
    type Err = LeaseIdentifierParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || LeaseIdentifierParseError(value.to_string());
        let (prefix, sequence) = value.split_once('-').ok_or_else(invalid)?;
        if prefix.len() != 5 || !prefix.is_ascii() {
            return Err(invalid());
        }
        let (type_code, rest) = prefix.split_at(2);
        let (municipality, district) = rest.split_at(1);

        Ok(Self {
            type_code: type_code.to_string(),
            municipality: municipality.parse().map_err(|_| invalid())?,
            district: district.parse().map_err(|_| invalid())?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for LeaseIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LeaseIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    Lease,
    ShortTermLease,
    LongTermLease,
    Reservation,
    Reserve,
    Permission,
    Application,
    Transferred,
}

/// A lease with its tenants, land areas, decisions, and rents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub identifier: LeaseIdentifier,
    pub state: Option<LeaseState>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub intended_use: Option<String>,
    pub notice_period: Option<String>,
    pub is_invoicing_enabled: bool,
    pub tenants: Vec<Tenant>,
    pub lease_areas: Vec<LeaseArea>,
    pub decisions: Vec<Decision>,
    pub rents: Vec<Rent>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Lease {
    pub fn tenant(&self, id: TenantId) -> Option<&Tenant> {
        self.tenants.iter().find(|tenant| tenant.id == id)
    }

    /// Tenants holding a `Tenant` role that overlaps the period.
    pub fn tenants_for_period(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Tenant> {
        self.tenants
            .iter()
            .filter(|tenant| tenant.overlap(start, end).is_some())
            .collect()
    }

    pub fn primary_address(&self) -> Option<&str> {
        self.lease_areas
            .iter()
            .filter(|area| area.archived_at.is_none())
            .flat_map(|area| area.addresses.iter())
            .find(|address| address.is_primary)
            .map(|address| address.address.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Person,
    Business,
    Unit,
    Association,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    #[serde(rename = "type")]
    pub contact_type: ContactType,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub business_id: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Contact {
    pub fn display_name(&self) -> String {
        match self.contact_type {
            ContactType::Person => {
                let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter(|part| !part.is_empty())
                    .collect();
                parts.join(" ")
            }
            _ => self.name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContactInput {
    #[serde(rename = "type")]
    pub contact_type: ContactType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactInput {
    pub fn into_contact(self, id: ContactId) -> Contact {
        Contact {
            id,
            contact_type: self.contact_type,
            name: self.name,
            first_name: self.first_name,
            last_name: self.last_name,
            business_id: self.business_id,
            address: self.address,
            postal_code: self.postal_code,
            city: self.city,
            email: self.email,
            phone: self.phone,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantContactType {
    Tenant,
    Billing,
    Contact,
}

/// Role a contact plays for a tenant during an optional date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContact {
    pub id: TenantContactId,
    pub contact: ContactId,
    #[serde(rename = "type")]
    pub contact_type: TenantContactType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TenantContactInput {
    #[serde(default)]
    pub id: Option<TenantContactId>,
    pub contact: ContactId,
    #[serde(rename = "type")]
    pub contact_type: TenantContactType,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl NestedRecord for TenantContact {
    type Input = TenantContactInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: TenantContactId(id),
            contact: input.contact,
            contact_type: input.contact_type,
            start_date: input.start_date,
            end_date: input.end_date,
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        *self = Self::create(self.id.0, input, ids)?;
        Ok(())
    }
}

/// Holder of a share of a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub share_numerator: u32,
    pub share_denominator: u32,
    pub reference: Option<String>,
    pub contacts: Vec<TenantContact>,
}

impl Tenant {
    pub fn share(&self) -> Fraction {
        Fraction::new(
            i128::from(self.share_numerator),
            i128::from(self.share_denominator),
        )
        .unwrap_or(Fraction::ZERO)
    }

    /// Overlap between the tenant role and the period, if any.
    pub fn overlap(&self, start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.contacts
            .iter()
            .filter(|contact| contact.contact_type == TenantContactType::Tenant)
            .filter_map(|contact| overlap(contact.start_date, contact.end_date, start, end))
            .reduce(|(a_start, a_end), (b_start, b_end)| (a_start.min(b_start), a_end.max(b_end)))
    }

    /// Billing contact when one overlaps the period, else the tenant contact.
    pub fn recipient_for(&self, start: NaiveDate, end: NaiveDate) -> Option<ContactId> {
        let role = |kind: TenantContactType| {
            self.contacts
                .iter()
                .filter(|contact| contact.contact_type == kind)
                .find(|contact| overlap(contact.start_date, contact.end_date, start, end).is_some())
                .map(|contact| contact.contact)
        };
        role(TenantContactType::Billing).or_else(|| role(TenantContactType::Tenant))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TenantInput {
    #[serde(default)]
    pub id: Option<TenantId>,
    pub share_numerator: u32,
    pub share_denominator: u32,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub contacts: Vec<TenantContactInput>,
}

impl NestedRecord for Tenant {
    type Input = TenantInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, ids: &dyn IdSource) -> Result<Self, NestedError> {
        validate_share(&input)?;
        Ok(Self {
            id: TenantId(id),
            share_numerator: input.share_numerator,
            share_denominator: input.share_denominator,
            reference: input.reference,
            contacts: crate::store::create_nested(input.contacts, ids)?,
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        validate_share(&input)?;
        self.share_numerator = input.share_numerator;
        self.share_denominator = input.share_denominator;
        self.reference = input.reference;
        let contacts = std::mem::take(&mut self.contacts);
        self.contacts =
            crate::store::merge_nested("tenant contact", contacts, input.contacts, ids)?;
        Ok(())
    }
}

fn validate_share(input: &TenantInput) -> Result<(), NestedError> {
    if input.share_denominator == 0 || input.share_numerator > input.share_denominator {
        return Err(NestedError::Invalid(format!(
            "tenant share {}/{} is not a valid fraction",
            input.share_numerator, input.share_denominator
        )));
    }
    Ok(())
}

/// Overlap of an open-ended range with a closed period.
pub fn overlap(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    let from = start.map_or(period_start, |date| date.max(period_start));
    let to = end.map_or(period_end, |date| date.min(period_end));
    (from <= to).then_some((from, to))
}

/// Inclusive day count.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMaker {
    pub id: DecisionMakerId,
    pub name: String,
}

/// Administrative decision concerning a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub lease: LeaseId,
    pub reference_number: Option<String>,
    pub decision_maker: Option<DecisionMakerId>,
    pub decision_date: Option<NaiveDate>,
    pub section: Option<String>,
    #[serde(rename = "type")]
    pub decision_type: Option<String>,
    pub description: Option<String>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    #[serde(rename = "type")]
    pub condition_type: Option<ConditionTypeId>,
    pub supervision_date: Option<NaiveDate>,
    pub supervised_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConditionInput {
    #[serde(default)]
    pub id: Option<ConditionId>,
    #[serde(default, rename = "type")]
    pub condition_type: Option<ConditionTypeId>,
    #[serde(default)]
    pub supervision_date: Option<NaiveDate>,
    #[serde(default)]
    pub supervised_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NestedRecord for Condition {
    type Input = ConditionInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: ConditionId(id),
            condition_type: input.condition_type,
            supervision_date: input.supervision_date,
            supervised_date: input.supervised_date,
            description: input.description,
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        *self = Self::create(self.id.0, input, ids)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecisionInput {
    pub lease: LeaseId,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub decision_maker: Option<DecisionMakerId>,
    #[serde(default)]
    pub decision_date: Option<NaiveDate>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default, rename = "type")]
    pub decision_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionType {
    pub id: ConditionTypeId,
    pub name: String,
}

/// Billing category of an invoice row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivableType {
    pub id: ReceivableTypeId,
    pub name: String,
    pub sap_material_code: Option<String>,
    pub sap_order_item_number: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BankHoliday {
    pub day: NaiveDate,
}
