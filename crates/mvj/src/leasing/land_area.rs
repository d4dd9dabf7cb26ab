//! Leased land: lease areas and the addresses, plots, plan units, and
//! constructability descriptions recorded under them.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::UserId;
use crate::store::{create_nested, merge_nested, IdSource, NestedError, NestedRecord};

entity_id!(LeaseAreaId);
entity_id!(LeaseAreaAddressId);
entity_id!(PlotId);
entity_id!(PlanUnitId);
entity_id!(ConstructabilityDescriptionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseAreaType {
    PlanUnit,
    RealProperty,
    UnseparatedParcel,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Surface,
    Underground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructabilityState {
    Unverified,
    RequiresMeasures,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructabilityType {
    Preconstruction,
    Demolition,
    PollutedLand,
    Report,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    RealProperty,
    UnseparatedParcel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanUnitStatus {
    #[default]
    Present,
    Pending,
    Future,
}

/// Zero-pads Finnish property identifiers, `91-1-1-1` becoming `091-001-0001-0001`.
/// Anything else is returned unchanged.
pub fn normalize_identifier(identifier: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{1,3})-(\d{1,3})-(\d{1,4})-(\d{1,4})$").expect("static pattern compiles")
    });

    let trimmed = identifier.trim();
    match pattern.captures(trimmed) {
        Some(caps) => format!(
            "{:0>3}-{:0>3}-{:0>4}-{:0>4}",
            &caps[1], &caps[2], &caps[3], &caps[4]
        ),
        None => identifier.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseArea {
    pub id: LeaseAreaId,
    pub identifier: String,
    pub area: u32,
    pub section_area: Option<u32>,
    #[serde(rename = "type")]
    pub area_type: LeaseAreaType,
    pub location: LocationType,
    pub preconstruction_state: Option<ConstructabilityState>,
    pub demolition_state: Option<ConstructabilityState>,
    pub polluted_land_state: Option<ConstructabilityState>,
    pub constructability_report_state: Option<ConstructabilityState>,
    pub other_state: Option<ConstructabilityState>,
    pub archived_at: Option<NaiveDate>,
    pub addresses: Vec<LeaseAreaAddress>,
    pub plots: Vec<Plot>,
    pub plan_units: Vec<PlanUnit>,
    pub constructability_descriptions: Vec<ConstructabilityDescription>,
}

impl LeaseArea {
    pub fn normalized_identifier(&self) -> String {
        normalize_identifier(&self.identifier)
    }

    pub fn primary_address(&self) -> Option<&LeaseAreaAddress> {
        self.addresses.iter().find(|address| address.is_primary)
    }

    pub fn plan_unit(&self, id: PlanUnitId) -> Option<&PlanUnit> {
        self.plan_units.iter().find(|unit| unit.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeaseAreaInput {
    #[serde(default)]
    pub id: Option<LeaseAreaId>,
    pub identifier: String,
    pub area: u32,
    #[serde(default)]
    pub section_area: Option<u32>,
    #[serde(rename = "type")]
    pub area_type: LeaseAreaType,
    pub location: LocationType,
    #[serde(default)]
    pub preconstruction_state: Option<ConstructabilityState>,
    #[serde(default)]
    pub demolition_state: Option<ConstructabilityState>,
    #[serde(default)]
    pub polluted_land_state: Option<ConstructabilityState>,
    #[serde(default)]
    pub constructability_report_state: Option<ConstructabilityState>,
    #[serde(default)]
    pub other_state: Option<ConstructabilityState>,
    #[serde(default)]
    pub archived_at: Option<NaiveDate>,
    #[serde(default)]
    pub addresses: Vec<LeaseAreaAddressInput>,
    #[serde(default)]
    pub plots: Vec<PlotInput>,
    #[serde(default)]
    pub plan_units: Vec<PlanUnitInput>,
    #[serde(default)]
    pub constructability_descriptions: Vec<ConstructabilityDescriptionInput>,
}

impl NestedRecord for LeaseArea {
    type Input = LeaseAreaInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: LeaseAreaId(id),
            identifier: input.identifier,
            area: input.area,
            section_area: input.section_area,
            area_type: input.area_type,
            location: input.location,
            preconstruction_state: input.preconstruction_state,
            demolition_state: input.demolition_state,
            polluted_land_state: input.polluted_land_state,
            constructability_report_state: input.constructability_report_state,
            other_state: input.other_state,
            archived_at: input.archived_at,
            addresses: create_nested(input.addresses, ids)?,
            plots: create_nested(input.plots, ids)?,
            plan_units: create_nested(input.plan_units, ids)?,
            constructability_descriptions: create_nested(input.constructability_descriptions, ids)?,
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        self.identifier = input.identifier;
        self.area = input.area;
        self.section_area = input.section_area;
        self.area_type = input.area_type;
        self.location = input.location;
        self.preconstruction_state = input.preconstruction_state;
        self.demolition_state = input.demolition_state;
        self.polluted_land_state = input.polluted_land_state;
        self.constructability_report_state = input.constructability_report_state;
        self.other_state = input.other_state;
        self.archived_at = input.archived_at;
        self.addresses = merge_nested(
            "lease area address",
            std::mem::take(&mut self.addresses),
            input.addresses,
            ids,
        )?;
        self.plots = merge_nested("plot", std::mem::take(&mut self.plots), input.plots, ids)?;
        self.plan_units = merge_nested(
            "plan unit",
            std::mem::take(&mut self.plan_units),
            input.plan_units,
            ids,
        )?;
        self.constructability_descriptions = merge_nested(
            "constructability description",
            std::mem::take(&mut self.constructability_descriptions),
            input.constructability_descriptions,
            ids,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseAreaAddress {
    pub id: LeaseAreaAddressId,
    pub address: String,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaseAreaAddressInput {
    #[serde(default)]
    pub id: Option<LeaseAreaAddressId>,
    pub address: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl NestedRecord for LeaseAreaAddress {
    type Input = LeaseAreaAddressInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: LeaseAreaAddressId(id),
            address: input.address,
            postal_code: input.postal_code,
            city: input.city,
            is_primary: input.is_primary,
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        *self = Self::create(self.id.0, input, ids)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot {
    pub id: PlotId,
    pub identifier: String,
    pub area: u32,
    pub section_area: Option<u32>,
    #[serde(rename = "type")]
    pub plot_type: PlotType,
    pub registration_date: Option<NaiveDate>,
    pub repeal_date: Option<NaiveDate>,
    pub in_contract: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlotInput {
    #[serde(default)]
    pub id: Option<PlotId>,
    pub identifier: String,
    pub area: u32,
    #[serde(default)]
    pub section_area: Option<u32>,
    #[serde(rename = "type")]
    pub plot_type: PlotType,
    #[serde(default)]
    pub registration_date: Option<NaiveDate>,
    #[serde(default)]
    pub repeal_date: Option<NaiveDate>,
    #[serde(default)]
    pub in_contract: bool,
}

impl NestedRecord for Plot {
    type Input = PlotInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: PlotId(id),
            identifier: input.identifier,
            area: input.area,
            section_area: input.section_area,
            plot_type: input.plot_type,
            registration_date: input.registration_date,
            repeal_date: input.repeal_date,
            in_contract: input.in_contract,
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        *self = Self::create(self.id.0, input, ids)?;
        Ok(())
    }
}

/// Detailed-plan unit. Plot search targets hold non-master duplicates of master units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUnit {
    pub id: PlanUnitId,
    pub identifier: String,
    pub area: u32,
    pub section_area: Option<u32>,
    pub in_contract: bool,
    pub is_master: bool,
    pub master_timestamp: Option<DateTime<Utc>>,
    pub plot_division_identifier: Option<String>,
    pub plot_division_date_of_approval: Option<NaiveDate>,
    pub plot_division_effective_date: Option<NaiveDate>,
    pub plot_division_state: Option<String>,
    pub detailed_plan_identifier: Option<String>,
    pub detailed_plan_latest_processing_date: Option<NaiveDate>,
    pub detailed_plan_latest_processing_date_note: Option<String>,
    pub plan_unit_type: Option<String>,
    pub plan_unit_state: Option<String>,
    pub plan_unit_intended_use: Option<String>,
    pub plan_unit_status: PlanUnitStatus,
    pub modified_at: DateTime<Utc>,
}

impl PlanUnit {
    /// Non-master copy stamped with the master's modification time.
    pub fn duplicate(&self, id: PlanUnitId) -> PlanUnit {
        PlanUnit {
            id,
            is_master: false,
            master_timestamp: Some(self.modified_at),
            modified_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanUnitInput {
    #[serde(default)]
    pub id: Option<PlanUnitId>,
    pub identifier: String,
    pub area: u32,
    #[serde(default)]
    pub section_area: Option<u32>,
    #[serde(default)]
    pub in_contract: bool,
    #[serde(default)]
    pub is_master: bool,
    #[serde(default)]
    pub plot_division_identifier: Option<String>,
    #[serde(default)]
    pub plot_division_date_of_approval: Option<NaiveDate>,
    #[serde(default)]
    pub plot_division_effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub plot_division_state: Option<String>,
    #[serde(default)]
    pub detailed_plan_identifier: Option<String>,
    #[serde(default)]
    pub detailed_plan_latest_processing_date: Option<NaiveDate>,
    #[serde(default)]
    pub detailed_plan_latest_processing_date_note: Option<String>,
    #[serde(default)]
    pub plan_unit_type: Option<String>,
    #[serde(default)]
    pub plan_unit_state: Option<String>,
    #[serde(default)]
    pub plan_unit_intended_use: Option<String>,
    #[serde(default)]
    pub plan_unit_status: PlanUnitStatus,
}

impl NestedRecord for PlanUnit {
    type Input = PlanUnitInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: PlanUnitId(id),
            identifier: input.identifier,
            area: input.area,
            section_area: input.section_area,
            in_contract: input.in_contract,
            is_master: input.is_master,
            master_timestamp: None,
            plot_division_identifier: input.plot_division_identifier,
            plot_division_date_of_approval: input.plot_division_date_of_approval,
            plot_division_effective_date: input.plot_division_effective_date,
            plot_division_state: input.plot_division_state,
            detailed_plan_identifier: input.detailed_plan_identifier,
            detailed_plan_latest_processing_date: input.detailed_plan_latest_processing_date,
            detailed_plan_latest_processing_date_note: input
                .detailed_plan_latest_processing_date_note,
            plan_unit_type: input.plan_unit_type,
            plan_unit_state: input.plan_unit_state,
            plan_unit_intended_use: input.plan_unit_intended_use,
            plan_unit_status: input.plan_unit_status,
            modified_at: Utc::now(),
        })
    }

    fn apply(&mut self, input: Self::Input, ids: &dyn IdSource) -> Result<(), NestedError> {
        let master_timestamp = self.master_timestamp;
        *self = Self::create(self.id.0, input, ids)?;
        self.master_timestamp = master_timestamp;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructabilityDescription {
    pub id: ConstructabilityDescriptionId,
    #[serde(rename = "type")]
    pub description_type: ConstructabilityType,
    pub user: Option<UserId>,
    pub text: String,
    pub ahjo_reference_number: Option<String>,
    pub is_static: bool,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConstructabilityDescriptionInput {
    #[serde(default)]
    pub id: Option<ConstructabilityDescriptionId>,
    #[serde(rename = "type")]
    pub description_type: ConstructabilityType,
    /// Filled with the requesting user on creation.
    #[serde(default)]
    pub user: Option<UserId>,
    pub text: String,
    #[serde(default)]
    pub ahjo_reference_number: Option<String>,
    #[serde(default)]
    pub is_static: bool,
}

impl NestedRecord for ConstructabilityDescription {
    type Input = ConstructabilityDescriptionInput;

    fn record_id(&self) -> u64 {
        self.id.0
    }

    fn input_id(input: &Self::Input) -> Option<u64> {
        input.id.map(|id| id.0)
    }

    fn create(id: u64, input: Self::Input, _ids: &dyn IdSource) -> Result<Self, NestedError> {
        Ok(Self {
            id: ConstructabilityDescriptionId(id),
            description_type: input.description_type,
            user: input.user,
            text: input.text,
            ahjo_reference_number: input.ahjo_reference_number,
            is_static: input.is_static,
            modified_at: Utc::now(),
        })
    }

    fn apply(&mut self, input: Self::Input, _ids: &dyn IdSource) -> Result<(), NestedError> {
        self.description_type = input.description_type;
        self.text = input.text;
        self.ahjo_reference_number = input.ahjo_reference_number;
        self.is_static = input.is_static;
        self.modified_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::nested::tests::Counter;

    #[test]
    fn normalizes_property_identifiers() {
        assert_eq!(normalize_identifier("91-1-1-1"), "091-001-0001-0001");
        assert_eq!(normalize_identifier("091-001-0001-0001"), "091-001-0001-0001");
        assert_eq!(normalize_identifier("91-12-345-6"), "091-012-0345-0006");
        assert_eq!(normalize_identifier("M601"), "M601");
        assert_eq!(normalize_identifier("91-1-1"), "91-1-1");
    }

    #[test]
    fn duplicate_is_non_master_and_stamped() {
        let master = PlanUnit::create(
            1,
            PlanUnitInput {
                id: None,
                identifier: "91-1-30-1".to_string(),
                area: 1000,
                section_area: None,
                in_contract: true,
                is_master: true,
                plot_division_identifier: None,
                plot_division_date_of_approval: None,
                plot_division_effective_date: None,
                plot_division_state: None,
                detailed_plan_identifier: Some("1234".to_string()),
                detailed_plan_latest_processing_date: None,
                detailed_plan_latest_processing_date_note: None,
                plan_unit_type: None,
                plan_unit_state: None,
                plan_unit_intended_use: None,
                plan_unit_status: PlanUnitStatus::Present,
            },
            &Counter::starting_at(1),
        )
        .expect("plan unit builds");

        let copy = master.duplicate(PlanUnitId(2));
        assert!(!copy.is_master);
        assert_eq!(copy.master_timestamp, Some(master.modified_at));
        assert_eq!(copy.identifier, master.identifier);
        assert_eq!(copy.detailed_plan_identifier.as_deref(), Some("1234"));
    }

    #[test]
    fn nested_children_are_created_with_fresh_ids() {
        let ids = Counter::starting_at(10);
        let area = LeaseArea::create(
            10,
            LeaseAreaInput {
                id: None,
                identifier: "91-1-1-1".to_string(),
                area: 500,
                section_area: None,
                area_type: LeaseAreaType::RealProperty,
                location: LocationType::Surface,
                preconstruction_state: None,
                demolition_state: None,
                polluted_land_state: None,
                constructability_report_state: None,
                other_state: None,
                archived_at: None,
                addresses: vec![LeaseAreaAddressInput {
                    id: None,
                    address: "Fleminginkatu 1".to_string(),
                    postal_code: Some("00530".to_string()),
                    city: Some("Helsinki".to_string()),
                    is_primary: true,
                }],
                plots: Vec::new(),
                plan_units: Vec::new(),
                constructability_descriptions: Vec::new(),
            },
            &ids,
        )
        .expect("lease area builds");

        assert_eq!(area.addresses[0].id, LeaseAreaAddressId(11));
        assert_eq!(area.normalized_identifier(), "091-001-0001-0001");
        assert_eq!(
            area.primary_address().map(|address| address.address.as_str()),
            Some("Fleminginkatu 1")
        );
    }
}
