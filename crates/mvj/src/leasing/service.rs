use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::UserId;
use crate::store::{create_nested, merge_nested, IdSource, NestedRecord, RepositoryError};

use super::domain::{
    Condition, Contact, ContactId, ContactInput, Decision, DecisionId, DecisionInput, Lease,
    LeaseId, LeaseIdentifier, LeaseState, TenantInput,
};
use super::land_area::{LeaseArea, LeaseAreaId, LeaseAreaInput, PlanUnit, PlanUnitId, PlanUnitInput};
use super::rent::{Rent, RentInput};
use super::repository::{LeasingRepository, PlanUnitContext};
use super::LeasingError;

/// Body of `POST /leases/`; the identifier sequence is allocated by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaseDraft {
    #[serde(rename = "type")]
    pub type_code: String,
    pub municipality: u8,
    pub district: u8,
    #[serde(default)]
    pub state: Option<LeaseState>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub notice_period: Option<String>,
    #[serde(default)]
    pub is_invoicing_enabled: bool,
    #[serde(default)]
    pub tenants: Vec<TenantInput>,
    #[serde(default)]
    pub lease_areas: Vec<LeaseAreaInput>,
    #[serde(default)]
    pub rents: Vec<RentInput>,
}

/// Writable fields of a lease. Nested collections follow replace semantics.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaseUpdate {
    #[serde(default)]
    pub state: Option<LeaseState>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub notice_period: Option<String>,
    #[serde(default)]
    pub is_invoicing_enabled: bool,
    #[serde(default)]
    pub tenants: Vec<TenantInput>,
    #[serde(default)]
    pub lease_areas: Vec<LeaseAreaInput>,
    #[serde(default)]
    pub rents: Vec<RentInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseAreaView {
    pub lease: LeaseId,
    #[serde(flatten)]
    pub area: LeaseArea,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanUnitView {
    pub lease: LeaseId,
    pub lease_area: LeaseAreaId,
    #[serde(flatten)]
    pub plan_unit: PlanUnit,
}

impl From<PlanUnitContext> for PlanUnitView {
    fn from(context: PlanUnitContext) -> Self {
        Self {
            lease: context.lease,
            lease_area: context.lease_area,
            plan_unit: context.plan_unit,
        }
    }
}

/// Body of `POST /plan_units/`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanUnitDraft {
    pub lease_area: LeaseAreaId,
    #[serde(flatten)]
    pub plan_unit: PlanUnitInput,
}

/// Leases and the records kept inside them.
pub struct LeasingService<R> {
    repository: Arc<R>,
}

impl<R> LeasingService<R>
where
    R: LeasingRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    fn ids(&self) -> &dyn IdSource {
        self.repository.as_ref()
    }

    pub fn leases(&self) -> Result<Vec<Lease>, LeasingError> {
        let mut leases = self.repository.leases()?;
        leases.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(leases)
    }

    pub fn lease(&self, id: LeaseId) -> Result<Lease, LeasingError> {
        self.repository
            .lease(id)?
            .ok_or_else(|| RepositoryError::not_found("lease", id.0).into())
    }

    pub fn create_lease(
        &self,
        mut draft: LeaseDraft,
        user: Option<UserId>,
    ) -> Result<Lease, LeasingError> {
        validate_identifier_parts(&draft)?;
        self.validate_tenants(&draft.tenants)?;
        stamp_descriptions(&mut draft.lease_areas, user);

        let mut identifier = LeaseIdentifier {
            type_code: draft.type_code,
            municipality: draft.municipality,
            district: draft.district,
            sequence: 0,
        };
        identifier.sequence = self.repository.next_lease_sequence(&identifier.prefix())?;

        let now = Utc::now();
        let mut rents: Vec<Rent> = create_nested(draft.rents, self.ids())?;
        record_payable_rents(&mut rents, now.year(), self.ids());
        let lease = Lease {
            id: LeaseId(self.ids().next_id()),
            identifier,
            state: draft.state,
            start_date: draft.start_date,
            end_date: draft.end_date,
            intended_use: draft.intended_use,
            notice_period: draft.notice_period,
            is_invoicing_enabled: draft.is_invoicing_enabled,
            tenants: create_nested(draft.tenants, self.ids())?,
            lease_areas: create_nested(draft.lease_areas, self.ids())?,
            decisions: Vec::new(),
            rents,
            created_at: now,
            modified_at: now,
        };
        let stored = self.repository.insert_lease(lease)?;
        info!(lease_id = %stored.id, identifier = %stored.identifier, "lease created");
        Ok(stored)
    }

    pub fn update_lease(
        &self,
        id: LeaseId,
        mut update: LeaseUpdate,
        user: Option<UserId>,
    ) -> Result<Lease, LeasingError> {
        self.validate_tenants(&update.tenants)?;
        stamp_descriptions(&mut update.lease_areas, user);
        let ids = self.ids();

        self.repository.modify_lease(id, |lease| {
            lease.state = update.state;
            lease.start_date = update.start_date;
            lease.end_date = update.end_date;
            lease.intended_use = update.intended_use;
            lease.notice_period = update.notice_period;
            lease.is_invoicing_enabled = update.is_invoicing_enabled;
            lease.tenants = merge_nested(
                "tenant",
                std::mem::take(&mut lease.tenants),
                update.tenants,
                ids,
            )?;
            lease.lease_areas = merge_nested(
                "lease area",
                std::mem::take(&mut lease.lease_areas),
                update.lease_areas,
                ids,
            )?;
            lease.rents = merge_nested("rent", std::mem::take(&mut lease.rents), update.rents, ids)?;
            record_payable_rents(&mut lease.rents, Utc::now().year(), ids);
            Ok::<_, LeasingError>(())
        })?;
        info!(lease_id = %id, "lease updated");
        self.lease(id)
    }

    pub fn delete_lease(&self, id: LeaseId) -> Result<(), LeasingError> {
        let lease = self
            .repository
            .delete_lease(id)
            .inspect_err(|err| warn!(lease_id = %id, error = %err, "lease deletion rejected"))?;
        info!(lease_id = %id, identifier = %lease.identifier, "lease deleted");
        Ok(())
    }

    pub fn lease_area(&self, id: LeaseAreaId) -> Result<LeaseAreaView, LeasingError> {
        self.repository
            .leases()?
            .into_iter()
            .find_map(|lease| {
                let lease_id = lease.id;
                lease
                    .lease_areas
                    .into_iter()
                    .find(|area| area.id == id)
                    .map(|area| LeaseAreaView {
                        lease: lease_id,
                        area,
                    })
            })
            .ok_or_else(|| RepositoryError::not_found("lease area", id.0).into())
    }

    pub fn plan_units(&self) -> Result<Vec<PlanUnitView>, LeasingError> {
        let mut units: Vec<PlanUnitView> = self
            .repository
            .leases()?
            .into_iter()
            .flat_map(|lease| {
                let lease_id = lease.id;
                lease.lease_areas.into_iter().flat_map(move |area| {
                    let area_id = area.id;
                    area.plan_units.into_iter().map(move |plan_unit| PlanUnitView {
                        lease: lease_id,
                        lease_area: area_id,
                        plan_unit,
                    })
                })
            })
            .collect();
        units.sort_by_key(|unit| unit.plan_unit.id);
        Ok(units)
    }

    pub fn plan_unit(&self, id: PlanUnitId) -> Result<PlanUnitView, LeasingError> {
        self.repository
            .plan_unit(id)?
            .map(PlanUnitView::from)
            .ok_or_else(|| RepositoryError::not_found("plan unit", id.0).into())
    }

    pub fn create_plan_unit(&self, draft: PlanUnitDraft) -> Result<PlanUnitView, LeasingError> {
        let lease_id = self.lease_area(draft.lease_area)?.lease;
        let id = self.ids().next_id();
        let plan_unit = PlanUnit::create(id, draft.plan_unit, self.ids())?;

        self.repository.modify_lease(lease_id, |lease| {
            let area = lease
                .lease_areas
                .iter_mut()
                .find(|area| area.id == draft.lease_area)
                .ok_or_else(|| RepositoryError::not_found("lease area", draft.lease_area.0))?;
            area.plan_units.push(plan_unit);
            Ok::<_, LeasingError>(())
        })?;
        info!(plan_unit_id = id, lease_area_id = %draft.lease_area, "plan unit created");
        self.plan_unit(PlanUnitId(id))
    }

    pub fn update_plan_unit(
        &self,
        id: PlanUnitId,
        input: PlanUnitInput,
    ) -> Result<PlanUnitView, LeasingError> {
        let context = self.plan_unit(id)?;
        let ids = self.ids();
        self.repository.modify_lease(context.lease, |lease| {
            let unit = lease
                .lease_areas
                .iter_mut()
                .flat_map(|area| area.plan_units.iter_mut())
                .find(|unit| unit.id == id)
                .ok_or_else(|| RepositoryError::not_found("plan unit", id.0))?;
            unit.apply(input, ids)?;
            Ok::<_, LeasingError>(())
        })?;
        info!(plan_unit_id = %id, "plan unit updated");
        self.plan_unit(id)
    }

    pub fn delete_plan_unit(&self, id: PlanUnitId) -> Result<(), LeasingError> {
        self.repository
            .delete_plan_unit(id)
            .inspect_err(|err| warn!(plan_unit_id = %id, error = %err, "plan unit deletion rejected"))?;
        info!(plan_unit_id = %id, "plan unit deleted");
        Ok(())
    }

    pub fn contacts(&self) -> Result<Vec<Contact>, LeasingError> {
        Ok(self.repository.contacts()?)
    }

    pub fn create_contact(&self, input: ContactInput) -> Result<Contact, LeasingError> {
        let contact = input.into_contact(ContactId(self.ids().next_id()));
        let stored = self.repository.insert_contact(contact)?;
        info!(contact_id = %stored.id, "contact created");
        Ok(stored)
    }

    pub fn decisions(&self, lease: Option<LeaseId>) -> Result<Vec<Decision>, LeasingError> {
        let mut decisions: Vec<Decision> = self
            .repository
            .leases()?
            .into_iter()
            .filter(|candidate| lease.map_or(true, |id| candidate.id == id))
            .flat_map(|candidate| candidate.decisions)
            .collect();
        decisions.sort_by_key(|decision| decision.id);
        Ok(decisions)
    }

    pub fn decision(&self, id: DecisionId) -> Result<Decision, LeasingError> {
        self.decisions(None)?
            .into_iter()
            .find(|decision| decision.id == id)
            .ok_or_else(|| RepositoryError::not_found("decision", id.0).into())
    }

    pub fn create_decision(&self, input: DecisionInput) -> Result<Decision, LeasingError> {
        self.validate_decision(&input)?;
        let id = DecisionId(self.ids().next_id());
        let decision = Decision {
            id,
            lease: input.lease,
            reference_number: input.reference_number,
            decision_maker: input.decision_maker,
            decision_date: input.decision_date,
            section: input.section,
            decision_type: input.decision_type,
            description: input.description,
            conditions: create_nested::<Condition>(input.conditions, self.ids())?,
        };
        let stored = decision.clone();
        self.repository.modify_lease(input.lease, |lease| {
            lease.decisions.push(decision);
            Ok::<_, LeasingError>(())
        })?;
        info!(decision_id = %id, lease_id = %stored.lease, "decision created");
        Ok(stored)
    }

    pub fn update_decision(
        &self,
        id: DecisionId,
        input: DecisionInput,
    ) -> Result<Decision, LeasingError> {
        let current = self.decision(id)?;
        if current.lease != input.lease {
            return Err(LeasingError::DecisionMoved(id));
        }
        self.validate_decision(&input)?;
        let ids = self.ids();

        let decision = self.repository.modify_lease(current.lease, |lease| {
            let decision = lease
                .decisions
                .iter_mut()
                .find(|decision| decision.id == id)
                .ok_or_else(|| RepositoryError::not_found("decision", id.0))?;
            decision.reference_number = input.reference_number;
            decision.decision_maker = input.decision_maker;
            decision.decision_date = input.decision_date;
            decision.section = input.section;
            decision.decision_type = input.decision_type;
            decision.description = input.description;
            decision.conditions = merge_nested(
                "condition",
                std::mem::take(&mut decision.conditions),
                input.conditions,
                ids,
            )?;
            Ok::<_, LeasingError>(decision.clone())
        })?;
        info!(decision_id = %id, "decision updated");
        Ok(decision)
    }

    fn validate_tenants(&self, tenants: &[TenantInput]) -> Result<(), LeasingError> {
        for contact in tenants.iter().flat_map(|tenant| tenant.contacts.iter()) {
            if self.repository.contact(contact.contact)?.is_none() {
                return Err(LeasingError::UnknownContact(contact.contact));
            }
        }
        Ok(())
    }

    fn validate_decision(&self, input: &DecisionInput) -> Result<(), LeasingError> {
        if let Some(maker) = input.decision_maker {
            let known = self.repository.decision_makers()?;
            if !known.iter().any(|candidate| candidate.id == maker) {
                return Err(LeasingError::UnknownDecisionMaker(maker));
            }
        }
        let condition_types = self.repository.condition_types()?;
        for condition_type in input.conditions.iter().filter_map(|c| c.condition_type) {
            if !condition_types.iter().any(|known| known.id == condition_type) {
                return Err(LeasingError::UnknownConditionType(condition_type));
            }
        }
        Ok(())
    }
}

fn validate_identifier_parts(draft: &LeaseDraft) -> Result<(), LeasingError> {
    let type_ok = draft.type_code.len() == 2
        && draft
            .type_code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !type_ok || draft.municipality > 9 || draft.district > 99 {
        return Err(LeasingError::InvalidIdentifier(format!(
            "type {:?}, municipality {}, district {}",
            draft.type_code, draft.municipality, draft.district
        )));
    }
    Ok(())
}

/// New constructability descriptions are attributed to the requesting user.
fn record_payable_rents(rents: &mut [Rent], year: i32, ids: &dyn IdSource) {
    for rent in rents {
        rent.record_payable_rent(year, ids);
    }
}

fn stamp_descriptions(areas: &mut [LeaseAreaInput], user: Option<UserId>) {
    for description in areas
        .iter_mut()
        .flat_map(|area| area.constructability_descriptions.iter_mut())
        .filter(|description| description.id.is_none() && description.user.is_none())
    {
        description.user = user;
    }
}
