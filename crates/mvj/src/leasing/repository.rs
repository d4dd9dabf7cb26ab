use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::{IdSource, RepositoryError};

use super::domain::{
    ConditionType, Contact, ContactId, DecisionMaker, Lease, LeaseId, LeaseIdentifier,
    ReceivableType, ReceivableTypeId,
};
use super::land_area::{LeaseAreaId, PlanUnit, PlanUnitId};

/// Storage for leases and the reference data they point at.
///
/// Tenants, land areas, decisions, and rents live inside their lease and change through
/// [`LeasingRepository::modify_lease`], which applies the closure to a copy and stores it
/// only when the closure succeeds.
pub trait LeasingRepository: IdSource {
    fn leases(&self) -> Result<Vec<Lease>, RepositoryError>;
    fn lease(&self, id: LeaseId) -> Result<Option<Lease>, RepositoryError>;
    fn insert_lease(&self, lease: Lease) -> Result<Lease, RepositoryError>;
    fn modify_lease<T, E, F>(&self, id: LeaseId, change: F) -> Result<T, E>
    where
        F: FnOnce(&mut Lease) -> Result<T, E>,
        E: From<RepositoryError>;
    /// Fails with `Protected` while invoices or plot search targets reference the lease.
    fn delete_lease(&self, id: LeaseId) -> Result<Lease, RepositoryError>;
    /// Fails with `Protected` while a plot search target references the plan unit.
    fn delete_plan_unit(&self, id: PlanUnitId) -> Result<PlanUnit, RepositoryError>;
    /// Next free sequence number for identifiers sharing `prefix`.
    fn next_lease_sequence(&self, prefix: &str) -> Result<u32, RepositoryError>;

    fn contacts(&self) -> Result<Vec<Contact>, RepositoryError>;
    fn contact(&self, id: ContactId) -> Result<Option<Contact>, RepositoryError>;
    fn insert_contact(&self, contact: Contact) -> Result<Contact, RepositoryError>;

    fn decision_makers(&self) -> Result<Vec<DecisionMaker>, RepositoryError>;
    fn condition_types(&self) -> Result<Vec<ConditionType>, RepositoryError>;
    fn receivable_types(&self) -> Result<Vec<ReceivableType>, RepositoryError>;
    fn bank_holidays(&self) -> Result<BTreeSet<NaiveDate>, RepositoryError>;

    fn plan_unit(&self, id: PlanUnitId) -> Result<Option<PlanUnitContext>, RepositoryError> {
        Ok(locate_plan_unit(&self.leases()?, id))
    }

    fn receivable_type(
        &self,
        id: ReceivableTypeId,
    ) -> Result<Option<ReceivableType>, RepositoryError> {
        Ok(self
            .receivable_types()?
            .into_iter()
            .find(|receivable_type| receivable_type.id == id))
    }
}

/// Plan unit together with the lease and lease area it sits under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanUnitContext {
    pub lease: LeaseId,
    pub lease_identifier: LeaseIdentifier,
    pub lease_area: LeaseAreaId,
    pub lease_area_identifier: String,
    pub lease_address: Option<String>,
    pub plan_unit: PlanUnit,
}

/// Plan-unit edits made while another record is being written under the same lock.
pub trait PlanUnitAccess {
    fn locate(&self, id: PlanUnitId) -> Option<PlanUnitContext>;
    /// Stores a non-master copy of `master`, numbered `id`, in the master's lease area.
    fn duplicate_master(
        &mut self,
        master: PlanUnitId,
        id: PlanUnitId,
    ) -> Result<PlanUnit, RepositoryError>;
    fn remove(&mut self, id: PlanUnitId) -> Option<PlanUnit>;
}

pub fn locate_plan_unit<'a>(
    leases: impl IntoIterator<Item = &'a Lease>,
    id: PlanUnitId,
) -> Option<PlanUnitContext> {
    leases.into_iter().find_map(|lease| {
        lease.lease_areas.iter().find_map(|area| {
            area.plan_unit(id).map(|unit| PlanUnitContext {
                lease: lease.id,
                lease_identifier: lease.identifier.clone(),
                lease_area: area.id,
                lease_area_identifier: area.identifier.clone(),
                lease_address: area.primary_address().map(|address| address.address.clone()),
                plan_unit: unit.clone(),
            })
        })
    })
}

/// Lease owning the plan unit, if any.
pub fn plan_unit_owner(leases: &[Lease], id: PlanUnitId) -> Option<LeaseId> {
    leases
        .iter()
        .find(|lease| {
            lease
                .lease_areas
                .iter()
                .any(|area| area.plan_unit(id).is_some())
        })
        .map(|lease| lease.id)
}
