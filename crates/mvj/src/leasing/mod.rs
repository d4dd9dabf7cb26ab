//! Leases, their land, tenants, decisions and rents, plus invoicing and reports.

pub mod domain;
pub mod invoice;
pub mod land_area;
pub mod rent;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use domain::{
    Contact, ContactId, Decision, DecisionId, Lease, LeaseId, LeaseIdentifier, Tenant, TenantId,
};
pub use repository::{LeasingRepository, PlanUnitAccess, PlanUnitContext};
pub use router::leasing_router;
pub use service::LeasingService;

use crate::http::ApiError;
use crate::store::{NestedError, RepositoryError};

use domain::{ConditionTypeId, DecisionMakerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeasingError {
    #[error("invalid lease identifier parts: {0}")]
    InvalidIdentifier(String),
    #[error("contact {0} does not exist")]
    UnknownContact(ContactId),
    #[error("decision maker {0} does not exist")]
    UnknownDecisionMaker(DecisionMakerId),
    #[error("condition type {0} does not exist")]
    UnknownConditionType(ConditionTypeId),
    #[error("decision {0} can not be moved to another lease")]
    DecisionMoved(DecisionId),
    #[error(transparent)]
    Nested(#[from] NestedError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<LeasingError> for ApiError {
    fn from(value: LeasingError) -> Self {
        match value {
            LeasingError::Repository(err) => err.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
