//! Credit decisions fetched from an external credit bureau.

pub mod bureau;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;

pub use bureau::{bureau_from_config, BureauError, CreditBureau, HttpCreditBureau, MockCreditBureau};
pub use domain::{CreditDecision, CreditDecisionLog, CreditDecisionStatus};
pub use repository::CreditIntegrationRepository;
pub use router::credit_integration_router;
pub use service::CreditIntegrationService;

use crate::http::ApiError;
use crate::store::RepositoryError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreditIntegrationError {
    #[error("'{0}' is not a valid business id")]
    InvalidBusinessId(String),
    #[error("either business_id or identity_number is required")]
    MissingIdentification,
    #[error("either business_id or customer_id is required")]
    MissingFilter,
    #[error("credit bureau url is not configured")]
    BureauNotConfigured,
    #[error(transparent)]
    Bureau(#[from] BureauError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<CreditIntegrationError> for ApiError {
    fn from(value: CreditIntegrationError) -> Self {
        match value {
            CreditIntegrationError::Repository(err) => err.into(),
            CreditIntegrationError::Bureau(err) => ApiError::BadGateway(err.to_string()),
            CreditIntegrationError::BureauNotConfigured => ApiError::Internal(value.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
