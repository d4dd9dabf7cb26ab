use crate::store::{IdSource, RepositoryError};

use super::domain::{CreditDecision, CreditDecisionLog};

pub trait CreditIntegrationRepository: IdSource {
    fn credit_decisions(&self) -> Result<Vec<CreditDecision>, RepositoryError>;
    fn insert_credit_decision(
        &self,
        decision: CreditDecision,
    ) -> Result<CreditDecision, RepositoryError>;
    fn credit_decision_logs(&self) -> Result<Vec<CreditDecisionLog>, RepositoryError>;
    fn insert_credit_decision_log(
        &self,
        log: CreditDecisionLog,
    ) -> Result<CreditDecisionLog, RepositoryError>;
}
