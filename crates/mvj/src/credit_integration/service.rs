use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::User;
use crate::leasing::domain::ContactId;
use crate::leasing::repository::LeasingRepository;
use crate::store::IdSource;

use super::bureau::CreditBureau;
use super::domain::{
    is_business_id, CreditDecision, CreditDecisionId, CreditDecisionLog, CreditDecisionLogId,
    PersonDecision,
};
use super::repository::CreditIntegrationRepository;
use super::CreditIntegrationError;

/// Which stored decisions to return.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionQuery {
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<ContactId>,
}

/// Body of an inquiry: exactly one of the identifications.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InquiryRequest {
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub identity_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InquiryOutcome {
    Business(CreditDecision),
    Person(PersonDecision),
}

pub struct CreditIntegrationService<R> {
    repository: Arc<R>,
    bureau: Arc<dyn CreditBureau>,
}

impl<R> CreditIntegrationService<R>
where
    R: CreditIntegrationRepository + LeasingRepository + 'static,
{
    pub fn new(repository: Arc<R>, bureau: Arc<dyn CreditBureau>) -> Self {
        Self { repository, bureau }
    }

    fn ids(&self) -> &dyn IdSource {
        self.repository.as_ref()
    }

    /// Stored decisions for a business id or a customer, newest first.
    pub fn decisions(
        &self,
        query: &DecisionQuery,
    ) -> Result<Vec<CreditDecision>, CreditIntegrationError> {
        if query.business_id.is_none() && query.customer_id.is_none() {
            return Err(CreditIntegrationError::MissingFilter);
        }
        let mut decisions: Vec<CreditDecision> = self
            .repository
            .credit_decisions()?
            .into_iter()
            .filter(|decision| {
                query
                    .business_id
                    .as_deref()
                    .map_or(true, |wanted| decision.business_id == wanted)
                    && query
                        .customer_id
                        .map_or(true, |wanted| decision.customer == Some(wanted))
            })
            .collect();
        decisions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(decisions)
    }

    pub async fn send_inquiry(
        &self,
        user: &User,
        request: InquiryRequest,
    ) -> Result<InquiryOutcome, CreditIntegrationError> {
        match (request.business_id, request.identity_number) {
            (Some(business_id), None) => self
                .business_inquiry(user, business_id.trim())
                .await
                .map(InquiryOutcome::Business),
            (None, Some(identity_number)) => self
                .person_inquiry(user, identity_number.trim())
                .await
                .map(InquiryOutcome::Person),
            _ => Err(CreditIntegrationError::MissingIdentification),
        }
    }

    async fn business_inquiry(
        &self,
        user: &User,
        business_id: &str,
    ) -> Result<CreditDecision, CreditIntegrationError> {
        if !is_business_id(business_id) {
            return Err(CreditIntegrationError::InvalidBusinessId(
                business_id.to_string(),
            ));
        }

        let report = self
            .bureau
            .business_decision(business_id)
            .await
            .inspect_err(|err| warn!(%business_id, error = %err, "credit bureau inquiry failed"))?;

        let customer = self
            .repository
            .contacts()?
            .into_iter()
            .find(|contact| contact.business_id.as_deref() == Some(business_id))
            .map(|contact| contact.id);

        let company = report.company;
        let decision = CreditDecision {
            id: CreditDecisionId(self.ids().next_id()),
            customer,
            business_id: business_id.to_string(),
            official_name: company.official_name,
            address: company.address,
            phone_number: company.phone_number,
            business_entity: company.business_entity,
            operation_start_date: company.operation_start_date,
            industry_code: company.industry_code,
            status: report.status,
            reasons: report.reasons,
            claimant: user.id,
            created_at: Utc::now(),
            original_data: report.raw,
        };
        let stored = self.repository.insert_credit_decision(decision)?;
        self.log(user, business_id, "Business credit decision inquiry")?;
        info!(
            decision_id = %stored.id,
            %business_id,
            status = ?stored.status,
            claimant = %user.id,
            "credit decision stored"
        );
        Ok(stored)
    }

    async fn person_inquiry(
        &self,
        user: &User,
        identity_number: &str,
    ) -> Result<PersonDecision, CreditIntegrationError> {
        if identity_number.is_empty() {
            return Err(CreditIntegrationError::MissingIdentification);
        }
        let report = self
            .bureau
            .person_decision(identity_number)
            .await
            .inspect_err(|err| warn!(error = %err, "credit bureau person inquiry failed"))?;
        self.log(user, identity_number, "Person credit decision inquiry")?;
        info!(claimant = %user.id, status = ?report.status, "person credit inquiry answered");
        Ok(PersonDecision {
            identity_number: identity_number.to_string(),
            status: report.status,
            reasons: report.reasons,
        })
    }

    fn log(
        &self,
        user: &User,
        identification: &str,
        text: &str,
    ) -> Result<CreditDecisionLog, CreditIntegrationError> {
        let log = CreditDecisionLog {
            id: CreditDecisionLogId(self.ids().next_id()),
            identification: identification.to_string(),
            user: user.id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        Ok(self.repository.insert_credit_decision_log(log)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit_integration::bureau::MockCreditBureau;
    use crate::credit_integration::domain::CreditDecisionStatus;
    use crate::leasing::domain::ContactInput;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, CreditIntegrationService<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = CreditIntegrationService::new(store.clone(), Arc::new(MockCreditBureau));
        (store, service)
    }

    fn clerk() -> User {
        User::new(7, "clerk")
    }

    fn business(id: &str) -> InquiryRequest {
        InquiryRequest {
            business_id: Some(id.to_string()),
            identity_number: None,
        }
    }

    #[tokio::test]
    async fn business_inquiry_stores_decision_and_log() {
        let (store, service) = service();
        let contact: ContactInput = serde_json::from_value(serde_json::json!({
            "type": "business",
            "name": "Testi Oy",
            "business_id": "1234567-8"
        }))
        .expect("contact input");
        let contact = store
            .insert_contact(contact.into_contact(ContactId(store.next_id())))
            .expect("contact stored");

        let outcome = service
            .send_inquiry(&clerk(), business("1234567-8"))
            .await
            .expect("inquiry succeeds");
        let InquiryOutcome::Business(decision) = outcome else {
            panic!("expected a business decision");
        };
        assert_eq!(decision.status, CreditDecisionStatus::Consent);
        assert_eq!(decision.claimant, clerk().id);
        assert_eq!(decision.customer, Some(contact.id));

        let logs = store.credit_decision_logs().expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].identification, "1234567-8");

        let by_customer = service
            .decisions(&DecisionQuery {
                business_id: None,
                customer_id: Some(contact.id),
            })
            .expect("query");
        assert_eq!(by_customer, vec![decision]);
    }

    #[tokio::test]
    async fn decisions_are_listed_newest_first() {
        let (_store, service) = service();
        for _ in 0..2 {
            service
                .send_inquiry(&clerk(), business("7654321-0"))
                .await
                .expect("inquiry succeeds");
        }
        let decisions = service
            .decisions(&DecisionQuery {
                business_id: Some("7654321-0".to_string()),
                customer_id: None,
            })
            .expect("query");
        assert_eq!(decisions.len(), 2);
        assert!(decisions[0].id > decisions[1].id);
        assert_eq!(decisions[0].status, CreditDecisionStatus::NoConsent);
    }

    #[tokio::test]
    async fn person_inquiry_is_logged_but_not_stored() {
        let (store, service) = service();
        let outcome = service
            .send_inquiry(
                &clerk(),
                InquiryRequest {
                    business_id: None,
                    identity_number: Some("010101-123N".to_string()),
                },
            )
            .await
            .expect("inquiry succeeds");
        assert!(matches!(outcome, InquiryOutcome::Person(_)));
        assert!(store.credit_decisions().expect("decisions").is_empty());
        assert_eq!(store.credit_decision_logs().expect("logs").len(), 1);
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let (store, service) = service();
        assert_eq!(
            service
                .send_inquiry(&clerk(), business("12345678"))
                .await
                .expect_err("bad id"),
            CreditIntegrationError::InvalidBusinessId("12345678".to_string())
        );
        assert_eq!(
            service
                .send_inquiry(&clerk(), InquiryRequest::default())
                .await
                .expect_err("no identification"),
            CreditIntegrationError::MissingIdentification
        );
        assert_eq!(
            service
                .decisions(&DecisionQuery::default())
                .expect_err("no filter"),
            CreditIntegrationError::MissingFilter
        );
        assert!(store.credit_decision_logs().expect("logs").is_empty());
    }
}
