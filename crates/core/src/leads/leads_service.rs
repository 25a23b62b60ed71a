use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};

use super::leads_model::{clamp_recent_limit, LatencyUpdate, Lead, NewLead, SubmitOutcome};
use super::leads_traits::{LeadRepositoryTrait, LeadServiceTrait};
use crate::errors::{Result, ValidationError};
use crate::events::{Publisher, SubmissionSink};

pub struct LeadService {
    repository: Arc<dyn LeadRepositoryTrait>,
    publisher: Publisher,
}

impl LeadService {
    pub fn new(repository: Arc<dyn LeadRepositoryTrait>, sink: Arc<dyn SubmissionSink>) -> Self {
        LeadService {
            repository,
            publisher: Publisher::new(sink),
        }
    }

    fn existing_for_key(&self, key: Option<&str>) -> Result<Option<Lead>> {
        match key {
            Some(key) => self.repository.find_by_idempotency_key(key),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LeadServiceTrait for LeadService {
    /// Insert, stamp the broadcast time, then publish; in that order.
    ///
    /// A failed insert returns before anything is published. A repeated
    /// idempotency key returns the earlier lead without a second broadcast.
    async fn submit(&self, new_lead: NewLead) -> Result<SubmitOutcome> {
        let new_lead = new_lead.normalized()?;
        let key = new_lead.idempotency_key.clone();

        if let Some(existing) = self.existing_for_key(key.as_deref())? {
            info!("Duplicate submission for lead {} ignored", existing.id);
            return Ok(SubmitOutcome::duplicate(existing.id));
        }

        let mut lead = match self.repository.insert_lead(new_lead).await {
            Ok(lead) => lead,
            // Lost a race against a concurrent submit with the same key.
            Err(err) if err.is_unique_violation() && key.is_some() => {
                return match self.existing_for_key(key.as_deref())? {
                    Some(existing) => Ok(SubmitOutcome::duplicate(existing.id)),
                    None => Err(err),
                };
            }
            Err(err) => return Err(err),
        };

        let broadcast_at = self.publisher.broadcast_timestamp();
        if let Err(err) = self
            .repository
            .update_broadcast_timestamp(lead.id, broadcast_at)
            .await
        {
            warn!("Failed to store broadcast time for lead {}: {}", lead.id, err);
        }
        lead.server_broadcast_at = Some(broadcast_at);

        if let Err(err) = self.publisher.publish(&lead) {
            error!("Failed to publish lead {}: {}", lead.id, err);
        }

        info!("Lead {} submitted", lead.id);
        Ok(SubmitOutcome::created(lead.id))
    }

    async fn record_latency(&self, lead_id: i64, update: LatencyUpdate) -> Result<Lead> {
        if lead_id <= 0 {
            return Err(ValidationError::InvalidLeadId(lead_id).into());
        }
        update.validate()?;
        self.repository.update_latency(lead_id, update).await
    }

    fn recent(&self, limit: Option<i64>) -> Result<Vec<Lead>> {
        self.repository.query_recent(clamp_recent_limit(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{RECENT_DEFAULT_LIMIT, RECENT_MAX_LIMIT};
    use crate::errors::{DatabaseError, Error};
    use crate::events::{now_millis, MockSubmissionSink};
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryLeadRepository {
        leads: Mutex<Vec<Lead>>,
        fail_inserts: AtomicBool,
        last_limit: Mutex<Option<i64>>,
    }

    #[async_trait]
    impl LeadRepositoryTrait for InMemoryLeadRepository {
        async fn insert_lead(&self, new_lead: NewLead) -> Result<Lead> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(DatabaseError::QueryFailed("disk full".to_string()).into());
            }
            let mut leads = self.leads.lock().unwrap();
            let lead = Lead {
                id: leads.len() as i64 + 1,
                name: new_lead.name,
                email: new_lead.email,
                message: new_lead.message,
                created_at: Utc::now().naive_utc(),
                client_submit_at: new_lead.client_submit_at,
                server_broadcast_at: None,
                submit_to_server_ms: None,
                server_to_display_ms: None,
                submit_to_display_ms: None,
                idempotency_key: new_lead.idempotency_key,
            };
            leads.push(lead.clone());
            Ok(lead)
        }

        async fn update_broadcast_timestamp(&self, lead_id: i64, broadcast_at_ms: i64) -> Result<()> {
            let mut leads = self.leads.lock().unwrap();
            let lead = leads
                .iter_mut()
                .find(|l| l.id == lead_id)
                .ok_or_else(|| DatabaseError::NotFound(lead_id.to_string()))?;
            lead.server_broadcast_at = Some(broadcast_at_ms);
            Ok(())
        }

        async fn update_latency(&self, lead_id: i64, update: LatencyUpdate) -> Result<Lead> {
            let mut leads = self.leads.lock().unwrap();
            let lead = leads
                .iter_mut()
                .find(|l| l.id == lead_id)
                .ok_or_else(|| DatabaseError::NotFound(lead_id.to_string()))?;
            if update.submit_to_server_ms.is_some() {
                lead.submit_to_server_ms = update.submit_to_server_ms;
            }
            if update.server_to_display_ms.is_some() {
                lead.server_to_display_ms = update.server_to_display_ms;
            }
            if update.submit_to_display_ms.is_some() {
                lead.submit_to_display_ms = update.submit_to_display_ms;
            }
            Ok(lead.clone())
        }

        fn query_recent(&self, limit: i64) -> Result<Vec<Lead>> {
            *self.last_limit.lock().unwrap() = Some(limit);
            let leads = self.leads.lock().unwrap();
            Ok(leads.iter().rev().take(limit as usize).cloned().collect())
        }

        fn get_lead(&self, lead_id: i64) -> Result<Option<Lead>> {
            let leads = self.leads.lock().unwrap();
            Ok(leads.iter().find(|l| l.id == lead_id).cloned())
        }

        fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>> {
            let leads = self.leads.lock().unwrap();
            Ok(leads
                .iter()
                .find(|l| l.idempotency_key.as_deref() == Some(key))
                .cloned())
        }
    }

    fn setup() -> (Arc<InMemoryLeadRepository>, MockSubmissionSink, LeadService) {
        let repository = Arc::new(InMemoryLeadRepository::default());
        let sink = MockSubmissionSink::new();
        let service = LeadService::new(repository.clone(), Arc::new(sink.clone()));
        (repository, sink, service)
    }

    fn submission() -> NewLead {
        NewLead {
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            message: "hi".to_string(),
            client_submit_at: Some(1000),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn submit_stores_stamps_and_publishes() {
        let (repository, sink, service) = setup();
        let before = now_millis();

        let outcome = service.submit(submission()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::created(1));

        let stored = repository.get_lead(1).unwrap().unwrap();
        let stamped = stored.server_broadcast_at.unwrap();
        assert!(stamped >= before);

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].lead_id(), 1);
        assert_eq!(messages[0].server_broadcast_at(), stamped);
        let json: serde_json::Value = serde_json::from_str(messages[0].data()).unwrap();
        assert_eq!(json["clientSubmitAt"], 1000);
    }

    #[tokio::test]
    async fn failed_insert_does_not_publish() {
        let (repository, sink, service) = setup();
        repository.fail_inserts.store(true, Ordering::SeqCst);

        let result = service.submit(submission()).await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn invalid_submission_has_no_side_effects() {
        let (repository, sink, service) = setup();
        let mut lead = submission();
        lead.email = String::new();

        let result = service.submit(lead).await;

        assert!(result.unwrap_err().is_validation());
        assert!(repository.leads.lock().unwrap().is_empty());
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn repeated_idempotency_key_returns_first_lead() {
        let (repository, sink, service) = setup();
        let mut lead = submission();
        lead.idempotency_key = Some("retry-1".to_string());

        let first = service.submit(lead.clone()).await.unwrap();
        let second = service.submit(lead).await.unwrap();

        assert_eq!(first, SubmitOutcome::created(1));
        assert_eq!(second, SubmitOutcome::duplicate(1));
        assert_eq!(repository.leads.lock().unwrap().len(), 1);
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn submissions_without_key_may_duplicate() {
        let (repository, sink, service) = setup();
        service.submit(submission()).await.unwrap();
        service.submit(submission()).await.unwrap();
        assert_eq!(repository.leads.lock().unwrap().len(), 2);
        assert_eq!(sink.messages().len(), 2);
    }

    #[tokio::test]
    async fn latency_update_without_fields_is_rejected() {
        let (_repository, _sink, service) = setup();
        service.submit(submission()).await.unwrap();

        let result = service.record_latency(1, LatencyUpdate::default()).await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::NoLatencyFields))
        ));
    }

    #[tokio::test]
    async fn latency_update_rejects_non_positive_id() {
        let (_repository, _sink, service) = setup();
        let update = LatencyUpdate {
            submit_to_server_ms: Some(5),
            ..Default::default()
        };
        for id in [0, -3] {
            assert!(matches!(
                service.record_latency(id, update).await,
                Err(Error::Validation(ValidationError::InvalidLeadId(_)))
            ));
        }
    }

    #[tokio::test]
    async fn latency_update_changes_only_supplied_field() {
        let (_repository, _sink, service) = setup();
        service.submit(submission()).await.unwrap();
        service
            .record_latency(
                1,
                LatencyUpdate {
                    submit_to_server_ms: Some(10),
                    server_to_display_ms: Some(20),
                    submit_to_display_ms: None,
                },
            )
            .await
            .unwrap();

        let updated = service
            .record_latency(
                1,
                LatencyUpdate {
                    server_to_display_ms: Some(25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.submit_to_server_ms, Some(10));
        assert_eq!(updated.server_to_display_ms, Some(25));
        assert_eq!(updated.submit_to_display_ms, None);
    }

    #[tokio::test]
    async fn latency_update_for_unknown_lead_is_not_found() {
        let (_repository, _sink, service) = setup();
        let update = LatencyUpdate {
            submit_to_display_ms: Some(1),
            ..Default::default()
        };
        assert!(service.record_latency(99, update).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn recent_clamps_limit() {
        let (repository, _sink, service) = setup();
        for _ in 0..3 {
            service.submit(submission()).await.unwrap();
        }

        let recent = service.recent(Some(2)).unwrap();
        assert_eq!(recent.iter().map(|l| l.id).collect::<Vec<_>>(), vec![3, 2]);

        service.recent(Some(0)).unwrap();
        assert_eq!(*repository.last_limit.lock().unwrap(), Some(RECENT_DEFAULT_LIMIT));
        service.recent(Some(500)).unwrap();
        assert_eq!(*repository.last_limit.lock().unwrap(), Some(RECENT_MAX_LIMIT));
    }
}
