use crate::errors::Result;
use crate::leads::leads_model::{LatencyUpdate, Lead, NewLead, SubmitOutcome};
use async_trait::async_trait;

/// Trait for lead repository operations
#[async_trait]
pub trait LeadRepositoryTrait: Send + Sync {
    /// Inserts a validated lead and returns it with its server-assigned id.
    async fn insert_lead(&self, new_lead: NewLead) -> Result<Lead>;
    async fn update_broadcast_timestamp(&self, lead_id: i64, broadcast_at_ms: i64) -> Result<()>;
    /// Applies only the fields present in `update`. Unknown ids yield `DatabaseError::NotFound`.
    async fn update_latency(&self, lead_id: i64, update: LatencyUpdate) -> Result<Lead>;
    /// Most recent leads, newest first.
    fn query_recent(&self, limit: i64) -> Result<Vec<Lead>>;
    fn get_lead(&self, lead_id: i64) -> Result<Option<Lead>>;
    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>>;
}

/// Trait for lead service operations
#[async_trait]
pub trait LeadServiceTrait: Send + Sync {
    async fn submit(&self, new_lead: NewLead) -> Result<SubmitOutcome>;
    async fn record_latency(&self, lead_id: i64, update: LatencyUpdate) -> Result<Lead>;
    fn recent(&self, limit: Option<i64>) -> Result<Vec<Lead>>;
}
