use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use leadpulse_core::errors::{DatabaseError, ValidationError};
use leadpulse_core::leads::{LatencyUpdate, Lead, LeadRepositoryTrait, NewLead};
use leadpulse_core::Result;

use super::model::{LatencyChangesetDB, LeadDB, NewLeadDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::leads;
use crate::schema::leads::dsl::*;

pub struct LeadRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl LeadRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        LeadRepository { pool, writer }
    }

    fn query_recent_impl(&self, limit: i64) -> Result<Vec<Lead>> {
        let mut conn = get_connection(&self.pool)?;
        let leads_db = leads
            .order(id.desc())
            .limit(limit)
            .select(LeadDB::as_select())
            .load::<LeadDB>(&mut conn)
            .into_core()?;
        Ok(leads_db.into_iter().map(Lead::from).collect())
    }

    fn get_lead_impl(&self, lead_id: i64) -> Result<Option<Lead>> {
        let mut conn = get_connection(&self.pool)?;
        let lead = leads
            .find(lead_id)
            .select(LeadDB::as_select())
            .first::<LeadDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(lead.map(Lead::from))
    }

    fn find_by_idempotency_key_impl(&self, key: &str) -> Result<Option<Lead>> {
        let mut conn = get_connection(&self.pool)?;
        let lead = leads
            .filter(idempotency_key.eq(key))
            .select(LeadDB::as_select())
            .first::<LeadDB>(&mut conn)
            .optional()
            .into_core()?;
        Ok(lead.map(Lead::from))
    }
}

#[async_trait]
impl LeadRepositoryTrait for LeadRepository {
    async fn insert_lead(&self, new_lead: NewLead) -> Result<Lead> {
        let new_lead_db = NewLeadDB::from_domain(new_lead, Utc::now().naive_utc());

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Lead> {
                let result_db = diesel::insert_into(leads::table)
                    .values(&new_lead_db)
                    .returning(LeadDB::as_returning())
                    .get_result(conn)
                    .into_core()?;
                Ok(Lead::from(result_db))
            })
            .await
    }

    async fn update_broadcast_timestamp(&self, lead_id: i64, broadcast_at_ms: i64) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let updated = diesel::update(leads.find(lead_id))
                    .set(server_broadcast_at.eq(Some(broadcast_at_ms)))
                    .execute(conn)
                    .into_core()?;
                if updated == 0 {
                    return Err(DatabaseError::NotFound(format!("lead {lead_id}")).into());
                }
                Ok(())
            })
            .await
    }

    async fn update_latency(&self, lead_id: i64, update: LatencyUpdate) -> Result<Lead> {
        if update.is_empty() {
            return Err(ValidationError::NoLatencyFields.into());
        }
        let changes = LatencyChangesetDB::from(update);

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Lead> {
                let updated = diesel::update(leads.find(lead_id))
                    .set(&changes)
                    .execute(conn)
                    .into_core()?;
                if updated == 0 {
                    return Err(DatabaseError::NotFound(format!("lead {lead_id}")).into());
                }
                let result_db = leads
                    .find(lead_id)
                    .select(LeadDB::as_select())
                    .first::<LeadDB>(conn)
                    .into_core()?;
                Ok(Lead::from(result_db))
            })
            .await
    }

    fn query_recent(&self, limit: i64) -> Result<Vec<Lead>> {
        self.query_recent_impl(limit)
    }

    fn get_lead(&self, lead_id: i64) -> Result<Option<Lead>> {
        self.get_lead_impl(lead_id)
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Lead>> {
        self.find_by_idempotency_key_impl(key)
    }
}
