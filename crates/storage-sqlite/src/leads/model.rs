//! Database models for leads.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use leadpulse_core::leads::{LatencyUpdate, Lead, NewLead};

/// Database model for leads
#[derive(Queryable, Identifiable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::leads)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LeadDB {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub client_submit_at: Option<i64>,
    pub server_broadcast_at: Option<i64>,
    pub submit_to_server_ms: Option<i64>,
    pub server_to_display_ms: Option<i64>,
    pub submit_to_display_ms: Option<i64>,
    pub idempotency_key: Option<String>,
}

/// Database model for inserting a lead
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::leads)]
pub struct NewLeadDB {
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub client_submit_at: Option<i64>,
    pub idempotency_key: Option<String>,
}

/// Partial update of the latency columns. `None` fields are left untouched.
#[derive(AsChangeset, Debug, Clone, Copy)]
#[diesel(table_name = crate::schema::leads)]
pub struct LatencyChangesetDB {
    pub submit_to_server_ms: Option<i64>,
    pub server_to_display_ms: Option<i64>,
    pub submit_to_display_ms: Option<i64>,
}

// Conversion to domain models
impl From<LeadDB> for Lead {
    fn from(db: LeadDB) -> Self {
        Self {
            id: db.id,
            name: db.name,
            email: db.email,
            message: db.message,
            created_at: db.created_at,
            client_submit_at: db.client_submit_at,
            server_broadcast_at: db.server_broadcast_at,
            submit_to_server_ms: db.submit_to_server_ms,
            server_to_display_ms: db.server_to_display_ms,
            submit_to_display_ms: db.submit_to_display_ms,
            idempotency_key: db.idempotency_key,
        }
    }
}

impl NewLeadDB {
    pub fn from_domain(domain: NewLead, created_at: NaiveDateTime) -> Self {
        Self {
            name: domain.name,
            email: domain.email,
            message: domain.message,
            created_at,
            client_submit_at: domain.client_submit_at,
            idempotency_key: domain.idempotency_key,
        }
    }
}

impl From<LatencyUpdate> for LatencyChangesetDB {
    fn from(domain: LatencyUpdate) -> Self {
        Self {
            submit_to_server_ms: domain.submit_to_server_ms,
            server_to_display_ms: domain.server_to_display_ms,
            submit_to_display_ms: domain.submit_to_display_ms,
        }
    }
}
