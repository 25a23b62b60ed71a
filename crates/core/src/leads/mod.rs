//! Leads module - domain models, services, and traits.

mod leads_model;
mod leads_service;
mod leads_traits;

pub use leads_model::{clamp_recent_limit, LatencyUpdate, Lead, NewLead, SubmitOutcome};
pub use leads_service::LeadService;
pub use leads_traits::{LeadRepositoryTrait, LeadServiceTrait};
