//! SQLite storage implementation for leads.

mod model;
mod repository;

pub use model::{LatencyChangesetDB, LeadDB, NewLeadDB};
pub use repository::LeadRepository;
