//! C5 — Domain Store: typed operations on top of C4 and C3 (§4.5).

pub mod bot_config;
pub mod customers;
pub mod mappings;
pub mod store;

pub use customers::{Customer, CustomerUpsert};
pub use mappings::{MappingStatus, MappingUpsert, ThreadTicketMapping};
pub use store::{CachePattern, DomainStore};
