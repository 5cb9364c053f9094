//! Customer entity (§3/§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i32,
    pub chat_user_id: String,
    pub ticket_customer_id: Option<String>,
    pub email: Option<String>,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted by an upsert. `ticket_customer_id` is immutable once set
/// (§3) so it is only ever written, never cleared, by the COALESCE upsert.
#[derive(Debug, Clone)]
pub struct CustomerUpsert {
    pub chat_user_id: String,
    pub username: String,
    pub ticket_customer_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}
