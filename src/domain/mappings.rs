//! ThreadTicketMapping entity — the correctness-critical bijection (§3, I1-I3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MappingStatus {
    Active,
    Closed,
    Archived,
}

impl Default for MappingStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ThreadTicketMapping {
    pub id: i32,
    pub chat_thread_id: String,
    pub ticket_id: String,
    pub chat_channel_id: Option<String>,
    pub customer_id: Option<i32>,
    pub status: MappingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MappingUpsert {
    pub chat_thread_id: String,
    pub ticket_id: String,
    pub chat_channel_id: Option<String>,
    pub customer_id: Option<i32>,
    pub status: MappingStatus,
}
