use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{broadcast_notifications, comments, company, leads, po_data, profiles};

// ============================================================================
// Roles
// ============================================================================

/// Fixed three-tier role model. Stored as `role_id` on `profiles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    User = 0,
    Admin = 1,
    Superadmin = 2,
}

impl Role {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Role {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::User),
            1 => Ok(Role::Admin),
            2 => Ok(Role::Superadmin),
            other => Err(other),
        }
    }
}

// ============================================================================
// Lead statuses
// ============================================================================

pub const STATUS_NEW: &str = "New";
pub const STATUS_CONTACTED: &str = "Contacted";
pub const STATUS_IN_CONVERSATION: &str = "In Conversation";
pub const STATUS_SCHEDULED: &str = "Scheduled";
pub const STATUS_PO: &str = "PO";
pub const STATUS_NOT_INTERESTED: &str = "Not Interested";

pub const LEAD_STATUSES: [&str; 6] = [
    STATUS_NEW,
    STATUS_CONTACTED,
    STATUS_IN_CONVERSATION,
    STATUS_SCHEDULED,
    STATUS_PO,
    STATUS_NOT_INTERESTED,
];

pub fn is_valid_status(status: &str) -> bool {
    LEAD_STATUSES.contains(&status)
}

// ============================================================================
// Row types
// ============================================================================

// Updates write the whole row, so a `None` here must become NULL (clearing
// `schedule_time` on a status change depends on it).
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = leads, treat_none_as_null = true)]
pub struct Lead {
    pub id: Uuid,
    pub lead_name: String,
    pub phone: Option<String>,
    pub secondary_phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub status: String,
    pub schedule_time: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_by_email: String,
    pub assigned_to: Option<Uuid>,
    pub assigned_to_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = comments)]
pub struct Comment {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub comment_text: String,
    pub status: Option<String>,
    pub created_by: Uuid,
    pub created_by_email: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = po_data)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub amount_received: BigDecimal,
    pub amount_remaining: BigDecimal,
    pub release_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_by: Uuid,
    pub created_by_email: String,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = profiles, treat_none_as_null = true)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub role_id: i32,
    pub company_id: Option<Uuid>,
    pub custom_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = company, treat_none_as_null = true)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = broadcast_notifications)]
pub struct BroadcastNotification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub created_by: Uuid,
    pub created_by_email: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Wire shapes
// ============================================================================

/// Standard list-endpoint response: one page of rows plus the total
/// matching-row count.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: i64,
}

impl<T> ListResponse<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::User, Role::Admin, Role::Superadmin] {
            assert_eq!(Role::try_from(role.as_i32()), Ok(role));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert_eq!(Role::try_from(3), Err(3));
        assert_eq!(Role::try_from(-1), Err(-1));
    }

    #[test]
    fn status_vocabulary() {
        assert!(is_valid_status("Scheduled"));
        assert!(is_valid_status("In Conversation"));
        assert!(!is_valid_status("scheduled"));
        assert!(!is_valid_status("Won"));
    }
}
