use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Decided once at check-in, never revised by a later check-out.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    sqlx::Type,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: i64,

    #[schema(example = "STU1K2J3H4ABCDEF")]
    pub student_id: String,

    /// Partition key for the one-record-per-day rule (server-local calendar day)
    #[schema(example = "2025-07-05", value_type = String, format = "date")]
    pub date: NaiveDate,

    #[schema(example = "2025-07-05T08:45:00", value_type = String, format = "date-time")]
    pub time_in: NaiveDateTime,

    #[schema(example = "2025-07-05T17:30:00", value_type = String, format = "date-time", nullable = true)]
    pub time_out: Option<NaiveDateTime>,

    #[schema(example = "present")]
    pub status: AttendanceStatus,

    #[schema(example = "Main Campus")]
    pub location: String,

    #[schema(nullable = true)]
    pub notes: Option<String>,
}

/// Attendance row joined with the student's profile fields for admin listings.
/// Student columns are nullable because the join is a LEFT JOIN.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceWithStudent {
    pub id: i64,
    pub student_id: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = String, format = "date-time")]
    pub time_in: NaiveDateTime,
    #[schema(value_type = String, format = "date-time", nullable = true)]
    pub time_out: Option<NaiveDateTime>,
    pub status: AttendanceStatus,
    pub location: String,
    pub notes: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub course: Option<String>,
    pub year: Option<i64>,
    pub section: Option<String>,
}
