use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "student_id": "STU1K2J3H4ABCDEF",
        "first_name": "Jane",
        "last_name": "Doe",
        "email": "jane.doe@campus.edu",
        "phone_number": "+15550001111",
        "course": "Computer Science",
        "year": 2,
        "section": "B",
        "is_active": true,
        "registration_date": "2025-07-01T10:00:00"
    })
)]
pub struct Student {
    #[schema(example = 1)]
    pub id: i64,

    /// External identifier embedded in the QR payload
    #[schema(example = "STU1K2J3H4ABCDEF")]
    pub student_id: String,

    #[schema(example = "Jane")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "jane.doe@campus.edu")]
    pub email: String,

    #[schema(example = "+15550001111")]
    pub phone_number: String,

    #[schema(example = "Computer Science")]
    pub course: String,

    #[schema(example = 2)]
    pub year: i64,

    #[schema(example = "B")]
    pub section: String,

    /// PNG data URL rendered at registration
    #[schema(value_type = String, format = "byte")]
    pub qr_code: String,

    pub is_active: bool,

    #[schema(value_type = String, format = "date-time")]
    pub registration_date: NaiveDateTime,
}

/// Read-only projection attached to scan responses for display purposes.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StudentSummary {
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    #[schema(example = "STU1K2J3H4ABCDEF")]
    pub student_id: String,
    #[schema(example = "Computer Science")]
    pub course: String,
}
