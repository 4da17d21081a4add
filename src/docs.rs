use crate::api::admin::{RecentScan, TrendPoint};
use crate::api::attendance::{AttendanceListResponse, AttendanceQuery, MarkRequest, SummaryQuery};
use crate::api::students::{RegisterStudent, StudentListResponse, StudentQuery};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, AttendanceWithStudent};
use crate::model::student::{Student, StudentSummary};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "QR Attendance API",
        version = "1.0.0",
        description = r#"
## QR Code Attendance Tracking

This API powers a **QR-code-based attendance tracking** system for workshops
and classes.

### Key Features
- **Student Registration**
  - Self-service registration that returns a personal QR code
- **Attendance Marking**
  - First scan of the day checks in (present/late by the 09:00 cutoff)
  - Second scan checks out; further scans are rejected
- **Admin Panel**
  - Paginated student and attendance listings, per-day summaries,
    dashboard aggregates and CSV export

### Security
Admin endpoints are protected using **JWT Bearer authentication**.
Registration, QR retrieval and scanning are public but rate limited.

### Response Format
- JSON-based RESTful responses
- Pagination supported for list endpoints

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::students::register_student,
        crate::api::students::list_students,
        crate::api::students::get_student,
        crate::api::students::update_student,
        crate::api::students::delete_student,
        crate::api::students::get_student_qr,

        crate::api::attendance::mark,
        crate::api::attendance::list_attendance,
        crate::api::attendance::summary,

        crate::api::admin::dashboard,
        crate::api::admin::export_students,
    ),
    components(
        schemas(
            RegisterStudent,
            StudentQuery,
            StudentListResponse,
            Student,
            StudentSummary,
            MarkRequest,
            AttendanceQuery,
            SummaryQuery,
            AttendanceListResponse,
            AttendanceRecord,
            AttendanceStatus,
            AttendanceWithStudent,
            RecentScan,
            TrendPoint
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Students", description = "Student registration and management APIs"),
        (name = "Attendance", description = "QR scan marking and attendance listing APIs"),
        (name = "Admin", description = "Dashboard and export APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
