use crate::marker::{
    MarkError, MarkOutcome, SqlAttendanceStore, SqlStudentDirectory, mark_attendance,
};
use crate::model::attendance::{AttendanceStatus, AttendanceWithStudent};
use crate::utils::db_utils::{SqlValue, bind_values_as, bind_values_scalar};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct MarkRequest {
    /// The `studentId` field of the decoded QR payload. Scanners forward the
    /// payload verbatim, so the camelCase wire name is accepted too.
    #[serde(alias = "studentId")]
    #[schema(example = "STU1K2J3H4ABCDEF")]
    pub student_id: String,
    #[schema(example = "Main Campus", nullable = true)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AttendanceQuery {
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Items per page (clamped to 1..=100)
    pub per_page: Option<u32>,
    /// Calendar day, defaults to today
    pub date: Option<NaiveDate>,
    /// Filter by student identifier
    pub student_id: Option<String>,
    /// Filter by status (present / late)
    pub status: Option<AttendanceStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceWithStudent>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct SummaryQuery {
    /// Calendar day, defaults to today
    pub date: Option<NaiveDate>,
}

/// Mark attendance from a QR scan: first scan of the day checks in, second
/// checks out, anything after that is rejected.
#[utoipa::path(
    post,
    path = "/api/attendance/mark",
    request_body = MarkRequest,
    responses(
        (status = 201, description = "Checked in", body = Object, example = json!({
            "message": "Attendance marked successfully"
        })),
        (status = 200, description = "Checked out", body = Object, example = json!({
            "message": "Check-out successful"
        })),
        (status = 400, description = "Attendance already marked for today"),
        (status = 404, description = "Student not found or inactive"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn mark(
    pool: web::Data<SqlitePool>,
    payload: web::Json<MarkRequest>,
) -> actix_web::Result<impl Responder> {
    let student_id = payload.student_id.trim();
    if student_id.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "student_id must not be empty"
        })));
    }

    // server-local wall clock partitions the calendar days
    let now = Local::now().naive_local();

    let result = mark_attendance(
        &SqlStudentDirectory(pool.get_ref()),
        &SqlAttendanceStore(pool.get_ref()),
        student_id,
        payload.location.as_deref(),
        now,
    )
    .await;

    match result {
        Ok(receipt) => match receipt.outcome {
            MarkOutcome::CheckedIn(record) => {
                info!(student_id, status = %record.status, "Check-in");
                Ok(HttpResponse::Created().json(json!({
                    "message": "Attendance marked successfully",
                    "attendance": record,
                    "student": receipt.student,
                })))
            }
            MarkOutcome::CheckedOut(record) => {
                info!(student_id, "Check-out");
                Ok(HttpResponse::Ok().json(json!({
                    "message": "Check-out successful",
                    "attendance": record,
                    "student": receipt.student,
                })))
            }
        },
        Err(MarkError::StudentNotFound) => {
            Ok(HttpResponse::NotFound().json(json!({ "error": "Student not found" })))
        }
        Err(MarkError::AlreadyMarked) => Ok(HttpResponse::BadRequest().json(json!({
            "error": "Attendance already marked for today"
        }))),
        Err(MarkError::Store(e)) => {
            error!(error = %e, student_id, "Failed to mark attendance");
            Err(ErrorInternalServerError("Failed to mark attendance"))
        }
    }
}

/// Paginated attendance listing with joined student fields
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance list", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn list_attendance(
    pool: web::Data<SqlitePool>,
    query: web::Query<AttendanceQuery>,
) -> actix_web::Result<impl Responder> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let date = query.date.unwrap_or_else(|| Local::now().date_naive());

    let mut conditions = vec!["a.date = ?"];
    let mut bindings: Vec<SqlValue> = vec![SqlValue::Date(date)];

    if let Some(student_id) = &query.student_id {
        conditions.push("a.student_id = ?");
        bindings.push(SqlValue::String(student_id.clone()));
    }

    if let Some(status) = query.status {
        conditions.push("a.status = ?");
        bindings.push(SqlValue::String(status.to_string()));
    }

    let where_clause = format!("WHERE {}", conditions.join(" AND "));

    let count_sql = format!("SELECT COUNT(*) FROM attendance a {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting attendance rows");

    let count_query = bind_values_scalar(sqlx::query_scalar::<_, i64>(&count_sql), &bindings);

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count attendance");
        ErrorInternalServerError("Database error")
    })?;

    let data_sql = format!(
        r#"
        SELECT a.id, a.student_id, a.date, a.time_in, a.time_out, a.status, a.location, a.notes,
               s.first_name, s.last_name, s.email, s.course, s.year, s.section
        FROM attendance a
        LEFT JOIN students s ON a.student_id = s.student_id
        {}
        ORDER BY a.time_in DESC
        LIMIT ? OFFSET ?
        "#,
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, "Fetching attendance");

    let data_query =
        bind_values_as(sqlx::query_as::<_, AttendanceWithStudent>(&data_sql), &bindings)
            .bind(per_page as i64)
            .bind(offset as i64);

    let rows = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch attendance");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data: rows,
        page,
        per_page,
        total,
    }))
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    total: i64,
    present: i64,
    late: i64,
}

pub async fn summary_for_date(
    pool: &SqlitePool,
    date: NaiveDate,
) -> Result<(i64, i64, i64), sqlx::Error> {
    let row = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT
            COUNT(*) as total,
            COALESCE(SUM(CASE WHEN status = 'present' THEN 1 ELSE 0 END), 0) as present,
            COALESCE(SUM(CASE WHEN status = 'late' THEN 1 ELSE 0 END), 0) as late
        FROM attendance
        WHERE date = ?
        "#,
    )
    .bind(date)
    .fetch_one(pool)
    .await?;

    Ok((row.total, row.present, row.late))
}

pub async fn count_active_students(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE is_active = 1")
        .fetch_one(pool)
        .await
}

/// Per-day attendance summary
#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Counts and attendance rate for the day"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Attendance",
    security(("bearer_auth" = []))
)]
pub async fn summary(
    pool: web::Data<SqlitePool>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    let date = query.date.unwrap_or_else(|| Local::now().date_naive());

    let (total, present, late) = summary_for_date(pool.get_ref(), date).await.map_err(|e| {
        error!(error = %e, "Failed to compute attendance summary");
        ErrorInternalServerError("Database error")
    })?;

    let total_students = count_active_students(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, "Failed to count students");
        ErrorInternalServerError("Database error")
    })?;

    let rate = if total_students > 0 {
        format!("{:.2}", total as f64 / total_students as f64 * 100.0)
    } else {
        "0".to_string()
    };

    Ok(HttpResponse::Ok().json(json!({
        "date": date,
        "total_students": total_students,
        "present": present,
        "late": late,
        "absent": total_students - total,
        "attendance_rate": rate,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_schema;
    use actix_web::{App, test};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_student(pool: &SqlitePool, student_id: &str) {
        sqlx::query(
            r#"
            INSERT INTO students
            (student_id, first_name, last_name, email, phone_number, course, year, section, qr_code)
            VALUES (?, 'Jane', 'Doe', ?, '+15550001111', 'Computer Science', 2, 'B', '')
            "#,
        )
        .bind(student_id)
        .bind(format!("{}@campus.edu", student_id.to_lowercase()))
        .execute(pool)
        .await
        .unwrap();
    }

    #[actix_web::test]
    async fn mark_endpoint_round_trip() {
        let pool = pool().await;
        seed_student(&pool, "STU123").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .route("/api/attendance/mark", web::post().to(mark)),
        )
        .await;

        // first scan checks in
        let req = test::TestRequest::post()
            .uri("/api/attendance/mark")
            .set_json(json!({ "student_id": "STU123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        // second scan checks out
        let req = test::TestRequest::post()
            .uri("/api/attendance/mark")
            .set_json(json!({ "student_id": "STU123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Check-out successful");
        assert_eq!(body["student"]["full_name"], "Jane Doe");

        // third scan is rejected
        let req = test::TestRequest::post()
            .uri("/api/attendance/mark")
            .set_json(json!({ "student_id": "STU123" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn mark_endpoint_accepts_raw_qr_payload_field_name() {
        let pool = pool().await;
        seed_student(&pool, "STU789").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .route("/api/attendance/mark", web::post().to(mark)),
        )
        .await;

        // a scanner posting the decoded QR payload unchanged uses camelCase
        let req = test::TestRequest::post()
            .uri("/api/attendance/mark")
            .set_json(json!({ "studentId": "STU789" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
    }

    #[actix_web::test]
    async fn mark_endpoint_rejects_unknown_students() {
        let pool = pool().await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .route("/api/attendance/mark", web::post().to(mark)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/attendance/mark")
            .set_json(json!({ "student_id": "STU404" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn summary_counts_by_status() {
        let pool = pool().await;
        seed_student(&pool, "STU1").await;
        seed_student(&pool, "STU2").await;
        seed_student(&pool, "STU3").await;

        let date = chrono::NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        for (student, status) in [("STU1", "present"), ("STU2", "late")] {
            sqlx::query(
                "INSERT INTO attendance (student_id, date, time_in, status) VALUES (?, ?, ?, ?)",
            )
            .bind(student)
            .bind(date)
            .bind(date.and_hms_opt(8, 0, 0).unwrap())
            .bind(status)
            .execute(&pool)
            .await
            .unwrap();
        }

        let (total, present, late) = summary_for_date(&pool, date).await.unwrap();
        assert_eq!((total, present, late), (2, 1, 1));
        assert_eq!(count_active_students(&pool).await.unwrap(), 3);
    }
}
