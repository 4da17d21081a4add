use crate::api::attendance::{count_active_students, summary_for_date};
use crate::auth::auth::AuthAdmin;
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, http::header, web};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct RecentScan {
    pub id: i64,
    pub student_id: String,
    #[schema(value_type = String, format = "date-time")]
    pub time_in: NaiveDateTime,
    pub status: String,
    pub location: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub course: Option<String>,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct TrendPoint {
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub count: i64,
}

async fn recent_scans(pool: &SqlitePool, limit: i64) -> Result<Vec<RecentScan>, sqlx::Error> {
    sqlx::query_as::<_, RecentScan>(
        r#"
        SELECT a.id, a.student_id, a.time_in, a.status, a.location,
               s.first_name, s.last_name, s.course
        FROM attendance a
        LEFT JOIN students s ON a.student_id = s.student_id
        WHERE a.date = ?
        ORDER BY a.time_in DESC
        LIMIT ?
        "#,
    )
    .bind(Local::now().date_naive())
    .bind(limit)
    .fetch_all(pool)
    .await
}

async fn attendance_trend(pool: &SqlitePool, days: i64) -> Result<Vec<TrendPoint>, sqlx::Error> {
    sqlx::query_as::<_, TrendPoint>(
        r#"
        SELECT date, COUNT(*) as count
        FROM attendance
        WHERE date >= date('now', ?)
        GROUP BY date
        ORDER BY date
        "#,
    )
    .bind(format!("-{} days", days))
    .fetch_all(pool)
    .await
}

/// Dashboard statistics: today's headline numbers, the most recent scans and
/// a 7-day trend.
#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    responses(
        (status = 200, description = "Dashboard aggregate"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn dashboard(pool: web::Data<SqlitePool>) -> actix_web::Result<impl Responder> {
    let today = Local::now().date_naive();

    let total_students = count_active_students(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, "Failed to count students");
        ErrorInternalServerError("Database error")
    })?;

    let (today_total, present, late) =
        summary_for_date(pool.get_ref(), today).await.map_err(|e| {
            error!(error = %e, "Failed to compute today's summary");
            ErrorInternalServerError("Database error")
        })?;

    let recent = recent_scans(pool.get_ref(), 10).await.map_err(|e| {
        error!(error = %e, "Failed to fetch recent scans");
        ErrorInternalServerError("Database error")
    })?;

    let trend = attendance_trend(pool.get_ref(), 7).await.map_err(|e| {
        error!(error = %e, "Failed to fetch attendance trend");
        ErrorInternalServerError("Database error")
    })?;

    let rate = if total_students > 0 {
        format!("{:.2}", today_total as f64 / total_students as f64 * 100.0)
    } else {
        "0".to_string()
    };

    Ok(HttpResponse::Ok().json(json!({
        "total_students": total_students,
        "today_attendance": today_total,
        "present_today": present,
        "late_today": late,
        "absent_today": total_students - today_total,
        "attendance_rate": rate,
        "recent_attendance": recent,
        "attendance_trend": trend,
    })))
}

#[derive(sqlx::FromRow)]
struct StudentCsvRow {
    student_id: String,
    first_name: String,
    last_name: String,
    email: String,
    phone_number: String,
    course: String,
    year: i64,
    section: String,
    registration_date: NaiveDateTime,
}

/// Export all active students as a CSV attachment
#[utoipa::path(
    get,
    path = "/api/admin/export/students",
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn export_students(
    auth: AuthAdmin,
    pool: web::Data<SqlitePool>,
) -> actix_web::Result<impl Responder> {
    info!(admin = %auth.email, "Student CSV export requested");

    let rows = sqlx::query_as::<_, StudentCsvRow>(
        r#"
        SELECT student_id, first_name, last_name, email, phone_number,
               course, year, section, registration_date
        FROM students
        WHERE is_active = 1
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to fetch students for export");
        ErrorInternalServerError("Database error")
    })?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "Student ID",
            "First Name",
            "Last Name",
            "Email",
            "Phone Number",
            "Course",
            "Year",
            "Section",
            "Registration Date",
        ])
        .map_err(|e| {
            error!(error = %e, "CSV header write failed");
            ErrorInternalServerError("Export failed")
        })?;

    for row in rows {
        writer
            .write_record([
                row.student_id.as_str(),
                row.first_name.as_str(),
                row.last_name.as_str(),
                row.email.as_str(),
                row.phone_number.as_str(),
                row.course.as_str(),
                &row.year.to_string(),
                row.section.as_str(),
                &row.registration_date.to_string(),
            ])
            .map_err(|e| {
                error!(error = %e, "CSV row write failed");
                ErrorInternalServerError("Export failed")
            })?;
    }

    let bytes = writer.into_inner().map_err(|e| {
        error!(error = %e, "CSV flush failed");
        ErrorInternalServerError("Export failed")
    })?;

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/csv; charset=utf-8"))
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"students.csv\"",
        ))
        .body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    #[actix_web::test]
    async fn export_produces_headers_and_rows() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO students
            (student_id, first_name, last_name, email, phone_number, course, year, section, qr_code)
            VALUES ('STU1', 'Jane', 'Doe', 'jane@campus.edu', '+1555', 'CS', 2, 'B', '')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let auth = AuthAdmin {
            admin_id: 1,
            email: "root@campus.edu".to_string(),
            role: crate::model::role::Role::SuperAdmin,
        };
        let resp = export_students(auth, web::Data::new(pool))
            .await
            .unwrap()
            .respond_to(&actix_web::test::TestRequest::get().to_http_request());

        assert_eq!(resp.status(), 200);
        let body = actix_web::body::to_bytes(resp.into_body())
            .await
            .map_err(|_| "body read failed")
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("Student ID,First Name"));
        assert!(text.contains("STU1,Jane,Doe,jane@campus.edu"));
    }
}
