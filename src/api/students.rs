use crate::{
    auth::auth::AuthAdmin,
    model::student::Student,
    utils::db_utils::{SqlValue, bind_values_as, bind_values_scalar, build_update_sql, execute_update},
    utils::{email_cache, email_filter, qr, student_id},
};
use actix_web::{HttpResponse, Responder, error::ErrorInternalServerError, web};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct RegisterStudent {
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "jane.doe@campus.edu", format = "email")]
    pub email: String,
    #[schema(example = "+15550001111")]
    pub phone_number: String,
    #[schema(example = "Computer Science")]
    pub course: String,
    #[schema(example = 2, minimum = 1, maximum = 4)]
    pub year: u8,
    #[schema(example = "B")]
    pub section: String,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct StudentQuery {
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Items per page (clamped to 1..=100)
    pub per_page: Option<u32>,
    /// Search over name, email and student id
    pub search: Option<String>,
    /// Filter by course
    pub course: Option<String>,
    /// Filter by study year
    pub year: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct StudentListResponse {
    pub data: Vec<Student>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

fn validate_registration(payload: &RegisterStudent) -> Result<(), String> {
    let required = [
        ("first_name", &payload.first_name),
        ("last_name", &payload.last_name),
        ("phone_number", &payload.phone_number),
        ("course", &payload.course),
        ("section", &payload.section),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(format!("{} must not be empty", name));
        }
    }

    let email = payload.email.trim();
    if !email.contains('@') || !email.contains('.') {
        return Err("A valid email is required".to_string());
    }

    if !(1..=4).contains(&payload.year) {
        return Err("year must be between 1 and 4".to_string());
    }

    Ok(())
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &SqlitePool) -> bool {
    let email = email.trim().to_lowercase();

    // 1. Cuckoo filter - fast negative
    if !email_filter::might_exist(&email) {
        return true;
    }

    // 2. Moka cache - fast positive
    if email_cache::is_registered(&email).await {
        return false;
    }

    // 3. Database fallback (only active students block a re-registration)
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM students WHERE email = ? AND is_active = 1 LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .unwrap_or(true); // fail-safe

    !exists
}

const STUDENT_COLUMNS: &str = "id, student_id, first_name, last_name, email, phone_number, \
                               course, year, section, qr_code, is_active, registration_date";

/// Register Student
#[utoipa::path(
    post,
    path = "/api/students/register",
    request_body = RegisterStudent,
    responses(
        (status = 201, description = "Student registered, QR code attached", body = Object, example = json!({
            "message": "Student registered successfully"
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered", body = Object, example = json!({
            "error": "Student with this email already exists"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Students"
)]
pub async fn register_student(
    pool: web::Data<SqlitePool>,
    payload: web::Json<RegisterStudent>,
) -> actix_web::Result<impl Responder> {
    if let Err(msg) = validate_registration(&payload) {
        return Ok(HttpResponse::BadRequest().json(json!({ "error": msg })));
    }

    let email = payload.email.trim().to_lowercase();

    if !is_email_available(&email, pool.get_ref()).await {
        return Ok(HttpResponse::Conflict().json(json!({
            "error": "Student with this email already exists"
        })));
    }

    let student_id = match student_id::generate_student_id(pool.get_ref()).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            error!("Exhausted attempts to generate a unique student id");
            return Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to generate unique student ID"
            })));
        }
        Err(e) => {
            error!(error = %e, "Student id uniqueness check failed");
            return Err(ErrorInternalServerError("Internal Server Error"));
        }
    };

    let qr_code = qr::data_url(&qr::QrPayload {
        student_id: &student_id,
        first_name: payload.first_name.trim(),
        last_name: payload.last_name.trim(),
        email: &email,
    })
    .map_err(|e| {
        error!(error = %e, "QR rendering failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    let result = sqlx::query_as::<_, Student>(&format!(
        r#"
        INSERT INTO students
        (student_id, first_name, last_name, email, phone_number, course, year, section, qr_code)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {STUDENT_COLUMNS}
        "#
    ))
    .bind(&student_id)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&email)
    .bind(payload.phone_number.trim())
    .bind(payload.course.trim())
    .bind(payload.year as i64)
    .bind(payload.section.trim())
    .bind(&qr_code)
    .fetch_one(pool.get_ref())
    .await;

    let student = match result {
        Ok(s) => s,
        Err(e) => {
            // Lost a race with another registration, or a soft-deleted row
            // still holds the email
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return Ok(HttpResponse::Conflict().json(json!({
                        "error": "Student with this email already exists"
                    })));
                }
            }
            error!(error = %e, "Failed to insert student");
            return Err(ErrorInternalServerError("Internal Server Error"));
        }
    };

    // keep the duplicate-check fast paths in sync
    email_filter::insert(&email);
    email_cache::mark_registered(&email).await;

    info!(student_id = %student.student_id, "Student registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "Student registered successfully",
        "student": {
            "id": student.id,
            "student_id": student.student_id,
            "full_name": format!("{} {}", student.first_name, student.last_name),
            "email": student.email,
            "course": student.course,
            "year": student.year,
            "section": student.section,
            "qr_code": student.qr_code,
        }
    })))
}

/// Paginated student listing
#[utoipa::path(
    get,
    path = "/api/students",
    params(StudentQuery),
    responses(
        (status = 200, description = "Paginated student list", body = StudentListResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn list_students(
    pool: web::Data<SqlitePool>,
    query: web::Query<StudentQuery>,
) -> actix_web::Result<impl Responder> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = vec!["is_active = 1"];
    let mut bindings: Vec<SqlValue> = Vec::new();

    if let Some(search) = &query.search {
        conditions
            .push("(first_name LIKE ? OR last_name LIKE ? OR email LIKE ? OR student_id LIKE ?)");
        let like = format!("%{}%", search);
        for _ in 0..4 {
            bindings.push(SqlValue::String(like.clone()));
        }
    }

    if let Some(course) = &query.course {
        conditions.push("course = ?");
        bindings.push(SqlValue::String(course.clone()));
    }

    if let Some(year) = query.year {
        conditions.push("year = ?");
        bindings.push(SqlValue::I64(year));
    }

    let where_clause = format!("WHERE {}", conditions.join(" AND "));

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM students {}", where_clause);
    debug!(sql = %count_sql, bindings = ?bindings, "Counting students");

    let count_query = bind_values_scalar(sqlx::query_scalar::<_, i64>(&count_sql), &bindings);

    let total = count_query.fetch_one(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %count_sql, "Failed to count students");
        ErrorInternalServerError("Database error")
    })?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_clause
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching students");

    let data_query = bind_values_as(sqlx::query_as::<_, Student>(&data_sql), &bindings)
        .bind(per_page as i64)
        .bind(offset as i64);

    let students = data_query.fetch_all(pool.get_ref()).await.map_err(|e| {
        error!(error = %e, sql = %data_sql, "Failed to fetch students");
        ErrorInternalServerError("Database error")
    })?;

    Ok(HttpResponse::Ok().json(StudentListResponse {
        data: students,
        page,
        per_page,
        total,
    }))
}

/// Get Student by ID
#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student row id")),
    responses(
        (status = 200, description = "Student found", body = Student),
        (status = 404, description = "Student not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn get_student(
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let student = sqlx::query_as::<_, Student>(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ? AND is_active = 1"
    ))
    .bind(id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, id, "Failed to fetch student");
        ErrorInternalServerError("Internal Server Error")
    })?;

    match student {
        Some(s) => Ok(HttpResponse::Ok().json(s)),
        None => Ok(HttpResponse::NotFound().json(json!({ "error": "Student not found" }))),
    }
}

const UPDATABLE_STUDENT_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "email",
    "phone_number",
    "course",
    "year",
    "section",
];

/// Update Student
#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student row id")),
    request_body = Object,
    responses(
        (status = 200, description = "Student updated"),
        (status = 400, description = "Unknown or empty field set"),
        (status = 404, description = "Student not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn update_student(
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let update = build_update_sql("students", &body, UPDATABLE_STUDENT_COLUMNS, "id", id)?;

    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| {
            error!(error = %e, id, "Failed to update student");
            ErrorInternalServerError("Internal Server Error")
        })?;

    if affected == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Student not found" })));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Student updated successfully" })))
}

/// Delete Student (soft delete)
#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student row id")),
    responses(
        (status = 200, description = "Student deleted"),
        (status = 403, description = "Super-admin only"),
        (status = 404, description = "Student not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn delete_student(
    auth: AuthAdmin,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    auth.require_super_admin()?;

    let id = path.into_inner();

    let result = sqlx::query(
        "UPDATE students SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, id, "Failed to delete student");
        ErrorInternalServerError("Internal Server Error")
    })?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "error": "Student not found" })));
    }

    info!(id, admin = %auth.email, "Student deactivated");

    Ok(HttpResponse::Ok().json(json!({ "message": "Student deleted successfully" })))
}

/// Get a student's QR code
#[utoipa::path(
    get,
    path = "/api/students/{id}/qr",
    params(("id", Path, description = "Student row id")),
    responses(
        (status = 200, description = "QR code and student summary"),
        (status = 404, description = "Student not found")
    ),
    tag = "Students"
)]
pub async fn get_student_qr(
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let row = sqlx::query_as::<_, (String, String, String, String)>(
        r#"
        SELECT qr_code, first_name, last_name, student_id
        FROM students
        WHERE id = ? AND is_active = 1
        "#,
    )
    .bind(id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, id, "Failed to fetch QR code");
        ErrorInternalServerError("Internal Server Error")
    })?;

    match row {
        Some((qr_code, first_name, last_name, student_id)) => {
            Ok(HttpResponse::Ok().json(json!({
                "qr_code": qr_code,
                "student_info": {
                    "full_name": format!("{} {}", first_name, last_name),
                    "student_id": student_id,
                }
            })))
        }
        None => Ok(HttpResponse::NotFound().json(json!({ "error": "Student not found" }))),
    }
}
