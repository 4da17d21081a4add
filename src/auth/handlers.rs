use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::role::Role,
    models::{AdminSql, Claims, LoginReqDto, SetupReqDto, TokenType},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, error, info, instrument};

#[derive(Serialize, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    admin: AdminProfile,
}

#[derive(Serialize, Deserialize)]
struct AdminProfile {
    id: i64,
    email: String,
    full_name: String,
    role: String,
}

fn role_id(role: &str) -> Option<u8> {
    Role::from_str(role).ok().map(Role::id)
}

async fn issue_tokens(
    admin: &AdminSql,
    role: u8,
    pool: &SqlitePool,
    config: &Config,
) -> Result<LoginResponse, sqlx::Error> {
    let access_token = generate_access_token(
        admin.id,
        admin.email.clone(),
        role,
        &config.jwt_secret,
        config.access_token_ttl,
    );

    let (refresh_token, refresh_claims) = generate_refresh_token(
        admin.id,
        admin.email.clone(),
        role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    sqlx::query("INSERT INTO refresh_tokens (admin_id, jti, expires_at) VALUES (?, ?, ?)")
        .bind(admin.id)
        .bind(&refresh_claims.jti)
        .bind(refresh_claims.exp as i64)
        .execute(pool)
        .await?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
        admin: AdminProfile {
            id: admin.id,
            email: admin.email.clone(),
            full_name: format!("{} {}", admin.first_name, admin.last_name),
            role: admin.role.clone(),
        },
    })
}

#[instrument(name = "auth_login", skip(pool, config, body), fields(email = %body.email))]
pub async fn login(
    body: web::Json<LoginReqDto>,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if body.email.trim().is_empty() || body.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().json(json!({"error": "Email or password required"}));
    }

    debug!("Fetching admin from database");

    let admin = match sqlx::query_as::<_, AdminSql>(
        r#"
        SELECT id, email, password, first_name, last_name, role
        FROM admins
        WHERE email = ? AND is_active = 1
        "#,
    )
    .bind(body.email.trim())
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(admin)) => {
            debug!(admin_id = admin.id, "Admin found");
            admin
        }
        Ok(None) => {
            info!("Invalid credentials: admin not found");
            return HttpResponse::Unauthorized().json(json!({"error": "Invalid credentials"}));
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching admin");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if !verify_password(&body.password, &admin.password) {
        info!("Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().json(json!({"error": "Invalid credentials"}));
    }

    let Some(role) = role_id(&admin.role) else {
        error!(role = %admin.role, "Admin row carries an unknown role");
        return HttpResponse::InternalServerError().finish();
    };

    let response = match issue_tokens(&admin, role, pool.get_ref(), &config).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Failed to store refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // last_login_at is bookkeeping, not worth failing the login over
    if let Err(e) = sqlx::query("UPDATE admins SET last_login_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(admin.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");

    HttpResponse::Ok().json(response)
}

/// One-time bootstrap: creates the first super-admin, refuses once any admin
/// row exists.
pub async fn setup(
    body: web::Json<SetupReqDto>,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return HttpResponse::BadRequest().json(json!({"error": "A valid email is required"}));
    }
    if body.password.len() < 6 {
        return HttpResponse::BadRequest()
            .json(json!({"error": "Password must be at least 6 characters"}));
    }
    if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "First and last name required"}));
    }

    let admin_count: i64 = match sqlx::query_scalar("SELECT COUNT(*) FROM admins")
        .fetch_one(pool.get_ref())
        .await
    {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Failed to count admins");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if admin_count > 0 {
        return HttpResponse::BadRequest().json(json!({"error": "Admin already exists"}));
    }

    let hashed = hash_password(&body.password);
    let role = Role::SuperAdmin;

    let admin = match sqlx::query_as::<_, AdminSql>(
        r#"
        INSERT INTO admins (email, password, first_name, last_name, role)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, email, password, first_name, last_name, role
        "#,
    )
    .bind(body.email.trim())
    .bind(&hashed)
    .bind(body.first_name.trim())
    .bind(body.last_name.trim())
    .bind(role.to_string())
    .fetch_one(pool.get_ref())
    .await
    {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "Failed to create admin");
            return HttpResponse::InternalServerError().finish();
        }
    };

    info!(admin_id = admin.id, "Initial admin created");

    match issue_tokens(&admin, role.id(), pool.get_ref(), &config).await {
        Ok(response) => HttpResponse::Created().json(response),
        Err(e) => {
            error!(error = %e, "Failed to store refresh token");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    let header = match req.headers().get("Authorization") {
        Some(h) => h.to_str().unwrap_or(""),
        None => return HttpResponse::Unauthorized().json(json!({"error": "No token"})),
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return HttpResponse::Unauthorized().json(json!({"error": "Invalid token"})),
    };

    let claims: Claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::Unauthorized().finish(),
    };

    if claims.token_type != TokenType::Refresh {
        return HttpResponse::Unauthorized().finish();
    }

    let record = match sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT id, admin_id, revoked FROM refresh_tokens WHERE jti = ?",
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some((id, admin_id, 0))) => (id, admin_id),
        Ok(_) => return HttpResponse::Unauthorized().finish(),
        Err(e) => {
            error!(error = %e, "Failed to look up refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // rotate: revoke the presented token before issuing the next pair
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE id = ?")
        .bind(record.0)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    let (new_refresh_token, new_claims) = generate_refresh_token(
        claims.admin_id,
        claims.sub.clone(),
        claims.role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    if let Err(e) =
        sqlx::query("INSERT INTO refresh_tokens (admin_id, jti, expires_at) VALUES (?, ?, ?)")
            .bind(record.1)
            .bind(&new_claims.jti)
            .bind(new_claims.exp as i64)
            .execute(pool.get_ref())
            .await
    {
        error!(error = %e, "Failed to store rotated refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    let access_token = generate_access_token(
        claims.admin_id,
        claims.sub.clone(),
        claims.role,
        &config.jwt_secret,
        config.access_token_ttl,
    );

    HttpResponse::Ok().json(json!({
        "access_token": access_token,
        "refresh_token": new_refresh_token
    }))
}

pub async fn logout(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    let header = match req.headers().get("Authorization") {
        Some(h) => h.to_str().unwrap_or(""),
        None => return HttpResponse::NoContent().finish(),
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return HttpResponse::NoContent().finish(),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    // only refresh tokens are revocable
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    // idempotent: succeeds even if the token was never stored
    let _ = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await;

    HttpResponse::NoContent().finish()
}
