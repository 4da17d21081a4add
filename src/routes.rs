use crate::{
    api::{admin, attendance, students},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        // a zero rate would make finish() return None; treat it as the
        // slowest valid limit instead of refusing to start
        let requests_per_min = requests_per_min.max(1);
        let per_ms = 60_000 / requests_per_min as u64;
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let scan_limiter = Arc::new(build_limiter(config.rate_scan_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Auth routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/setup")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::setup)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Public routes: the registration form and the scanner post here without
    // a token, and a registered student can always fetch their own QR code.
    // Registered before the protected scope so they match first.
    cfg.service(
        web::resource(format!("{}/students/register", config.api_prefix))
            .wrap(register_limiter.clone())
            .route(web::post().to(students::register_student)),
    );
    cfg.service(
        web::resource(format!("{}/students/{{id}}/qr", config.api_prefix))
            .route(web::get().to(students::get_student_qr)),
    );
    cfg.service(
        web::resource(format!("{}/attendance/mark", config.api_prefix))
            .wrap(scan_limiter.clone())
            .route(web::post().to(attendance::mark)),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/students")
                    // /students
                    .service(web::resource("").route(web::get().to(students::list_students)))
                    // /students/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(students::get_student))
                            .route(web::put().to(students::update_student))
                            .route(web::delete().to(students::delete_student)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    .service(web::resource("/summary").route(web::get().to(attendance::summary))),
            )
            .service(
                web::scope("/admin")
                    .service(web::resource("/dashboard").route(web::get().to(admin::dashboard)))
                    .service(
                        web::resource("/export/students")
                            .route(web::get().to(admin::export_students)),
                    ),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn zero_rate_limits_do_not_panic_at_startup() {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 604_800,
            rate_login_per_min: 0,
            rate_register_per_min: 0,
            rate_scan_per_min: 0,
            rate_refresh_per_min: 0,
            rate_protected_per_min: 0,
            api_prefix: "/api".to_string(),
        };

        // every limiter is built while the app factory runs
        test::init_service(App::new().configure(|cfg| configure(cfg, config.clone()))).await;
    }
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /refresh with refresh_token
//       └─ returns new access_token
