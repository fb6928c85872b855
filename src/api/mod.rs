mod availability;
mod bookings;
pub mod caller;
mod credits;
pub mod error;
pub mod metrics;
mod reviews;
mod teacher;
mod webhooks;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Every route here expects the gateway-provided caller identity
    let api_routes = Router::new()
        // Credits
        .route("/credits", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        // Availability
        .route("/availability", get(availability::get_own_availability))
        .route("/availability", put(availability::put_availability))
        .route("/availability/profile-status", get(availability::profile_status))
        .route("/teachers/:id/availability", get(availability::get_teacher_availability))
        // Bookings
        .route("/bookings", get(bookings::list_bookings))
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/cancel", post(bookings::cancel_booking))
        .route("/lessons/sweep", post(bookings::sweep_lessons))
        // Reviews
        .route("/reviews", post(reviews::submit_review))
        .route("/teachers", get(reviews::list_teachers))
        .route("/teachers/:id/reviews", get(reviews::get_teacher_reviews))
        // Teacher dashboard
        .route("/teacher/bookings", get(teacher::list_bookings))
        .route("/teacher/reviews", get(teacher::get_reviews))
        .route("/teacher/income", get(teacher::get_income));

    // Authenticated by signature rather than caller identity
    let webhook_routes = Router::new().route("/payments", post(webhooks::payment_webhook));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .nest("/webhooks", webhook_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use sha2::Sha256;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::{TeacherProfile, UserRole};
    use crate::scheduler::week_start_date;
    use crate::testing::{seed_student, seed_teacher, TestDb};

    const SECRET: &str = "whsec_test";

    async fn app(test_db: &TestDb) -> Router {
        let mut config = Config::default();
        config.payments.webhook_secret = Some(SECRET.to_string());
        let state = AppState::new(config, test_db.pool.clone(), Arc::new(test_db.scheduler()));
        create_router(Arc::new(state))
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(caller::USER_ID_HEADER, user);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn signed_payment(body: &Value, secret: &str) -> Request<Body> {
        let raw = body.to_string();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(raw.as_bytes());
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        Request::builder()
            .method("POST")
            .uri("/webhooks/payments")
            .header("content-type", "application/json")
            .header(webhooks::SIGNATURE_HEADER, signature)
            .body(Body::from(raw))
            .unwrap()
    }

    /// Wednesday 10:00 UTC of next week, always more than a day away
    fn lesson_start() -> chrono::DateTime<Utc> {
        week_start_date(Utc::now()) + Duration::days(9) + Duration::hours(10)
    }

    fn slot_json(start: chrono::DateTime<Utc>) -> Value {
        json!({
            "start_time": start.to_rfc3339(),
            "end_time": (start + Duration::minutes(30)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let test_db = TestDb::new().await;
        let app = app(&test_db).await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_caller_is_unauthorized() {
        let test_db = TestDb::new().await;
        let app = app(&test_db).await;

        let (status, body) = send(&app, request("GET", "/api/credits", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_booking_flow_over_http() {
        let test_db = TestDb::new().await;
        seed_teacher(&test_db.pool, "t1").await;
        seed_student(&test_db.pool, "s1", 1).await;
        seed_student(&test_db.pool, "s2", 1).await;
        let app = app(&test_db).await;
        let start = lesson_start();

        let (status, body) = send(
            &app,
            request(
                "PUT",
                "/api/availability",
                Some("t1"),
                Some(json!({ "week_start": start.to_rfc3339(), "slots": [slot_json(start)] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filtered_count"], 0);
        assert_eq!(body["availability"].as_array().unwrap().len(), 1);

        let uri = format!("/api/teachers/t1/availability?week_start={}", start.format("%Y-%m-%dT%H:%M:%SZ"));
        let (status, body) = send(&app, request("GET", &uri, Some("s1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["availability"].as_array().unwrap().len(), 1);

        let mut booking = slot_json(start);
        booking["teacher_id"] = json!("t1");
        let (status, created) = send(
            &app,
            request("POST", "/api/bookings", Some("s1"), Some(booking.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "scheduled");

        let (status, body) = send(
            &app,
            request("POST", "/api/bookings", Some("s2"), Some(booking)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "slot_unavailable");

        let (_, credits) = send(&app, request("GET", "/api/credits", Some("s1"), None)).await;
        assert_eq!(credits["available_credits"], 0);

        let (status, list) = send(&app, request("GET", "/api/bookings", Some("s1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["count"], 1);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/bookings/cancel",
                Some("s1"),
                Some(json!({ "booking_id": created["id"] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refunded"], true);
        assert_eq!(body["booking"]["status"], "cancelled");

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/bookings/cancel",
                Some("s1"),
                Some(json!({ "booking_id": created["id"] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "already_terminal");

        let (_, credits) = send(&app, request("GET", "/api/credits", Some("s1"), None)).await;
        assert_eq!(credits["available_credits"], 1);
    }

    #[tokio::test]
    async fn test_not_approved_student_is_forbidden() {
        let test_db = TestDb::new().await;
        seed_teacher(&test_db.pool, "t1").await;
        let app = app(&test_db).await;

        let mut booking = slot_json(lesson_start());
        booking["teacher_id"] = json!("t1");
        let (status, body) = send(
            &app,
            request("POST", "/api/bookings", Some("visitor"), Some(booking)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "not_approved_student");
    }

    #[tokio::test]
    async fn test_incomplete_profile_reports_missing_fields() {
        let test_db = TestDb::new().await;
        UserRole::upsert(&test_db.pool, "t2", true, false).await.unwrap();
        TeacherProfile::upsert(
            &test_db.pool,
            &TeacherProfile {
                teacher_id: "t2".to_string(),
                field: Some("History".to_string()),
                ..TeacherProfile::default()
            },
        )
        .await
        .unwrap();
        let app = app(&test_db).await;

        let (status, body) = send(
            &app,
            request("GET", "/api/availability/profile-status", Some("t2"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["complete"], false);

        let (status, body) = send(
            &app,
            request(
                "PUT",
                "/api/availability",
                Some("t2"),
                Some(json!({ "slots": [slot_json(lesson_start())] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "profile_incomplete");
        assert_eq!(
            body["error"]["details"]["missing_fields"],
            json!(["price_range", "meet_link", "bio"])
        );
    }

    #[tokio::test]
    async fn test_payment_webhook_is_idempotent() {
        let test_db = TestDb::new().await;
        let app = app(&test_db).await;
        let payment = json!({ "user_id": "s1", "credits": 4, "payment_id": "pay_42" });

        let (status, body) = send(&app, signed_payment(&payment, SECRET)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["duplicate"], false);
        assert_eq!(body["balance"]["available_credits"], 4);

        let (status, body) = send(&app, signed_payment(&payment, SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate"], true);
        assert_eq!(body["balance"]["total_credits"], 4);

        let (status, _) = send(&app, signed_payment(&payment, "wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, journal) = send(
            &app,
            request("GET", "/api/credits/transactions", Some("s1"), None),
        )
        .await;
        assert_eq!(journal["transactions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_income_is_teacher_only() {
        let test_db = TestDb::new().await;
        seed_teacher(&test_db.pool, "t1").await;
        seed_student(&test_db.pool, "s1", 0).await;
        let app = app(&test_db).await;

        let (status, body) = send(&app, request("GET", "/api/teacher/income", Some("t1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_lessons"], 0);
        assert_eq!(body["total_income"], 0);

        let (status, _) = send(&app, request("GET", "/api/teacher/income", Some("s1"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, request("GET", "/api/teachers/t1/reviews", Some("s1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_reviews"], 0);
        assert_eq!(body["average_rating"], 0.0);
    }

    #[tokio::test]
    async fn test_teacher_directory_over_http() {
        let test_db = TestDb::new().await;
        seed_teacher(&test_db.pool, "t1").await;
        seed_teacher(&test_db.pool, "t2").await;
        TeacherProfile::upsert(
            &test_db.pool,
            &TeacherProfile {
                teacher_id: "t2".to_string(),
                field: Some("Physics".to_string()),
                price_range: Some("30-50".to_string()),
                meet_link: Some("https://meet.example.com/t2".to_string()),
                bio: Some("Mechanics".to_string()),
            },
        )
        .await
        .unwrap();
        seed_student(&test_db.pool, "s1", 0).await;
        let app = app(&test_db).await;

        let (status, body) = send(&app, request("GET", "/api/teachers", Some("s1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let (status, body) =
            send(&app, request("GET", "/api/teachers?field=physics", Some("s1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["teachers"][0]["teacher_id"], "t2");
        assert_eq!(body["teachers"][0]["average_rating"], 0.0);

        let (status, _) = send(&app, request("GET", "/api/teachers", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
