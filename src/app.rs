use std::net::SocketAddr;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;
use crate::{auth, markers};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(markers::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::extract::FromRef;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, Header};
    use serde_json::{json, Value};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::jwt::{Claims, JwtKeys};

    fn test_app() -> (AppState, Router) {
        let state = AppState::fake();
        let app = build_app(state.clone());
        (state, app)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn register(app: &Router, email: &str, password: &str) -> (String, Value) {
        let (status, body) = send(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"].clone(),
        )
    }

    async fn create_marker(app: &Router, token: &str, body: Value) -> Value {
        let (status, marker) = send(app, "POST", "/api/markers", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        marker
    }

    fn pothole_body() -> Value {
        json!({
            "title": "Pothole",
            "category": "obstacle",
            "description": "deep",
            "latitude": 18.0,
            "longitude": -77.0
        })
    }

    fn parse_ts(value: &Value) -> OffsetDateTime {
        OffsetDateTime::parse(value.as_str().unwrap(), &Rfc3339).unwrap()
    }

    #[tokio::test]
    async fn health_responds() {
        let (_, app) = test_app();
        let (status, _) = send(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let (_, app) = test_app();
        register(&app, "a@x.com", "pw1").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "a@x.com", "password": "pw2" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Email already registered");
    }

    #[tokio::test]
    async fn register_rejects_malformed_email() {
        let (_, app) = test_app();
        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "email": "not-an-email", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_checks_credentials_and_token_identity() {
        let (state, app) = test_app();
        let (_, user) = register(&app, "a@x.com", "pw1").await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@x.com", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let claims = JwtKeys::from_ref(&state)
            .verify(body["token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.sub.to_string(), user["id"].as_str().unwrap());
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn me_returns_the_stored_record() {
        let (_, app) = test_app();
        let (token, user) = register(&app, "a@x.com", "pw1").await;

        let (status, body) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], user["id"]);
        assert_eq!(body["email"], "a@x.com");
        assert_eq!(body["created_at"], user["created_at"]);
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn bad_tokens_are_rejected_distinctly() {
        let (state, app) = test_app();

        let (status, body) = send(&app, "GET", "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Not authenticated");

        let (status, body) = send(&app, "GET", "/api/auth/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid token");

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let expired = Claims {
            sub: Uuid::new_v4(),
            email: "a@x.com".into(),
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
        };
        let keys = JwtKeys::from_ref(&state);
        let token = encode(&Header::default(), &expired, &keys.encoding).unwrap();
        let (status, body) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Token has expired");
    }

    #[tokio::test]
    async fn create_requires_auth_and_stamps_owner_from_token() {
        let (_, app) = test_app();
        let (status, _) = send(&app, "POST", "/api/markers", None, Some(pothole_body())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (token, user) = register(&app, "a@x.com", "pw1").await;
        let mut body = pothole_body();
        // Client-supplied owner fields must be ignored.
        body["user_id"] = json!("11111111-1111-1111-1111-111111111111");
        body["user_email"] = json!("attacker@x.com");

        let marker = create_marker(&app, &token, body).await;
        assert_eq!(marker["user_id"], user["id"]);
        assert_eq!(marker["user_email"], "a@x.com");
        assert_eq!(marker["category"], "obstacle");
        assert_eq!(marker["image"], Value::Null);
    }

    #[tokio::test]
    async fn create_rejects_unknown_category() {
        let (_, app) = test_app();
        let (token, _) = register(&app, "a@x.com", "pw1").await;
        let mut body = pothole_body();
        body["category"] = json!("sinkhole");
        let (status, _) = send(&app, "POST", "/api/markers", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_is_public_filters_and_round_trips() {
        let (_, app) = test_app();
        let (token, _) = register(&app, "a@x.com", "pw1").await;

        let created = create_marker(&app, &token, pothole_body()).await;
        let mut event = pothole_body();
        event["title"] = json!("Street dance");
        event["category"] = json!("event");
        create_marker(&app, &token, event).await;

        let (status, all) = send(&app, "GET", "/api/markers", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (status, obstacles) =
            send(&app, "GET", "/api/markers?category=obstacle", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let obstacles = obstacles.as_array().unwrap();
        assert_eq!(obstacles.len(), 1);
        // Every public field survives the round trip untouched.
        assert_eq!(obstacles[0], created);

        let (status, none) = send(&app, "GET", "/api/markers?category=alert", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(none.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn partial_update_touches_only_supplied_fields() {
        let (_, app) = test_app();
        let (token, _) = register(&app, "a@x.com", "pw1").await;
        let mut body = pothole_body();
        body["image"] = json!("base64-blob");
        let created = create_marker(&app, &token, body).await;
        let id = created["id"].as_str().unwrap();

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/markers/{}", id),
            Some(&token),
            Some(json!({ "title": "Pothole fixed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Pothole fixed");
        assert_eq!(updated["description"], created["description"]);
        assert_eq!(updated["category"], created["category"]);
        assert_eq!(updated["latitude"], created["latitude"]);
        assert_eq!(updated["longitude"], created["longitude"]);
        assert_eq!(updated["image"], created["image"]);
        assert_eq!(updated["created_at"], created["created_at"]);
        assert!(parse_ts(&updated["updated_at"]) > parse_ts(&created["updated_at"]));

        // An explicit null is a supplied value and clears the image.
        let (status, cleared) = send(
            &app,
            "PUT",
            &format!("/api/markers/{}", id),
            Some(&token),
            Some(json!({ "image": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["image"], Value::Null);
        assert_eq!(cleared["title"], "Pothole fixed");
    }

    #[tokio::test]
    async fn update_enforces_existence_ownership_and_category() {
        let (_, app) = test_app();
        let (owner, _) = register(&app, "a@x.com", "pw1").await;
        let (other, _) = register(&app, "b@x.com", "pw2").await;
        let created = create_marker(&app, &owner, pothole_body()).await;
        let id = created["id"].as_str().unwrap();

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/markers/{}", Uuid::new_v4()),
            Some(&owner),
            Some(json!({ "title": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/markers/not-a-uuid",
            Some(&owner),
            Some(json!({ "title": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/markers/{}", id),
            Some(&other),
            Some(json!({ "title": "hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/markers/{}", id),
            Some(&owner),
            Some(json!({ "category": "sinkhole" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_marker_lifecycle() {
        let (_, app) = test_app();
        let (t1, _) = register(&app, "a@x.com", "pw1").await;
        let (t2, _) = register(&app, "b@x.com", "pw2").await;

        let created = create_marker(&app, &t1, pothole_body()).await;
        let id = created["id"].as_str().unwrap().to_string();

        let (_, obstacles) =
            send(&app, "GET", "/api/markers?category=obstacle", None, None).await;
        assert!(obstacles
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["id"] == created["id"]));

        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/api/markers/{}", id),
            Some(&t1),
            Some(json!({ "title": "Pothole fixed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Pothole fixed");
        assert_eq!(updated["category"], "obstacle");

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/markers/{}", id),
            Some(&t2),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, ack) = send(
            &app,
            "DELETE",
            &format!("/api/markers/{}", id),
            Some(&t1),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["message"], "Marker deleted successfully");

        let (_, remaining) = send(&app, "GET", "/api/markers", None, None).await;
        assert!(remaining
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["id"].as_str() != Some(id.as_str())));

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/markers/{}", id),
            Some(&t1),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
