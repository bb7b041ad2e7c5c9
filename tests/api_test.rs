//! Router-level tests. The database handle is disconnected, so every request
//! here is settled by the auth, policy and validation layers, or proves that
//! storage failures surface as a generic error.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use ride_share_backend::{
    authz::{Action, PolicyTable, Resource, Scope},
    config::Config,
    entities::user::{self, UserRole},
    routes,
    utils::jwt::create_token,
    AppState,
};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".into(),
        database_max_connections: 1,
        jwt_secret: SECRET.into(),
        jwt_expiration_hours: 1,
        server_host: "127.0.0.1".into(),
        server_port: 0,
        admin_email: "admin@test.local".into(),
        admin_password: None,
        policy_file: None,
    }
}

fn app_with_policy(policy: PolicyTable) -> Router {
    routes::create_router(AppState {
        db: DatabaseConnection::Disconnected,
        config: test_config(),
        policy: Arc::new(policy),
    })
}

fn app() -> Router {
    app_with_policy(PolicyTable::standard())
}

fn token_for(role: UserRole) -> String {
    let user = user::Model {
        id: Uuid::new_v4(),
        name: "Test".into(),
        email: "test@example.com".into(),
        password_hash: String::new(),
        role,
        validated: false,
        image_url: None,
        created_at: Utc::now().into(),
    };
    create_token(&user, SECRET, 1).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let mut request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    // Normally supplied by `into_make_service_with_connect_info`
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    request
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (status, body) = send(app(), request(Method::GET, "/api/account/cars", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn forged_token_is_unauthorized() {
    let (status, _) = send(
        app(),
        request(Method::GET, "/api/account/profile", Some("not.a.jwt"), None),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_other_roles() {
    for role in [UserRole::User, UserRole::Driver] {
        let token = token_for(role);
        let (status, body) = send(
            app(),
            request(Method::GET, "/api/admin/users", Some(&token), None),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Admin access required");
    }
}

#[tokio::test]
async fn database_failure_is_reported_generically() {
    let token = token_for(UserRole::Admin);
    let (status, body) = send(
        app(),
        request(Method::GET, "/api/admin/users", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));
}

#[tokio::test]
async fn ride_payload_is_validated_per_field() {
    let token = token_for(UserRole::Driver);
    let payload = json!({
        "car_id": Uuid::new_v4(),
        "departure_city_id": 1,
        "arrival_city_id": 2,
        "collection_point": "",
        "drop_off_point": "Vieux-Port",
        "date": "2030-07-01",
        "hour_of_departure": "25:00",
        "hour_of_arrival": "12:00",
        "price": "18.00",
        "available_seats": 2
    });

    let (status, body) = send(
        app(),
        request(Method::POST, "/api/account/rides", Some(&token), Some(payload)),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"].get("hour_of_departure").is_some());
    assert!(body["fields"].get("collection_point").is_some());
    assert!(body["fields"].get("hour_of_arrival").is_none());
}

#[tokio::test]
async fn driver_cannot_create_car_for_someone_else() {
    let token = token_for(UserRole::Driver);
    let payload = json!({
        "driver_id": Uuid::new_v4(),
        "brand": "Peugeot",
        "model": "308",
        "year": 2019,
        "registration": "GH-456-IJ",
        "seats": 4,
        "comfort": "standard"
    });

    let (status, _) = send(
        app(),
        request(Method::POST, "/api/account/cars", Some(&token), Some(payload)),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn policy_table_controls_listing_access() {
    let policy = PolicyTable::standard().grant(
        UserRole::User,
        Resource::Car,
        &[Action::Read],
        Scope::Denied,
    );
    let token = token_for(UserRole::User);

    let (status, body) = send(
        app_with_policy(policy),
        request(Method::GET, "/api/account/cars", Some(&token), None),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Car access denied");
}

#[tokio::test]
async fn unknown_sort_key_is_a_bad_request() {
    let (status, body) = send(
        app(),
        request(Method::GET, "/api/rides?sort=seats", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown sort key 'seats'");
}

#[tokio::test]
async fn unknown_time_filter_is_a_bad_request() {
    let (status, _) = send(
        app(),
        request(Method::GET, "/api/rides?filters=before-6,noon", None, None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
