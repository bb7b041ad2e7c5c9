use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use rand::distributions::{Alphanumeric, DistString};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ride_share_backend::{
    authz::PolicyTable,
    config::Config,
    db,
    entities::user::{self, UserRole},
    middleware::rate_limit::log_request,
    routes,
    utils::password::hash_password,
    AppState,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ride_share_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    let policy = match &config.policy_file {
        Some(path) => {
            let table = PolicyTable::load(path).expect("Failed to load policy file");
            tracing::info!(path = %path, "Loaded role policy");
            table
        }
        None => PolicyTable::standard(),
    };

    // Connect to database
    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    // Run migrations
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    seed_admin(&db, &config).await;

    let state = AppState {
        db,
        config: config.clone(),
        policy: Arc::new(policy),
    };

    let app = routes::create_router(state)
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the IP rate limiter and request logging
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

/// Seed the admin account if it doesn't exist
async fn seed_admin(db: &sea_orm::DatabaseConnection, config: &Config) {
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&config.admin_email))
        .one(db)
        .await
        .expect("Failed to check for admin");

    if existing.is_some() {
        return;
    }

    let password = match &config.admin_password {
        Some(password) => password.clone(),
        None => {
            let generated = Alphanumeric.sample_string(&mut rand::thread_rng(), 20);
            tracing::warn!(
                email = %config.admin_email,
                password = %generated,
                "ADMIN_PASSWORD not set, generated a password for the admin account"
            );
            generated
        }
    };

    let admin = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Admin".to_string()),
        email: Set(config.admin_email.clone()),
        password_hash: Set(hash_password(&password).expect("Failed to hash admin password")),
        role: Set(UserRole::Admin),
        validated: Set(true),
        image_url: Set(None),
        ..Default::default()
    };

    admin.insert(db).await.expect("Failed to create admin");
    tracing::info!("Admin account created: {}", config.admin_email);
}
