use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{auth, bookings, cars, cities, rides, users};
use crate::middleware::auth::{auth_middleware, require_admin};
use crate::middleware::rate_limit::{create_account_governor, create_public_governor};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // IP-based governor for anonymous routes
    let public_governor = create_public_governor();
    // User-based governor for signed-in routes
    let account_governor = create_account_governor();

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Browsing: ride search, ride detail, cities
    let public_routes = Router::new()
        .route("/rides", get(rides::search_rides))
        .route("/rides/{id}", get(rides::get_ride))
        .route("/cities", get(cities::list_cities))
        .layer(public_governor);

    // Any signed-in role. Ownership is decided per record by the policy resolver.
    let account_routes = Router::new()
        .route("/profile", get(users::profile))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/cars", get(cars::list_cars).post(cars::create_car))
        .route(
            "/cars/{id}",
            get(cars::get_car)
                .put(cars::update_car)
                .delete(cars::delete_car),
        )
        .route("/rides", get(rides::list_my_rides).post(rides::create_ride))
        .route(
            "/rides/{id}",
            put(rides::update_ride).delete(rides::delete_ride),
        )
        .route(
            "/bookings",
            get(bookings::my_bookings).post(bookings::create_booking),
        )
        .route(
            "/bookings/{id}",
            delete(bookings::cancel_booking),
        )
        .layer(account_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Back office (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/drivers", get(users::list_drivers))
        .route("/cities", post(cities::create_city))
        .route("/cities/{id}", delete(cities::delete_city))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes)
        .nest("/api/account", account_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
}
