// src/routes.rs
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers;
use crate::pautas;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let agendas = Router::new()
        .route("/", get(handlers::list_agendas).post(handlers::create_agenda))
        .route("/{id}", get(handlers::get_agenda))
        .route("/{id}/session", post(handlers::open_session))
        .route("/{id}/votes", post(handlers::vote))
        .route("/{id}/results", get(handlers::results));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/agendas", agendas)
        .nest("/pautas", pautas::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
