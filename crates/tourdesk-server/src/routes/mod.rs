//! HTTP routes, one module per resource.

mod agencies;
mod catalog;
mod clients;
mod funnels;
mod proposals;
mod reports;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method};
use axum::routing::{get, patch, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::extract::{AGENCY_HEADER, USER_HEADER};
use crate::state::AppState;

/// Full API router over `state`
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(AGENCY_HEADER),
            HeaderName::from_static(USER_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(reports::health))
        .route("/agencies", post(agencies::create))
        .route("/agencies/me", get(agencies::current).patch(agencies::update))
        .route("/funnels", get(funnels::list).post(funnels::create))
        .route("/funnels/{id}", get(funnels::get).delete(funnels::delete))
        .route("/funnels/{id}/default", post(funnels::make_default))
        .route("/funnels/{id}/stages", post(funnels::add_stage))
        .route("/funnels/{id}/stages/order", put(funnels::reorder_stages))
        .route(
            "/funnels/{id}/stages/{stage}",
            patch(funnels::rename_stage).delete(funnels::remove_stage),
        )
        .route("/clients", get(clients::list).post(clients::create))
        .route(
            "/clients/{id}",
            get(clients::get).patch(clients::update).delete(clients::delete),
        )
        .route("/clients/{id}/stage", post(clients::move_to_stage))
        .route(
            "/catalog/base-items",
            get(catalog::list_base_items).post(catalog::create_base_item),
        )
        .route(
            "/catalog/base-items/{id}",
            get(catalog::get_base_item)
                .patch(catalog::update_base_item)
                .delete(catalog::deactivate_base_item),
        )
        .route(
            "/catalog/operator-items",
            get(catalog::list_operator_items).post(catalog::create_operator_item),
        )
        .route(
            "/catalog/operator-items/{id}",
            get(catalog::get_operator_item)
                .patch(catalog::update_operator_item)
                .delete(catalog::deactivate_operator_item),
        )
        .route("/proposals", get(proposals::list).post(proposals::create))
        .route("/proposals/expire", post(proposals::expire))
        .route("/proposals/{id}", get(proposals::get).patch(proposals::update))
        .route("/proposals/{id}/transition", post(proposals::transition))
        .route("/proposals/{id}/transitions", get(proposals::allowed_transitions))
        .route("/proposals/{id}/duplicate", post(proposals::duplicate))
        .route("/proposals/{id}/history", get(proposals::history))
        .route("/proposals/{id}/history/verify", get(proposals::verify_history))
        .route("/quote", post(reports::quote))
        .route("/dashboard", get(reports::dashboard))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
