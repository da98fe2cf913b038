use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::Simulator;

mod http;

pub struct Api {
    simulator: Arc<Simulator>,
}

impl Api {
    pub fn new(simulator: Arc<Simulator>) -> Self {
        Self { simulator }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(http::healthz))
            .route("/address", get(http::address))
            .route("/submit", post(http::submit))
            .route("/account/:owner", get(http::get_account))
            .route("/session/:owner", get(http::get_session))
            .route("/meta/:owner", get(http::get_meta))
            .route("/decrypt", post(http::decrypt))
            .layer(TraceLayer::new_for_http())
            .with_state(self.simulator.clone())
    }
}
