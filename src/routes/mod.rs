mod health;
mod predict;

use crate::{model_service::ModelService, server::SharedState, state::State};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService, S: State>() -> Router<SharedState<M, S>> {
    Router::new()
        .route("/predict", post(predict::predict))
        .route("/health", get(health::healthcheck))
}
