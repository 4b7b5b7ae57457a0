mod handlers;

use crate::state::AppState;
use axum::{routing::put, Router};

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", put(handlers::update_profile))
}
