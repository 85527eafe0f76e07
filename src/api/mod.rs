pub mod helpers;
pub mod modules;
pub mod requests;

use axum::Router;

use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(requests::router())
        .merge(modules::router())
}
