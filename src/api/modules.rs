use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::catalog::Module;
use crate::error::ApiError;
use crate::store::AppState;

#[derive(Debug, Serialize)]
pub struct ModuleResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub allowed_departments: Vec<String>,
    pub incompatible_with: Vec<Uuid>,
}

impl From<Module> for ModuleResponse {
    fn from(m: Module) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            allowed_departments: m.allowed_departments.into_iter().collect(),
            incompatible_with: m.incompatible_with.into_iter().collect(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/modules", get(list_modules))
}

#[tracing::instrument(skip(state, _auth), err)]
async fn list_modules(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<ModuleResponse>>, ApiError> {
    let modules = state.store.list_active_modules().await?;
    Ok(Json(modules.into_iter().map(ModuleResponse::from).collect()))
}
