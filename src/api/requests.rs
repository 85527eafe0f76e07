use std::collections::BTreeSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::helpers::ListResponse;
use crate::auth::middleware::AuthUser;
use crate::catalog::ModuleRef;
use crate::error::ApiError;
use crate::requests::types::{
    AccessRequest, HistoryEntry, NewRequest, PageRequest, RequestFilter, RequestStatus,
};
use crate::store::AppState;
use crate::validation;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub module_ids: Vec<Uuid>,
    pub justification: String,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsParams {
    pub text: Option<String>,
    pub status: Option<String>,
    pub urgent: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl ListRequestsParams {
    fn filter(&self) -> Result<RequestFilter, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(|s| s.to_uppercase().parse::<RequestStatus>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        Ok(RequestFilter {
            text: self
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned),
            status,
            urgent: self.urgent,
            from: self.from,
            to: self.to,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RequestSummary {
    pub id: Uuid,
    pub protocol: String,
    pub modules: Vec<ModuleRef>,
    pub status: RequestStatus,
    pub urgent: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AccessRequest> for RequestSummary {
    fn from(r: AccessRequest) -> Self {
        Self {
            id: r.id,
            protocol: r.protocol,
            modules: r.modules,
            status: r.status,
            urgent: r.urgent,
            created_at: r.created_at,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestDetail {
    pub id: Uuid,
    pub protocol: String,
    pub modules: Vec<ModuleRef>,
    pub justification: String,
    pub urgent: bool,
    pub status: RequestStatus,
    pub denial_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub origin_request_id: Option<Uuid>,
    pub history: Vec<HistoryEntry>,
}

impl From<AccessRequest> for RequestDetail {
    fn from(r: AccessRequest) -> Self {
        Self {
            id: r.id,
            protocol: r.protocol,
            modules: r.modules,
            justification: r.justification,
            urgent: r.urgent,
            status: r.status,
            denial_reason: r.denial_reason,
            cancellation_reason: r.cancellation_reason,
            created_at: r.created_at,
            expires_at: r.expires_at,
            origin_request_id: r.origin_request_id,
            history: r.history,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/requests", get(list_requests).post(create_request))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/cancel", put(cancel_request))
        .route("/api/requests/{id}/renew", post(renew_request))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tracing::instrument(skip(state, auth, body), fields(email = %auth.email), err)]
async fn create_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let justification = body.justification.trim();
    validation::check_justification(justification)?;

    let new = NewRequest {
        module_ids: body.module_ids.into_iter().collect::<BTreeSet<_>>(),
        justification: justification.to_owned(),
        urgent: body.urgent,
    };
    let outcome = state.requests.create(&auth.email, new).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

#[tracing::instrument(skip(state, auth, params), fields(email = %auth.email), err)]
async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ListRequestsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = params.filter()?;
    let page = PageRequest::new(params.page, params.size);

    let page = state.requests.list(&auth.email, &filter, page).await?;
    Ok(Json(ListResponse::from_page(page, RequestSummary::from)))
}

#[tracing::instrument(skip(state, auth), fields(email = %auth.email, %id), err)]
async fn get_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.requests.detail(id, &auth.email).await?;
    Ok(Json(RequestDetail::from(request)))
}

#[tracing::instrument(skip(state, auth, body), fields(email = %auth.email, %id), err)]
async fn cancel_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelBody>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = body.reason.trim();
    validation::check_cancel_reason(reason)?;

    state.requests.cancel(id, &auth.email, reason).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state, auth), fields(email = %auth.email, %id), err)]
async fn renew_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.requests.renew(id, &auth.email).await?;
    Ok(Json(outcome))
}
