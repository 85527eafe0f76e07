use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::RequestError;
use crate::catalog::{Module, ModuleRef};
use crate::config::Config;
use crate::policy::ApprovalDecision;

pub const MIN_MODULES: usize = 1;
pub const MAX_MODULES: usize = 3;

const APPROVED_ENTRY: &str = "Solicitação aprovada automaticamente";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// `Denied` and `Cancelled` are terminal. The only transition is
/// `Active -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Active,
    Denied,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Denied => "DENIED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "DENIED" => Ok(Self::Denied),
            "CANCELLED" => Ok(Self::Cancelled),
            other => anyhow::bail!("unknown request status: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub id: Uuid,
    pub protocol: String,
    pub user_id: Uuid,
    /// Sorted by name. Fixed at creation.
    pub modules: Vec<ModuleRef>,
    pub justification: String,
    pub urgent: bool,
    pub status: RequestStatus,
    pub denial_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Set on requests created by renewal. Plain id, not an owning link.
    pub origin_request_id: Option<Uuid>,
    /// Append-only, chronological.
    pub history: Vec<HistoryEntry>,
}

/// Fields fixed by the caller when submitting a request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub module_ids: BTreeSet<Uuid>,
    pub justification: String,
    pub urgent: bool,
}

impl AccessRequest {
    /// Build a request already resolved by the policy engine.
    pub fn resolve(
        protocol: String,
        user_id: Uuid,
        modules: &[Module],
        new: NewRequest,
        decision: ApprovalDecision,
        now: DateTime<Utc>,
        terms: &Terms,
    ) -> Self {
        let mut refs: Vec<ModuleRef> = modules.iter().map(Module::to_ref).collect();
        refs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let mut request = Self {
            id: Uuid::now_v7(),
            protocol,
            user_id,
            modules: refs,
            justification: new.justification,
            urgent: new.urgent,
            status: RequestStatus::Active,
            denial_reason: None,
            cancellation_reason: None,
            created_at: now,
            expires_at: None,
            origin_request_id: None,
            history: Vec::new(),
        };

        match decision {
            ApprovalDecision::Approved => {
                request.expires_at = Some(now + terms.expiration);
                request.record(APPROVED_ENTRY.to_owned(), now);
            }
            ApprovalDecision::Denied(reason) => {
                request.status = RequestStatus::Denied;
                request.denial_reason = Some(reason.to_string());
                request.record(format!("Solicitação negada: {reason}"), now);
            }
        }

        request
    }

    /// `Active -> Cancelled`. Returns the history entry appended.
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<HistoryEntry, RequestError> {
        if self.status != RequestStatus::Active {
            return Err(RequestError::CancelNotActive);
        }
        self.status = RequestStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_owned());
        Ok(self.record(format!("Solicitação cancelada: {reason}"), now))
    }

    /// Renewal opens `renewal_window` before expiration, inclusive.
    pub fn check_renewable(&self, now: DateTime<Utc>, terms: &Terms) -> Result<(), RequestError> {
        if self.status != RequestStatus::Active {
            return Err(RequestError::RenewNotActive);
        }
        let expires_at = self.expires_at.ok_or(RequestError::NoExpiration)?;
        if now < expires_at - terms.renewal_window {
            return Err(RequestError::OutsideRenewalWindow(
                terms.renewal_window.num_days(),
            ));
        }
        Ok(())
    }

    pub fn module_ids(&self) -> BTreeSet<Uuid> {
        self.modules.iter().map(|m| m.id).collect()
    }

    fn record(&mut self, description: String, at: DateTime<Utc>) -> HistoryEntry {
        // Keep the log chronological even if the clock steps backwards.
        let at = self
            .history
            .last()
            .map_or(at, |last| at.max(last.recorded_at));
        let entry = HistoryEntry {
            description,
            recorded_at: at,
        };
        self.history.push(entry.clone());
        entry
    }
}

// ---------------------------------------------------------------------------
// Lifetime terms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terms {
    pub expiration: Duration,
    pub renewal_window: Duration,
}

impl Default for Terms {
    fn default() -> Self {
        Self {
            expiration: Duration::days(180),
            renewal_window: Duration::days(30),
        }
    }
}

impl From<&Config> for Terms {
    fn from(config: &Config) -> Self {
        Self {
            expiration: Duration::days(config.expiration_days),
            renewal_window: Duration::days(config.renewal_window_days),
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    /// Case-insensitive substring of protocol, module name or justification.
    pub text: Option<String>,
    pub status: Option<RequestStatus>,
    pub urgent: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RequestFilter {
    pub fn matches(&self, request: &AccessRequest) -> bool {
        if let Some(text) = self.text.as_deref() {
            let needle = text.to_lowercase();
            let hit = request.protocol.to_lowercase().contains(&needle)
                || request.justification.to_lowercase().contains(&needle)
                || request
                    .modules
                    .iter()
                    .any(|m| m.name.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        self.status.is_none_or(|s| s == request.status)
            && self.urgent.is_none_or(|u| u == request.urgent)
            && self.from.is_none_or(|from| request.created_at >= from)
            && self.to.is_none_or(|to| request.created_at <= to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based.
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    pub const DEFAULT_SIZE: i64 = 10;
    pub const MAX_SIZE: i64 = 100;

    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(0).max(0),
            size: size
                .unwrap_or(Self::DEFAULT_SIZE)
                .clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(self) -> i64 {
        self.page.saturating_mul(self.size)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of `create` and `renew`. A denial is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    pub message: String,
    pub protocol: String,
    pub request_id: Uuid,
    pub status: RequestStatus,
}

impl From<&AccessRequest> for CreateOutcome {
    fn from(request: &AccessRequest) -> Self {
        let message = match request.denial_reason.as_deref() {
            Some(reason) => format!("Request denied. Reason: {reason}"),
            None => format!(
                "Request created successfully! Protocol: {}. Your access is already available!",
                request.protocol
            ),
        };
        Self {
            message,
            protocol: request.protocol.clone(),
            request_id: request.id,
            status: request.status,
        }
    }
}
