pub mod types;

use std::collections::BTreeSet;

use uuid::Uuid;

pub use types::{ApprovalDecision, DenialReason, PolicyRules, Rejection};

use crate::catalog::Module;
use crate::users::User;

/// Phase 1. A failure rejects the submission outright.
///
/// `requested` is the deduplicated id set the caller asked for,
/// `resolved` the modules the catalog returned for it, and
/// `with_active_request` the module ids already held by another ACTIVE
/// request of the same user.
pub fn check_preconditions(
    requested: &BTreeSet<Uuid>,
    resolved: &[Module],
    user: &User,
    with_active_request: &BTreeSet<Uuid>,
) -> Result<(), Rejection> {
    if resolved.len() != requested.len() || resolved.iter().any(|m| !requested.contains(&m.id)) {
        return Err(Rejection::ModulesNotFound);
    }

    if let Some(module) = resolved.iter().find(|m| !m.is_active) {
        return Err(Rejection::ModuleInactive(module.name.clone()));
    }

    if let Some(module) = resolved
        .iter()
        .find(|m| with_active_request.contains(&m.id))
    {
        return Err(Rejection::ActiveRequestExists(module.name.clone()));
    }

    if let Some(module) = resolved.iter().find(|m| user.has_module(m.id)) {
        return Err(Rejection::AlreadyHasAccess(module.name.clone()));
    }

    Ok(())
}

/// Phase 2. Rules run in a fixed order and the first failure wins. A
/// failure is a valid outcome, persisted as a denied request.
/// `active` are the catalog entries of the user's active modules; their
/// declared incompatibilities count as much as the requested ones'.
pub fn evaluate(
    user: &User,
    requested: &[Module],
    active: &[Module],
    rules: &PolicyRules,
) -> ApprovalDecision {
    if !department_eligible(user, requested) {
        return ApprovalDecision::Denied(DenialReason::DepartmentNotAuthorized);
    }
    if has_incompatibility(user, requested, active) {
        return ApprovalDecision::Denied(DenialReason::IncompatibleModule);
    }
    if exceeds_quota(user, requested.len(), rules) {
        return ApprovalDecision::Denied(DenialReason::QuotaExceeded);
    }
    ApprovalDecision::Approved
}

fn department_eligible(user: &User, requested: &[Module]) -> bool {
    requested
        .iter()
        .all(|m| m.allows_department(&user.department))
}

fn has_incompatibility(user: &User, requested: &[Module], active: &[Module]) -> bool {
    let declared_by_requested = requested
        .iter()
        .any(|m| !m.incompatible_with.is_disjoint(&user.active_modules));
    let declared_by_active = active
        .iter()
        .any(|a| requested.iter().any(|m| a.incompatible_with.contains(&m.id)));
    if declared_by_requested || declared_by_active {
        return true;
    }

    requested.iter().enumerate().any(|(i, a)| {
        requested[i + 1..]
            .iter()
            .any(|b| a.conflicts_with(b))
    })
}

fn exceeds_quota(user: &User, requested: usize, rules: &PolicyRules) -> bool {
    user.active_count() + requested > rules.quota_for(&user.department)
}
