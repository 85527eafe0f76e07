use std::fmt;

use crate::config::Config;

/// Phase 2 rule that denied a request. Variants are declared in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialReason {
    DepartmentNotAuthorized,
    IncompatibleModule,
    QuotaExceeded,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DepartmentNotAuthorized => "department not authorized for this module",
            Self::IncompatibleModule => "incompatible with an already-active module",
            Self::QuotaExceeded => "active module limit reached",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied(DenialReason),
}

impl ApprovalDecision {
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }
}

/// Phase 1 failure. The submission is rejected and nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("modules not found")]
    ModulesNotFound,

    #[error("module '{0}' is not active")]
    ModuleInactive(String),

    #[error("active request already exists for module: {0}")]
    ActiveRequestExists(String),

    #[error("user already has access to module: {0}")]
    AlreadyHasAccess(String),
}

/// Quota configuration for the business rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRules {
    pub elevated_department: String,
    pub default_quota: usize,
    pub elevated_quota: usize,
}

impl PolicyRules {
    pub fn quota_for(&self, department: &str) -> usize {
        if department == self.elevated_department {
            self.elevated_quota
        } else {
            self.default_quota
        }
    }
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self {
            elevated_department: "TI".into(),
            default_quota: 5,
            elevated_quota: 10,
        }
    }
}

impl From<&Config> for PolicyRules {
    fn from(config: &Config) -> Self {
        Self {
            elevated_department: config.elevated_department.clone(),
            default_quota: config.default_quota,
            elevated_quota: config.elevated_quota,
        }
    }
}
