use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

/// A unit of grantable access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub allowed_departments: BTreeSet<String>,
    /// Declared on this module only. The inverse edge may be missing.
    pub incompatible_with: BTreeSet<Uuid>,
}

impl Module {
    pub fn allows_department(&self, department: &str) -> bool {
        self.allowed_departments.contains(department)
    }

    /// Whether the pair is incompatible in either declaration direction.
    pub fn conflicts_with(&self, other: &Module) -> bool {
        self.id != other.id
            && (self.incompatible_with.contains(&other.id)
                || other.incompatible_with.contains(&self.id))
    }

    pub fn to_ref(&self) -> ModuleRef {
        ModuleRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Id and name of a module, as carried by a request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ModuleRef {
    pub id: Uuid,
    pub name: String,
}
