use std::collections::BTreeSet;

use uuid::Uuid;

/// An employee who can request modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub department: String,
    pub is_active: bool,
    /// Modules currently granted. Only the request lifecycle mutates this.
    pub active_modules: BTreeSet<Uuid>,
}

impl User {
    pub fn has_module(&self, module_id: Uuid) -> bool {
        self.active_modules.contains(&module_id)
    }

    pub fn active_count(&self) -> usize {
        self.active_modules.len()
    }
}
