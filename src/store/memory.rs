use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AccessStore, UnitOfWork};
use crate::catalog::Module;
use crate::requests::types::{
    AccessRequest, HistoryEntry, Page, PageRequest, RequestFilter, RequestStatus,
};
use crate::users::User;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    modules: HashMap<Uuid, Module>,
    requests: HashMap<Uuid, AccessRequest>,
    protocol_seq: i64,
}

impl MemoryState {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn owned_request(&self, id: Uuid, user_id: Uuid) -> Option<&AccessRequest> {
        self.requests.get(&id).filter(|r| r.user_id == user_id)
    }
}

/// In-memory [`AccessStore`] for tests and local runs. A unit of work holds
/// the store-wide lock and edits a private copy, swapped in on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_module(&self, module: Module) {
        self.state.lock().await.modules.insert(module.id, module);
    }

    pub async fn user(&self, id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&id).cloned()
    }

    pub async fn request(&self, id: Uuid) -> Option<AccessRequest> {
        self.state.lock().await.requests.get(&id).cloned()
    }

    pub async fn request_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnit { guard, work }))
    }

    async fn find_user(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.state.lock().await.user_by_email(email).cloned())
    }

    async fn find_request(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<AccessRequest>> {
        Ok(self.state.lock().await.owned_request(id, user_id).cloned())
    }

    async fn search_requests(
        &self,
        user_id: Uuid,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<AccessRequest>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&AccessRequest> = state
            .requests
            .values()
            .filter(|r| r.user_id == user_id && filter.matches(r))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = i64::try_from(matching.len())?;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset())?)
            .take(usize::try_from(page.size)?)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page: page.page,
            size: page.size,
        })
    }

    async fn list_active_modules(&self) -> anyhow::Result<Vec<Module>> {
        let state = self.state.lock().await;
        let mut modules: Vec<Module> = state
            .modules
            .values()
            .filter(|m| m.is_active)
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }
}

struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

impl MemoryUnit {
    fn request_mut(&mut self, id: Uuid) -> anyhow::Result<&mut AccessRequest> {
        self.work
            .requests
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("request {id} not in store"))
    }

    fn user_mut(&mut self, id: Uuid) -> anyhow::Result<&mut User> {
        self.work
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not in store"))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_user(&mut self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.work.user_by_email(email).cloned())
    }

    async fn find_modules(&mut self, ids: &BTreeSet<Uuid>) -> anyhow::Result<Vec<Module>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.work.modules.get(id).cloned())
            .collect())
    }

    async fn active_request_modules(
        &mut self,
        user_id: Uuid,
        excluding: Option<Uuid>,
    ) -> anyhow::Result<BTreeSet<Uuid>> {
        Ok(self
            .work
            .requests
            .values()
            .filter(|r| {
                r.user_id == user_id
                    && r.status == RequestStatus::Active
                    && Some(r.id) != excluding
            })
            .flat_map(AccessRequest::module_ids)
            .collect())
    }

    async fn next_protocol_sequence(&mut self) -> anyhow::Result<i64> {
        self.work.protocol_seq += 1;
        Ok(self.work.protocol_seq)
    }

    async fn find_request(
        &mut self,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<AccessRequest>> {
        Ok(self.work.owned_request(id, user_id).cloned())
    }

    async fn insert_request(&mut self, request: &AccessRequest) -> anyhow::Result<()> {
        if self.work.requests.contains_key(&request.id) {
            anyhow::bail!("request {} already exists", request.id);
        }
        self.work.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update_request(&mut self, request: &AccessRequest) -> anyhow::Result<()> {
        let stored = self.request_mut(request.id)?;
        stored.status = request.status;
        stored.cancellation_reason.clone_from(&request.cancellation_reason);
        stored.origin_request_id = request.origin_request_id;
        Ok(())
    }

    async fn append_history(
        &mut self,
        request_id: Uuid,
        entry: &HistoryEntry,
    ) -> anyhow::Result<()> {
        self.request_mut(request_id)?.history.push(entry.clone());
        Ok(())
    }

    async fn grant_modules(&mut self, user_id: Uuid, ids: &BTreeSet<Uuid>) -> anyhow::Result<()> {
        self.user_mut(user_id)?.active_modules.extend(ids.iter().copied());
        Ok(())
    }

    async fn revoke_modules(
        &mut self,
        user_id: Uuid,
        ids: &BTreeSet<Uuid>,
    ) -> anyhow::Result<()> {
        self.user_mut(user_id)?
            .active_modules
            .retain(|id| !ids.contains(id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let Self { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
