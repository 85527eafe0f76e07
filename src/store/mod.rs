pub mod bootstrap;
pub mod memory;
pub mod pool;
pub mod postgres;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::catalog::Module;
use crate::clock::Clock;
use crate::config::Config;
use crate::requests::RequestService;
use crate::requests::types::{AccessRequest, HistoryEntry, Page, PageRequest, RequestFilter};
use crate::users::User;

/// One lifecycle operation's worth of reads and writes. Nothing is visible
/// to other units until [`UnitOfWork::commit`]; dropping the unit rolls it
/// back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Load a user by email and hold it until the unit ends, serializing
    /// concurrent units for the same user.
    async fn lock_user(&mut self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_modules(&mut self, ids: &BTreeSet<Uuid>) -> anyhow::Result<Vec<Module>>;

    /// Module ids held by the user's ACTIVE requests, optionally skipping one.
    async fn active_request_modules(
        &mut self,
        user_id: Uuid,
        excluding: Option<Uuid>,
    ) -> anyhow::Result<BTreeSet<Uuid>>;

    async fn next_protocol_sequence(&mut self) -> anyhow::Result<i64>;

    async fn find_request(
        &mut self,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<AccessRequest>>;

    /// Persist a new request with its modules and initial history.
    async fn insert_request(&mut self, request: &AccessRequest) -> anyhow::Result<()>;

    /// Persist the mutable columns: status, cancellation reason, origin link.
    async fn update_request(&mut self, request: &AccessRequest) -> anyhow::Result<()>;

    async fn append_history(&mut self, request_id: Uuid, entry: &HistoryEntry)
    -> anyhow::Result<()>;

    async fn grant_modules(&mut self, user_id: Uuid, ids: &BTreeSet<Uuid>) -> anyhow::Result<()>;

    async fn revoke_modules(&mut self, user_id: Uuid, ids: &BTreeSet<Uuid>)
    -> anyhow::Result<()>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

/// Storage for users, the module catalog and access requests.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>>;

    async fn find_user(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_request(&self, id: Uuid, user_id: Uuid)
    -> anyhow::Result<Option<AccessRequest>>;

    /// Requests of one user, newest first.
    async fn search_requests(
        &self,
        user_id: Uuid,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<AccessRequest>>;

    /// Active catalog modules sorted by name.
    async fn list_active_modules(&self) -> anyhow::Result<Vec<Module>>;
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AccessStore>,
    pub requests: RequestService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn AccessStore>, clock: Arc<dyn Clock>, config: Config) -> Self {
        let requests = RequestService::new(
            store.clone(),
            clock,
            (&config).into(),
            (&config).into(),
        );
        Self {
            store,
            requests,
            config: Arc::new(config),
        }
    }
}
