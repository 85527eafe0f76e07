use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use super::error::RequestError;
use super::protocol;
use super::types::{
    AccessRequest, CreateOutcome, MAX_MODULES, MIN_MODULES, NewRequest, Page, PageRequest,
    RequestFilter, Terms,
};
use crate::clock::Clock;
use crate::policy::{self, PolicyRules};
use crate::store::{AccessStore, UnitOfWork};
use crate::users::User;

/// Request lifecycle: create, cancel and renew, each as one unit of work.
#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn AccessStore>,
    clock: Arc<dyn Clock>,
    rules: PolicyRules,
    terms: Terms,
}

impl RequestService {
    pub fn new(
        store: Arc<dyn AccessStore>,
        clock: Arc<dyn Clock>,
        rules: PolicyRules,
        terms: Terms,
    ) -> Self {
        Self {
            store,
            clock,
            rules,
            terms,
        }
    }

    /// Submit a request. Policy denial is returned as a successful outcome;
    /// only precondition failures are errors.
    #[tracing::instrument(
        skip(self, new),
        fields(%email, modules = new.module_ids.len(), urgent = new.urgent),
        err
    )]
    pub async fn create(&self, email: &str, new: NewRequest) -> Result<CreateOutcome, RequestError> {
        let mut uow = self.store.begin().await?;
        let user = lock_active_user(uow.as_mut(), email).await?;

        let request = self.submit(uow.as_mut(), &user, new, None).await?;
        uow.commit().await?;

        log_resolution(&request);
        Ok(CreateOutcome::from(&request))
    }

    /// `Active -> Cancelled`, revoking the request's modules.
    #[tracing::instrument(skip(self, reason), fields(%id, %email), err)]
    pub async fn cancel(&self, id: Uuid, email: &str, reason: &str) -> Result<(), RequestError> {
        let mut uow = self.store.begin().await?;
        let user = lock_active_user(uow.as_mut(), email).await?;
        let mut request = uow
            .find_request(id, user.id)
            .await?
            .ok_or(RequestError::RequestNotFound)?;

        let entry = request.cancel(reason, self.clock.now())?;
        let revoked = exclusively_held(uow.as_mut(), user.id, &request).await?;

        uow.update_request(&request).await?;
        uow.append_history(request.id, &entry).await?;
        uow.revoke_modules(user.id, &revoked).await?;
        uow.commit().await?;

        tracing::info!(protocol = %request.protocol, revoked = revoked.len(), "request cancelled");
        Ok(())
    }

    /// Revoke an expiring request's modules and resubmit them through the
    /// policy engine. The origin request keeps its status.
    #[tracing::instrument(skip(self), fields(%id, %email), err)]
    pub async fn renew(&self, id: Uuid, email: &str) -> Result<CreateOutcome, RequestError> {
        let mut uow = self.store.begin().await?;
        let mut user = lock_active_user(uow.as_mut(), email).await?;
        let origin = uow
            .find_request(id, user.id)
            .await?
            .ok_or(RequestError::RequestNotFound)?;

        origin.check_renewable(self.clock.now(), &self.terms)?;

        let revoked = exclusively_held(uow.as_mut(), user.id, &origin).await?;
        uow.revoke_modules(user.id, &revoked).await?;
        user.active_modules.retain(|m| !revoked.contains(m));

        let new = NewRequest {
            module_ids: origin.module_ids(),
            justification: origin.justification.clone(),
            urgent: false,
        };
        let renewed = self.submit(uow.as_mut(), &user, new, Some(origin.id)).await?;
        uow.commit().await?;

        tracing::info!(
            origin = %origin.protocol,
            protocol = %renewed.protocol,
            "request renewed"
        );
        log_resolution(&renewed);
        Ok(CreateOutcome::from(&renewed))
    }

    #[tracing::instrument(skip(self, filter), fields(%email), err)]
    pub async fn list(
        &self,
        email: &str,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<AccessRequest>, RequestError> {
        let user = self
            .store
            .find_user(email)
            .await?
            .ok_or(RequestError::UserNotFound)?;
        Ok(self.store.search_requests(user.id, filter, page).await?)
    }

    #[tracing::instrument(skip(self), fields(%id, %email), err)]
    pub async fn detail(&self, id: Uuid, email: &str) -> Result<AccessRequest, RequestError> {
        let user = self
            .store
            .find_user(email)
            .await?
            .ok_or(RequestError::UserNotFound)?;
        self.store
            .find_request(id, user.id)
            .await?
            .ok_or(RequestError::RequestNotFound)
    }

    /// Shared by create and renew. `origin` is the request being renewed;
    /// its own ACTIVE status does not block the resubmission.
    async fn submit(
        &self,
        uow: &mut dyn UnitOfWork,
        user: &User,
        new: NewRequest,
        origin: Option<Uuid>,
    ) -> Result<AccessRequest, RequestError> {
        let count = new.module_ids.len();
        if !(MIN_MODULES..=MAX_MODULES).contains(&count) {
            return Err(RequestError::InvalidModuleCount(count));
        }

        let modules = uow.find_modules(&new.module_ids).await?;
        let held = uow.active_request_modules(user.id, origin).await?;
        policy::check_preconditions(&new.module_ids, &modules, user, &held)?;

        let now = self.clock.now();
        let sequence = uow.next_protocol_sequence().await?;
        let active = uow.find_modules(&user.active_modules).await?;
        let decision = policy::evaluate(user, &modules, &active, &self.rules);

        let mut request = AccessRequest::resolve(
            protocol::generate(now, sequence),
            user.id,
            &modules,
            new,
            decision,
            now,
            &self.terms,
        );
        request.origin_request_id = origin;

        uow.insert_request(&request).await?;
        if decision.is_approved() {
            uow.grant_modules(user.id, &request.module_ids()).await?;
        }
        Ok(request)
    }
}

async fn lock_active_user(uow: &mut dyn UnitOfWork, email: &str) -> Result<User, RequestError> {
    uow.lock_user(email)
        .await?
        .filter(|u| u.is_active)
        .ok_or(RequestError::UserNotFound)
}

/// Modules of `request` not also granted through another ACTIVE request.
async fn exclusively_held(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    request: &AccessRequest,
) -> Result<BTreeSet<Uuid>, RequestError> {
    let others = uow.active_request_modules(user_id, Some(request.id)).await?;
    Ok(request
        .module_ids()
        .difference(&others)
        .copied()
        .collect())
}

fn log_resolution(request: &AccessRequest) {
    match request.denial_reason.as_deref() {
        Some(reason) => tracing::info!(protocol = %request.protocol, reason, "request denied"),
        None => tracing::info!(protocol = %request.protocol, "request approved"),
    }
}
