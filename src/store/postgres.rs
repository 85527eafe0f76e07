use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{AccessStore, UnitOfWork};
use crate::catalog::{Module, ModuleRef};
use crate::requests::types::{AccessRequest, HistoryEntry, Page, PageRequest, RequestFilter};
use crate::users::User;

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    department: String,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: Uuid,
    name: String,
    description: String,
    is_active: bool,
    allowed_departments: Vec<String>,
    incompatible_with: Vec<Uuid>,
}

impl From<ModuleRow> for Module {
    fn from(row: ModuleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            allowed_departments: row.allowed_departments.into_iter().collect(),
            incompatible_with: row.incompatible_with.into_iter().collect(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    protocol: String,
    user_id: Uuid,
    justification: String,
    urgent: bool,
    status: String,
    denial_reason: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    origin_request_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct RequestModuleRow {
    request_id: Uuid,
    id: Uuid,
    name: String,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    request_id: Uuid,
    description: String,
    recorded_at: DateTime<Utc>,
}

const REQUEST_COLUMNS: &str = "r.id, r.protocol, r.user_id, r.justification, r.urgent, r.status, \
     r.denial_reason, r.cancellation_reason, r.created_at, r.expires_at, r.origin_request_id";

const MODULE_COLUMNS: &str =
    "id, name, description, is_active, allowed_departments, incompatible_with";

/// Shared by the count and page queries. `$2` is an escaped ILIKE pattern.
const SEARCH_FILTER: &str = r"
    r.user_id = $1
    AND ($2::text IS NULL
         OR r.protocol ILIKE $2
         OR r.justification ILIKE $2
         OR EXISTS (
             SELECT 1 FROM request_modules rm
             JOIN modules m ON m.id = rm.module_id
             WHERE rm.request_id = r.id AND m.name ILIKE $2))
    AND ($3::text IS NULL OR r.status = $3)
    AND ($4::boolean IS NULL OR r.urgent = $4)
    AND ($5::timestamptz IS NULL OR r.created_at >= $5)
    AND ($6::timestamptz IS NULL OR r.created_at <= $6)";

fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

// ---------------------------------------------------------------------------
// Queries shared by pool reads and transactions
// ---------------------------------------------------------------------------

async fn load_user(
    conn: &mut PgConnection,
    email: &str,
    for_update: bool,
) -> sqlx::Result<Option<User>> {
    let sql = if for_update {
        "SELECT id, email, name, department, is_active FROM users WHERE email = $1 FOR UPDATE"
    } else {
        "SELECT id, email, name, department, is_active FROM users WHERE email = $1"
    };
    let Some(row) = sqlx::query_as::<_, UserRow>(sql)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let active_modules: Vec<Uuid> =
        sqlx::query_scalar("SELECT module_id FROM user_modules WHERE user_id = $1")
            .bind(row.id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(Some(User {
        id: row.id,
        email: row.email,
        name: row.name,
        department: row.department,
        is_active: row.is_active,
        active_modules: active_modules.into_iter().collect(),
    }))
}

async fn load_request(
    conn: &mut PgConnection,
    id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<AccessRequest>> {
    let row = sqlx::query_as::<_, RequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM access_requests r WHERE r.id = $1 AND r.user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(assemble(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Attach modules and history to request rows, preserving row order.
async fn assemble(
    conn: &mut PgConnection,
    rows: Vec<RequestRow>,
) -> anyhow::Result<Vec<AccessRequest>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let module_rows = sqlx::query_as::<_, RequestModuleRow>(
        "SELECT rm.request_id, m.id, m.name
         FROM request_modules rm
         JOIN modules m ON m.id = rm.module_id
         WHERE rm.request_id = ANY($1)
         ORDER BY m.name, m.id",
    )
    .bind(ids.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    let history_rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT request_id, description, recorded_at
         FROM request_history
         WHERE request_id = ANY($1)
         ORDER BY recorded_at, id",
    )
    .bind(ids.as_slice())
    .fetch_all(&mut *conn)
    .await?;

    let mut modules: HashMap<Uuid, Vec<ModuleRef>> = HashMap::new();
    for m in module_rows {
        modules.entry(m.request_id).or_default().push(ModuleRef {
            id: m.id,
            name: m.name,
        });
    }

    let mut history: HashMap<Uuid, Vec<HistoryEntry>> = HashMap::new();
    for h in history_rows {
        history.entry(h.request_id).or_default().push(HistoryEntry {
            description: h.description,
            recorded_at: h.recorded_at,
        });
    }

    rows.into_iter()
        .map(|row| -> anyhow::Result<AccessRequest> {
            Ok(AccessRequest {
                id: row.id,
                protocol: row.protocol,
                user_id: row.user_id,
                modules: modules.remove(&row.id).unwrap_or_default(),
                justification: row.justification,
                urgent: row.urgent,
                status: row.status.parse()?,
                denial_reason: row.denial_reason,
                cancellation_reason: row.cancellation_reason,
                created_at: row.created_at,
                expires_at: row.expires_at,
                origin_request_id: row.origin_request_id,
                history: history.remove(&row.id).unwrap_or_default(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn find_user(&self, email: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        Ok(load_user(&mut *conn, email, false).await?)
    }

    async fn find_request(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<AccessRequest>> {
        let mut conn = self.pool.acquire().await?;
        load_request(&mut *conn, id, user_id).await
    }

    #[tracing::instrument(skip(self, filter), fields(%user_id), err)]
    async fn search_requests(
        &self,
        user_id: Uuid,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> anyhow::Result<Page<AccessRequest>> {
        let mut conn = self.pool.acquire().await?;
        let pattern = filter.text.as_deref().map(like_pattern);
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM access_requests r WHERE {SEARCH_FILTER}"
        ))
        .bind(user_id)
        .bind(pattern.as_deref())
        .bind(status)
        .bind(filter.urgent)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&mut *conn)
        .await?;

        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM access_requests r
             WHERE {SEARCH_FILTER}
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT $7 OFFSET $8"
        ))
        .bind(user_id)
        .bind(pattern.as_deref())
        .bind(status)
        .bind(filter.urgent)
        .bind(filter.from)
        .bind(filter.to)
        .bind(page.size)
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;

        let items = assemble(&mut *conn, rows).await?;
        Ok(Page {
            items,
            total,
            page: page.page,
            size: page.size,
        })
    }

    async fn list_active_modules(&self) -> anyhow::Result<Vec<Module>> {
        let rows = sqlx::query_as::<_, ModuleRow>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules WHERE is_active = true ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Module::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Unit of work
// ---------------------------------------------------------------------------

struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_user(&mut self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(load_user(&mut *self.tx, email, true).await?)
    }

    async fn find_modules(&mut self, ids: &BTreeSet<Uuid>) -> anyhow::Result<Vec<Module>> {
        let ids: Vec<Uuid> = ids.iter().copied().collect();
        let rows = sqlx::query_as::<_, ModuleRow>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules WHERE id = ANY($1)"
        ))
        .bind(ids.as_slice())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Module::from).collect())
    }

    async fn active_request_modules(
        &mut self,
        user_id: Uuid,
        excluding: Option<Uuid>,
    ) -> anyhow::Result<BTreeSet<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT rm.module_id
             FROM request_modules rm
             JOIN access_requests r ON r.id = rm.request_id
             WHERE r.user_id = $1
               AND r.status = 'ACTIVE'
               AND ($2::uuid IS NULL OR r.id <> $2)",
        )
        .bind(user_id)
        .bind(excluding)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn next_protocol_sequence(&mut self) -> anyhow::Result<i64> {
        let seq: i64 = sqlx::query_scalar("SELECT nextval('request_protocol_seq')")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(seq)
    }

    async fn find_request(
        &mut self,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<AccessRequest>> {
        load_request(&mut *self.tx, id, user_id).await
    }

    async fn insert_request(&mut self, request: &AccessRequest) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO access_requests
                (id, protocol, user_id, justification, urgent, status, denial_reason,
                 cancellation_reason, created_at, expires_at, origin_request_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(request.id)
        .bind(&request.protocol)
        .bind(request.user_id)
        .bind(&request.justification)
        .bind(request.urgent)
        .bind(request.status.as_str())
        .bind(request.denial_reason.as_deref())
        .bind(request.cancellation_reason.as_deref())
        .bind(request.created_at)
        .bind(request.expires_at)
        .bind(request.origin_request_id)
        .execute(&mut *self.tx)
        .await?;

        let module_ids: Vec<Uuid> = request.modules.iter().map(|m| m.id).collect();
        sqlx::query(
            "INSERT INTO request_modules (request_id, module_id)
             SELECT $1::uuid, unnest($2::uuid[])",
        )
        .bind(request.id)
        .bind(module_ids.as_slice())
        .execute(&mut *self.tx)
        .await?;

        for entry in &request.history {
            self.append_history(request.id, entry).await?;
        }
        Ok(())
    }

    async fn update_request(&mut self, request: &AccessRequest) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE access_requests
             SET status = $2, cancellation_reason = $3, origin_request_id = $4
             WHERE id = $1",
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.cancellation_reason.as_deref())
        .bind(request.origin_request_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("request {} not in store", request.id);
        }
        Ok(())
    }

    async fn append_history(
        &mut self,
        request_id: Uuid,
        entry: &HistoryEntry,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO request_history (request_id, description, recorded_at)
             VALUES ($1, $2, $3)",
        )
        .bind(request_id)
        .bind(&entry.description)
        .bind(entry.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn grant_modules(&mut self, user_id: Uuid, ids: &BTreeSet<Uuid>) -> anyhow::Result<()> {
        let ids: Vec<Uuid> = ids.iter().copied().collect();
        sqlx::query(
            "INSERT INTO user_modules (user_id, module_id)
             SELECT $1::uuid, unnest($2::uuid[])
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(ids.as_slice())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn revoke_modules(
        &mut self,
        user_id: Uuid,
        ids: &BTreeSet<Uuid>,
    ) -> anyhow::Result<()> {
        let ids: Vec<Uuid> = ids.iter().copied().collect();
        sqlx::query("DELETE FROM user_modules WHERE user_id = $1 AND module_id = ANY($2)")
            .bind(user_id)
            .bind(ids.as_slice())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
