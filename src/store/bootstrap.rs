use std::collections::BTreeSet;

use sqlx::PgPool;
use uuid::Uuid;

use super::memory::MemoryStore;
use crate::catalog::Module;
use crate::users::User;

struct ModuleDef {
    name: &'static str,
    description: &'static str,
    active: bool,
    departments: &'static [&'static str],
    /// Names of modules this one declares incompatible. Left one-sided on
    /// purpose for some pairs.
    incompatible_with: &'static [&'static str],
}

const DEMO_MODULES: &[ModuleDef] = &[
    ModuleDef {
        name: "Portal do Colaborador",
        description: "Employee self-service portal",
        active: true,
        departments: &["TI", "Financeiro", "RH", "Operações", "Compras"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Relatórios Gerenciais",
        description: "Management dashboards and reports",
        active: true,
        departments: &["TI", "Financeiro", "RH", "Operações"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Gestão Financeira",
        description: "Accounts payable and receivable",
        active: true,
        departments: &["TI", "Financeiro"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Aprovador Financeiro",
        description: "Approves payments and expense reports",
        active: true,
        departments: &["TI", "Financeiro"],
        incompatible_with: &["Solicitante Financeiro"],
    },
    ModuleDef {
        name: "Solicitante Financeiro",
        description: "Submits payments and expense reports",
        active: true,
        departments: &["TI", "Financeiro", "Operações", "Compras"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Administrador RH",
        description: "Full access to HR records",
        active: true,
        departments: &["TI", "RH"],
        incompatible_with: &["Colaborador RH"],
    },
    ModuleDef {
        name: "Colaborador RH",
        description: "Read-only access to own HR records",
        active: true,
        departments: &["TI", "RH", "Financeiro", "Operações", "Compras"],
        incompatible_with: &["Administrador RH"],
    },
    ModuleDef {
        name: "Gestão de Estoque",
        description: "Inventory control",
        active: true,
        departments: &["TI", "Operações", "Compras"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Compras",
        description: "Purchase orders and suppliers",
        active: true,
        departments: &["TI", "Operações", "Compras"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Auditoria",
        description: "Audit trail inspection",
        active: true,
        departments: &["TI"],
        incompatible_with: &[],
    },
    ModuleDef {
        name: "Sistema Legado",
        description: "Decommissioned ERP",
        active: false,
        departments: &["TI"],
        incompatible_with: &[],
    },
];

const DEMO_USERS: &[(&str, &str, &str)] = &[
    ("ti@empresa.com", "Ana Souza", "TI"),
    ("financeiro@empresa.com", "Bruno Lima", "Financeiro"),
    ("rh@empresa.com", "Carla Dias", "RH"),
    ("operacoes@empresa.com", "Diego Alves", "Operações"),
];

/// Demo catalog and users with fresh ids.
pub fn demo_catalog() -> (Vec<Module>, Vec<User>) {
    let ids: Vec<(&str, Uuid)> = DEMO_MODULES
        .iter()
        .map(|m| (m.name, Uuid::new_v4()))
        .collect();
    let id_of = |name: &str| {
        ids.iter()
            .find(|(n, _)| *n == name)
            .map(|(_, id)| *id)
    };

    let modules = DEMO_MODULES
        .iter()
        .zip(&ids)
        .map(|(def, (_, id))| Module {
            id: *id,
            name: def.name.to_owned(),
            description: def.description.to_owned(),
            is_active: def.active,
            allowed_departments: def.departments.iter().map(|d| (*d).to_owned()).collect(),
            incompatible_with: def.incompatible_with.iter().filter_map(|n| id_of(n)).collect(),
        })
        .collect();

    let users = DEMO_USERS
        .iter()
        .map(|(email, name, department)| User {
            id: Uuid::new_v4(),
            email: (*email).to_owned(),
            name: (*name).to_owned(),
            department: (*department).to_owned(),
            is_active: true,
            active_modules: BTreeSet::new(),
        })
        .collect();

    (modules, users)
}

/// Seed the demo catalog into Postgres unless a catalog already exists.
#[tracing::instrument(skip(pool), err)]
pub async fn run(pool: &PgPool) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM modules")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("bootstrap skipped: catalog already exists");
        return Ok(());
    }

    tracing::info!("empty catalog, seeding demo modules and users");
    let (modules, users) = demo_catalog();

    let mut tx = pool.begin().await?;
    for module in &modules {
        let departments: Vec<&str> = module.allowed_departments.iter().map(String::as_str).collect();
        let incompatible: Vec<Uuid> = module.incompatible_with.iter().copied().collect();
        sqlx::query(
            "INSERT INTO modules (id, name, description, is_active, allowed_departments, incompatible_with)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(module.id)
        .bind(&module.name)
        .bind(&module.description)
        .bind(module.is_active)
        .bind(departments.as_slice())
        .bind(incompatible.as_slice())
        .execute(&mut *tx)
        .await?;
    }
    tracing::info!(count = modules.len(), "modules seeded");

    for user in &users {
        sqlx::query(
            "INSERT INTO users (id, email, name, department)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.department)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    tracing::info!(count = users.len(), "users seeded");

    Ok(())
}

/// Seed the demo catalog into an in-memory store.
pub async fn seed_memory(store: &MemoryStore) {
    let (modules, users) = demo_catalog();
    for module in modules {
        store.insert_module(module).await;
    }
    for user in users {
        store.insert_user(user).await;
    }
}
