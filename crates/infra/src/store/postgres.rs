//! Postgres-backed identity store.
//!
//! Tables (see [`PostgresIdentityStore::migrate`]):
//! `users`, `roles`, `permissions`, and the join tables `role_permissions`,
//! `user_roles`, `user_permissions`. Usernames are unique; deleting a user
//! cascades to its assignments and grants.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use userhub_auth::{Identity, IdentityLookup, LookupError, Permission, Role, RoleGrant};
use userhub_core::{PermissionId, RoleId, UserId};

use super::{IdentityStore, NewUser, StoreError, UserFilter, UserUpdate};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission_id UUID NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        permission_id UUID NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, permission_id)
    )
    "#,
];

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, updated_at";

fn backend(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Identity store over a Postgres connection pool.
#[derive(Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(backend)?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn fetch_user_row(&self, clause: &str, bind: UserKey<'_>) -> Result<Option<PgRow>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let query = sqlx::query(&sql);
        let query = match bind {
            UserKey::Id(id) => query.bind(*id.as_uuid()),
            UserKey::Username(name) => query.bind(name),
        };
        query.fetch_optional(&*self.pool).await.map_err(backend)
    }

    async fn hydrate(&self, row: &PgRow) -> Result<Identity, StoreError> {
        let id: Uuid = row.try_get("id").map_err(backend)?;
        let username: String = row.try_get("username").map_err(backend)?;
        let password_hash: String = row.try_get("password_hash").map_err(backend)?;
        let role: Option<String> = row.try_get("role").map_err(backend)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(backend)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(backend)?;

        let grant_rows = sqlx::query(
            r#"
            SELECT r.name AS role_name, p.name AS permission_name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1
            ORDER BY r.name, p.name
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?;

        let mut grants: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
        for row in &grant_rows {
            let role_name: String = row.try_get("role_name").map_err(backend)?;
            let permission: Option<String> = row.try_get("permission_name").map_err(backend)?;
            let entry = grants.entry(role_name).or_default();
            if let Some(p) = permission {
                entry.push(Permission::new(p));
            }
        }

        let direct = sqlx::query(
            r#"
            SELECT p.name AS permission_name
            FROM user_permissions up
            JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await
        .map_err(backend)?
        .iter()
        .map(|row| row.try_get::<String, _>("permission_name").map(Permission::new))
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend)?;

        Ok(Identity {
            id: UserId::from_uuid(id),
            username,
            password_hash,
            role: role.map(Role::new),
            roles: grants
                .into_iter()
                .map(|(role, perms)| RoleGrant::new(Role::new(role), perms))
                .collect(),
            permissions: direct,
            created_at,
            updated_at,
        })
    }

    async fn load(&self, id: UserId) -> Result<Identity, StoreError> {
        let row = self
            .fetch_user_row("id = $1", UserKey::Id(id))
            .await?
            .ok_or(StoreError::NotFound)?;
        self.hydrate(&row).await
    }
}

enum UserKey<'a> {
    Id(UserId),
    Username(&'a str),
}

async fn role_id(tx: &mut Transaction<'_, Postgres>, role: &Role) -> Result<RoleId, StoreError> {
    let row = sqlx::query("SELECT id FROM roles WHERE name = $1")
        .bind(role.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?
        .ok_or_else(|| StoreError::UnknownRole(role.to_string()))?;
    let id: Uuid = row.try_get("id").map_err(backend)?;
    Ok(RoleId::from_uuid(id))
}

async fn permission_id(
    tx: &mut Transaction<'_, Postgres>,
    permission: &Permission,
) -> Result<PermissionId, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO permissions (id, name) VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(*PermissionId::new().as_uuid())
    .bind(permission.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(backend)?;
    let id: Uuid = row.try_get("id").map_err(backend)?;
    Ok(PermissionId::from_uuid(id))
}

async fn user_exists(tx: &mut Transaction<'_, Postgres>, id: UserId) -> Result<(), StoreError> {
    sqlx::query("SELECT 1 FROM users WHERE id = $1")
        .bind(*id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?
        .map(|_| ())
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl IdentityLookup for PostgresIdentityStore {
    async fn lookup_by_username(&self, username: &str) -> Result<Option<Identity>, LookupError> {
        match self.fetch_user_row("username = $1", UserKey::Username(username)).await? {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn lookup_by_id(&self, id: UserId) -> Result<Option<Identity>, LookupError> {
        match self.fetch_user_row("id = $1", UserKey::Id(id)).await? {
            Some(row) => Ok(Some(self.hydrate(&row).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    async fn list_users(&self, filter: UserFilter) -> Result<Vec<Identity>, StoreError> {
        let rows = match filter.username {
            Some(username) => {
                let sql = format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE username = $1 ORDER BY created_at DESC, id DESC"
                );
                sqlx::query(&sql).bind(username).fetch_all(&*self.pool).await
            }
            None => {
                let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC");
                sqlx::query(&sql).fetch_all(&*self.pool).await
            }
        }
        .map_err(backend)?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            users.push(self.hydrate(row).await?);
        }
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> Result<Identity, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let id = UserId::new();
        let now = Utc::now();

        let role_id = match &user.role {
            Some(role) => Some(role_id(&mut tx, role).await?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(*id.as_uuid())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_ref().map(|r| r.as_str()))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if let Some(role_id) = role_id {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(*id.as_uuid())
                .bind(*role_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        self.load(id).await
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<Identity, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let current = sqlx::query("SELECT role FROM users WHERE id = $1 FOR UPDATE")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;
        let previous_role: Option<String> = current.try_get("role").map_err(backend)?;

        if let Some(role) = &update.role {
            let new_role_id = role_id(&mut tx, role).await?;
            if let Some(previous) = previous_role {
                sqlx::query(
                    r#"
                    DELETE FROM user_roles
                    WHERE user_id = $1 AND role_id IN (SELECT id FROM roles WHERE name = $2)
                    "#,
                )
                .bind(*id.as_uuid())
                .bind(previous)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(*id.as_uuid())
            .bind(*new_role_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        sqlx::query(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                password_hash = COALESCE($3, password_hash),
                role = COALESCE($4, role),
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .bind(update.username)
        .bind(update.password_hash)
        .bind(update.role.as_ref().map(|r| r.as_str().to_string()))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        self.load(id).await
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn upsert_role(&self, role: Role, permissions: Vec<Permission>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query(
            r#"
            INSERT INTO roles (id, name) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(*RoleId::new().as_uuid())
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        let role_id: Uuid = row.try_get("id").map_err(backend)?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for permission in &permissions {
            let permission_id = permission_id(&mut tx, permission).await?;
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(*permission_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn assign_role(&self, id: UserId, role: Role) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        user_exists(&mut tx, id).await?;
        let role_id = role_id(&mut tx, &role).await?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(*id.as_uuid())
        .bind(*role_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn grant_permission(&self, id: UserId, permission: Permission) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        user_exists(&mut tx, id).await?;
        let permission_id = permission_id(&mut tx, &permission).await?;

        sqlx::query(
            "INSERT INTO user_permissions (user_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(*id.as_uuid())
        .bind(*permission_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }
}
