use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use userhub_auth::{Identity, IdentityLookup, LookupError, Permission, Role, RoleGrant};
use userhub_core::UserId;

use super::{IdentityStore, NewUser, StoreError, UserFilter, UserUpdate};

#[derive(Debug, Clone)]
struct UserRecord {
    id: UserId,
    username: String,
    password_hash: String,
    role: Option<Role>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Insertion order, used to list newest first when timestamps collide.
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, UserRecord>,
    roles: BTreeMap<Role, Vec<Permission>>,
    next_seq: u64,
}

impl Inner {
    fn resolve(&self, record: &UserRecord) -> Identity {
        // Assignments to roles that were never stored resolve to no grants.
        let roles = record
            .roles
            .iter()
            .filter_map(|role| {
                self.roles
                    .get(role)
                    .map(|perms| RoleGrant::new(role.clone(), perms.clone()))
            })
            .collect();

        Identity {
            id: record.id,
            username: record.username.clone(),
            password_hash: record.password_hash.clone(),
            role: record.role.clone(),
            roles,
            permissions: record.permissions.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn ensure_role(&self, role: &Role) -> Result<(), StoreError> {
        if self.roles.contains_key(role) {
            Ok(())
        } else {
            Err(StoreError::UnknownRole(role.to_string()))
        }
    }
}

/// In-memory identity store for tests/dev.
///
/// Mirrors the relational layout: roles carry permission sets, users hold
/// role assignments and direct grants. Data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    inner: RwLock<Inner>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("identity store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("identity store lock poisoned".to_string()))
    }
}

#[async_trait]
impl IdentityLookup for InMemoryIdentityStore {
    async fn lookup_by_username(&self, username: &str) -> Result<Option<Identity>, LookupError> {
        let inner = self.read()?;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| inner.resolve(u)))
    }

    async fn lookup_by_id(&self, id: UserId) -> Result<Option<Identity>, LookupError> {
        let inner = self.read()?;
        Ok(inner.users.get(&id).map(|u| inner.resolve(u)))
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn list_users(&self, filter: UserFilter) -> Result<Vec<Identity>, StoreError> {
        let inner = self.read()?;
        let mut records: Vec<&UserRecord> = inner
            .users
            .values()
            .filter(|u| filter.username.as_deref().is_none_or(|name| u.username == name))
            .collect();
        records.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(records.into_iter().map(|u| inner.resolve(u)).collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<Identity, StoreError> {
        let mut inner = self.write()?;

        if inner.username_taken(&user.username, None) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        if let Some(role) = &user.role {
            inner.ensure_role(role)?;
        }

        let now = Utc::now();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let record = UserRecord {
            id: UserId::new(),
            username: user.username,
            password_hash: user.password_hash,
            roles: user.role.iter().cloned().collect(),
            role: user.role,
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
            seq,
        };
        let identity = inner.resolve(&record);
        inner.users.insert(record.id, record);
        Ok(identity)
    }

    async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<Identity, StoreError> {
        let mut inner = self.write()?;

        if !inner.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if let Some(username) = &update.username {
            if inner.username_taken(username, Some(id)) {
                return Err(StoreError::Conflict(format!("username '{username}' already exists")));
            }
        }
        if let Some(role) = &update.role {
            inner.ensure_role(role)?;
        }

        let record = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(username) = update.username {
            record.username = username;
        }
        if let Some(hash) = update.password_hash {
            record.password_hash = hash;
        }
        if let Some(role) = update.role {
            if let Some(previous) = record.role.take() {
                record.roles.retain(|r| r != &previous);
            }
            if !record.roles.contains(&role) {
                record.roles.push(role.clone());
            }
            record.role = Some(role);
        }
        record.updated_at = Utc::now();

        let record = record.clone();
        Ok(inner.resolve(&record))
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.users.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn upsert_role(&self, role: Role, permissions: Vec<Permission>) -> Result<(), StoreError> {
        let mut perms = permissions;
        perms.sort();
        perms.dedup();

        let mut inner = self.write()?;
        inner.roles.insert(role, perms);
        Ok(())
    }

    async fn assign_role(&self, id: UserId, role: Role) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.ensure_role(&role)?;
        let record = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !record.roles.contains(&role) {
            record.roles.push(role);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn grant_permission(&self, id: UserId, permission: Permission) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let record = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !record.permissions.contains(&permission) {
            record.permissions.push(permission);
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use userhub_auth::{permissions, roles};

    fn new_user(username: &str, role: Option<Role>) -> NewUser {
        NewUser {
            username: username.to_string(),
            password_hash: "$2b$04$placeholder".to_string(),
            role,
        }
    }

    async fn store_with_superadmin_role() -> InMemoryIdentityStore {
        let store = InMemoryIdentityStore::new();
        store
            .upsert_role(roles::SUPERADMIN, permissions::user_management())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_lookup_by_username_and_id() {
        let store = store_with_superadmin_role().await;
        let created = store
            .create_user(new_user("a@mail.com", Some(roles::SUPERADMIN)))
            .await
            .unwrap();

        let by_name = store.lookup_by_username("a@mail.com").await.unwrap().unwrap();
        let by_id = store.lookup_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(by_name, by_id);
        assert_eq!(by_id.role, Some(roles::SUPERADMIN));
        assert!(by_id.has_permission(&permissions::DELETE_USER));
    }

    #[tokio::test]
    async fn lookup_of_unknown_identity_is_none() {
        let store = InMemoryIdentityStore::new();
        assert!(store.lookup_by_username("nobody@mail.com").await.unwrap().is_none());
        assert!(store.lookup_by_id(UserId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = InMemoryIdentityStore::new();
        store.create_user(new_user("dup@mail.com", None)).await.unwrap();
        let err = store.create_user(new_user("dup@mail.com", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_with_unknown_role_is_rejected() {
        let store = InMemoryIdentityStore::new();
        let err = store
            .create_user(new_user("x@mail.com", Some(Role::new("ghost"))))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownRole("ghost".to_string()));
        assert!(store.list_users(UserFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filters_by_username() {
        let store = InMemoryIdentityStore::new();
        for name in ["first@mail.com", "second@mail.com", "third@mail.com"] {
            store.create_user(new_user(name, None)).await.unwrap();
        }

        let all = store.list_users(UserFilter::default()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["third@mail.com", "second@mail.com", "first@mail.com"]);

        let filtered = store
            .list_users(UserFilter {
                username: Some("second@mail.com".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].username, "second@mail.com");
    }

    #[tokio::test]
    async fn update_replaces_primary_role_assignment() {
        let store = store_with_superadmin_role().await;
        store
            .upsert_role(Role::new("viewer"), vec![permissions::VIEW_USER])
            .await
            .unwrap();
        let user = store
            .create_user(new_user("u@mail.com", Some(roles::SUPERADMIN)))
            .await
            .unwrap();

        let updated = store
            .update_user(
                user.id,
                UserUpdate {
                    role: Some(Role::new("viewer")),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Some(Role::new("viewer")));
        assert!(updated.has_permission(&permissions::VIEW_USER));
        assert!(!updated.has_permission(&permissions::DELETE_USER));
    }

    #[tokio::test]
    async fn update_rejects_taken_username_and_missing_user() {
        let store = InMemoryIdentityStore::new();
        store.create_user(new_user("a@mail.com", None)).await.unwrap();
        let b = store.create_user(new_user("b@mail.com", None)).await.unwrap();

        let rename = UserUpdate {
            username: Some("a@mail.com".to_string()),
            ..UserUpdate::default()
        };
        assert!(matches!(
            store.update_user(b.id, rename.clone()).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(
            store.update_user(UserId::new(), rename).await.unwrap_err(),
            StoreError::NotFound
        );

        // Renaming to the current name is not a conflict.
        let same = UserUpdate {
            username: Some("b@mail.com".to_string()),
            ..UserUpdate::default()
        };
        assert!(store.update_user(b.id, same).await.is_ok());
    }

    #[tokio::test]
    async fn delete_frees_username() {
        let store = InMemoryIdentityStore::new();
        let user = store.create_user(new_user("gone@mail.com", None)).await.unwrap();

        store.delete_user(user.id).await.unwrap();
        assert_eq!(store.delete_user(user.id).await.unwrap_err(), StoreError::NotFound);
        assert!(store.lookup_by_id(user.id).await.unwrap().is_none());
        assert!(store.create_user(new_user("gone@mail.com", None)).await.is_ok());
    }

    #[tokio::test]
    async fn role_permission_changes_are_visible_on_next_lookup() {
        let store = InMemoryIdentityStore::new();
        let editor = Role::new("editor");
        store.upsert_role(editor.clone(), vec![permissions::VIEW_USER]).await.unwrap();
        let user = store.create_user(new_user("e@mail.com", Some(editor.clone()))).await.unwrap();
        assert!(!user.has_permission(&permissions::EDIT_USER));

        store
            .upsert_role(editor, vec![permissions::VIEW_USER, permissions::EDIT_USER])
            .await
            .unwrap();

        let reloaded = store.lookup_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.has_permission(&permissions::EDIT_USER));
    }

    #[tokio::test]
    async fn grants_and_assignments_are_idempotent() {
        let store = store_with_superadmin_role().await;
        let user = store.create_user(new_user("g@mail.com", None)).await.unwrap();

        for _ in 0..2 {
            store.assign_role(user.id, roles::SUPERADMIN).await.unwrap();
            store.grant_permission(user.id, permissions::VIEW_USER).await.unwrap();
        }

        let reloaded = store.lookup_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.roles.len(), 1);
        assert_eq!(reloaded.permissions, vec![permissions::VIEW_USER]);
        assert!(matches!(
            store.assign_role(user.id, Role::new("ghost")).await,
            Err(StoreError::UnknownRole(_))
        ));
    }
}
