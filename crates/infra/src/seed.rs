//! Bootstrap data: the superadmin role and account.

use anyhow::Context;
use tracing::info;

use userhub_auth::{CredentialVerifier, Identity, IdentityLookup, permissions, roles};

use crate::store::{IdentityStore, NewUser};

pub const SUPERADMIN_USERNAME: &str = "superadmin@mail.com";

/// Ensure the superadmin role (with every user-management permission) and the
/// superadmin account exist.
///
/// Safe to run on every start: an existing account keeps its password, and
/// role assignment and direct grants are re-applied idempotently.
pub async fn seed_superadmin<S>(
    store: &S,
    password: &str,
    verifier: CredentialVerifier,
) -> anyhow::Result<Identity>
where
    S: IdentityStore + ?Sized,
{
    store
        .upsert_role(roles::SUPERADMIN, permissions::user_management())
        .await
        .context("upsert superadmin role")?;

    let existing = store
        .lookup_by_username(SUPERADMIN_USERNAME)
        .await
        .context("look up superadmin")?;

    let id = match existing {
        Some(identity) => {
            info!(user_id = %identity.id, "superadmin already present");
            identity.id
        }
        None => {
            let password = password.to_string();
            let password_hash = tokio::task::spawn_blocking(move || verifier.hash(&password))
                .await
                .context("hashing task failed")?
                .context("hash superadmin password")?;

            let created = store
                .create_user(NewUser {
                    username: SUPERADMIN_USERNAME.to_string(),
                    password_hash,
                    role: Some(roles::SUPERADMIN),
                })
                .await
                .context("create superadmin")?;
            info!(user_id = %created.id, "superadmin created");
            created.id
        }
    };

    store
        .assign_role(id, roles::SUPERADMIN)
        .await
        .context("assign superadmin role")?;
    for permission in permissions::user_management() {
        store
            .grant_permission(id, permission)
            .await
            .context("grant superadmin permission")?;
    }

    store
        .lookup_by_id(id)
        .await
        .context("reload superadmin")?
        .context("superadmin vanished after seeding")
}
