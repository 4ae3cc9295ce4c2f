use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use userhub_auth::{Identity, MAX_PASSWORD_BYTES, Role};
use userhub_core::{DomainError, UserId};

pub const MIN_PASSWORD_LEN: usize = 6;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub username: Option<String>,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_username(&self.username)?;
        validate_password(&self.password)
    }
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_username(&self.username)?;
        validate_password(&self.password)?;
        if let Some(role) = &self.role {
            validate_role(role)?;
        }
        Ok(())
    }
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(username) = &self.username {
            validate_username(username)?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }
        if let Some(role) = &self.role {
            validate_role(role)?;
        }
        Ok(())
    }
}

/// Usernames are email addresses: `local@domain.tld`, no whitespace.
pub fn validate_username(username: &str) -> Result<(), DomainError> {
    let invalid = || DomainError::validation("username must be a valid email address");

    if username.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = username.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.is_empty() {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(DomainError::validation(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

fn validate_role(role: &str) -> Result<(), DomainError> {
    if role.trim().is_empty() {
        return Err(DomainError::validation("role must not be empty"));
    }
    Ok(())
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Outward view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub role: Option<Role>,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            role: identity.role.clone(),
            roles: identity.roles.iter().map(|g| g.role.clone()).collect(),
            permissions: identity
                .effective_permissions()
                .into_iter()
                .map(|p| p.as_str().to_string())
                .collect(),
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse<T: Serialize> {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}
