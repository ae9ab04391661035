//! Account models
//!
//! `UserRecord` is the stored account including secrets; the DTOs are what the
//! API exposes. Validation helpers for logins, emails and passwords live here so
//! that routes and the user service agree on the rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

/// Shortest password accepted on registration, reset or change
pub const PASSWORD_MIN_LENGTH: usize = 4;

/// Longest password accepted on registration, reset or change
pub const PASSWORD_MAX_LENGTH: usize = 100;

/// Language used when an admin creates a user without one
pub const DEFAULT_LANGUAGE: &str = "en";

/// Characters allowed in a plain (non e-mail) login
fn is_plain_login_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-')
}

/// Characters allowed in the local part of an e-mail shaped login
fn is_email_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!$&*+=?^_`{|}~.-".contains(c)
}

/// Check a login: either `[_.@A-Za-z0-9-]+` or an e-mail like `local@domain.tld`
pub fn is_valid_login(login: &str) -> bool {
    if login.is_empty() || login.chars().count() > 50 {
        return false;
    }

    if login.chars().all(is_plain_login_char) {
        return true;
    }

    let Some((local, domain)) = login.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && local.chars().all(is_email_local_char)
        && !domain.is_empty()
        && domain
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

/// Simple email validation: one `@`, a non-empty local part and a dotted domain
pub fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }

    if domain.is_empty() || !domain.contains('.') {
        return false;
    }

    !domain.split('.').any(|p| p.is_empty())
}

/// True when a password is missing, too short or too long
pub fn is_password_length_invalid(password: &str) -> bool {
    let len = password.chars().count();
    !(PASSWORD_MIN_LENGTH..=PASSWORD_MAX_LENGTH).contains(&len)
}

/// A stored account, including password hash and one-time keys
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    pub activated: bool,
    pub lang_key: Option<String>,
    pub activation_key: Option<String>,
    pub reset_key: Option<String>,
    pub reset_date: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub authorities: BTreeSet<String>,
}

/// Full user view for administrators and the account owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserDto {
    pub id: Option<i64>,
    pub login: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub activated: bool,
    pub lang_key: Option<String>,
    pub created_by: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

impl AdminUserDto {
    /// Check field sizes and formats, returning the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_login(&self.login) {
            return Err("Login must be 1-50 characters of letters, digits or _.@-".to_string());
        }

        if let Some(email) = &self.email {
            let len = email.chars().count();
            if !(5..=254).contains(&len) || !is_valid_email(email) {
                return Err("Invalid email format".to_string());
            }
        }

        for (field, value) in [("First name", &self.first_name), ("Last name", &self.last_name)] {
            if value.as_ref().is_some_and(|v| v.chars().count() > 50) {
                return Err(format!("{} must be at most 50 characters", field));
            }
        }

        if let Some(lang_key) = &self.lang_key {
            if !(2..=10).contains(&lang_key.chars().count()) {
                return Err("Language key must be 2-10 characters".to_string());
            }
        }

        if self.image_url.as_ref().is_some_and(|u| u.chars().count() > 256) {
            return Err("Image URL must be at most 256 characters".to_string());
        }

        Ok(())
    }
}

impl From<&UserRecord> for AdminUserDto {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: Some(user.id),
            login: user.login.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            image_url: user.image_url.clone(),
            activated: user.activated,
            lang_key: user.lang_key.clone(),
            created_by: Some(user.created_by.clone()),
            created_date: Some(user.created_date),
            last_modified_by: user.last_modified_by.clone(),
            last_modified_date: user.last_modified_date,
            authorities: user.authorities.clone(),
        }
    }
}

/// Public user view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: i64,
    pub login: String,
}

impl From<&UserRecord> for UserDto {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            login: user.login.clone(),
        }
    }
}

/// Registration / admin payload: user fields plus a clear-text password
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUserVm {
    #[serde(flatten)]
    pub user: AdminUserDto,
    pub password: Option<String>,
}

/// Credentials for `POST /api/authenticate`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginVm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Token returned by a successful authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct JwtToken {
    pub id_token: String,
}

/// Body of `POST /api/account/change-password`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeDto {
    pub current_password: String,
    pub new_password: String,
}

/// Body of `POST /api/account/reset-password/finish`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyAndPasswordVm {
    pub key: String,
    pub new_password: String,
}
