//! User account lifecycle
//!
//! Registration, activation, password reset and change, administrator user
//! management and removal of stale registrations. Every write evicts the
//! cached entries of the user it touched.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info};

use super::cache::UserCache;
use crate::auth::{self, AuthError, ANONYMOUS_USER, ROLE_USER};
use crate::db::{self, Database, RepositoryError};
use crate::models::user::DEFAULT_LANGUAGE;
use crate::models::{AdminUserDto, ManagedUserVm, Page, Pageable, UserDto, UserRecord};

/// How long a password reset key stays valid
const RESET_KEY_VALIDITY_HOURS: i64 = 24;

/// Age after which never-activated registrations are removed
const NOT_ACTIVATED_RETENTION_DAYS: i64 = 3;

/// User service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Login name already used!")]
    LoginAlreadyUsed,

    #[error("Email is already in use!")]
    EmailAlreadyUsed,

    #[error("Incorrect password")]
    InvalidPassword,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Result type for user service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Profile fields a user may change on their own account
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub lang_key: Option<String>,
    pub image_url: Option<String>,
}

/// Account lifecycle operations over the user repository
#[derive(Clone)]
pub struct UserService {
    db: Database,
    cache: UserCache,
}

impl UserService {
    pub fn new(db: Database, cache: UserCache) -> Self {
        Self { db, cache }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    /// Persist a changed user and refresh its cache entries
    async fn save(&self, previous: &UserRecord, user: &UserRecord) -> ServiceResult<UserRecord> {
        let saved = db::update_user(self.pool(), user).await?;
        self.cache.evict(previous).await;
        self.cache.evict(&saved).await;
        Ok(saved)
    }

    // ========================================================================
    // Registration and activation
    // ========================================================================

    /// Activate the account holding `key`
    ///
    /// # Returns
    /// The activated user, or `None` when no user has this key
    pub async fn activate_registration(&self, key: &str) -> ServiceResult<Option<UserRecord>> {
        debug!("Activating user for activation key {}", key);

        let Some(user) = db::find_user_by_activation_key(self.pool(), key).await? else {
            return Ok(None);
        };

        let mut activated = user.clone();
        activated.activated = true;
        activated.activation_key = None;

        let saved = self.save(&user, &activated).await?;
        debug!("Activated user: {}", saved.login);
        Ok(Some(saved))
    }

    /// Register a new, not yet activated account
    ///
    /// An existing account with the same login or email is replaced when it was
    /// never activated; otherwise the registration is refused.
    pub async fn register_user(&self, vm: &ManagedUserVm, password: &str) -> ServiceResult<UserRecord> {
        let login = vm.user.login.to_lowercase();

        if let Some(existing) = db::find_user_by_login(self.pool(), &login).await? {
            if !self.remove_non_activated_user(&existing).await? {
                return Err(ServiceError::LoginAlreadyUsed);
            }
        }

        if let Some(email) = &vm.user.email {
            if let Some(existing) = db::find_user_by_email(self.pool(), email).await? {
                if !self.remove_non_activated_user(&existing).await? {
                    return Err(ServiceError::EmailAlreadyUsed);
                }
            }
        }

        let now = Utc::now();
        let new_user = UserRecord {
            id: 0,
            login,
            password_hash: hash_blocking(password).await?,
            first_name: vm.user.first_name.clone(),
            last_name: vm.user.last_name.clone(),
            email: vm.user.email.as_ref().map(|e| e.to_lowercase()),
            image_url: vm.user.image_url.clone(),
            activated: false,
            lang_key: vm.user.lang_key.clone(),
            activation_key: Some(auth::generate_random_key()),
            reset_key: None,
            reset_date: None,
            created_by: ANONYMOUS_USER.to_string(),
            created_date: now,
            last_modified_by: Some(ANONYMOUS_USER.to_string()),
            last_modified_date: Some(now),
            authorities: BTreeSet::from([ROLE_USER.to_string()]),
        };

        let saved = db::insert_user(self.pool(), &new_user).await?;
        self.cache.evict(&saved).await;
        debug!("Created information for user: {}", saved.login);
        Ok(saved)
    }

    async fn remove_non_activated_user(&self, existing: &UserRecord) -> ServiceResult<bool> {
        if existing.activated {
            return Ok(false);
        }
        db::delete_user_by_id(self.pool(), existing.id).await?;
        self.cache.evict(existing).await;
        debug!("Removed non-activated user: {}", existing.login);
        Ok(true)
    }

    // ========================================================================
    // Password reset and change
    // ========================================================================

    /// Issue a fresh reset key for the activated user with this email
    pub async fn request_password_reset(&self, mail: &str) -> ServiceResult<Option<UserRecord>> {
        let Some(user) = db::find_user_by_email(self.pool(), mail).await? else {
            return Ok(None);
        };
        if !user.activated {
            return Ok(None);
        }

        let mut changed = user.clone();
        changed.reset_key = Some(auth::generate_random_key());
        changed.reset_date = Some(Utc::now());

        Ok(Some(self.save(&user, &changed).await?))
    }

    /// Set a new password for the user holding a reset key issued in the last 24 hours
    pub async fn complete_password_reset(
        &self,
        new_password: &str,
        key: &str,
    ) -> ServiceResult<Option<UserRecord>> {
        debug!("Reset user password for reset key {}", key);

        let Some(user) = db::find_user_by_reset_key(self.pool(), key).await? else {
            return Ok(None);
        };
        if !is_reset_key_fresh(user.reset_date, Utc::now()) {
            return Ok(None);
        }

        let mut changed = user.clone();
        changed.password_hash = hash_blocking(new_password).await?;
        changed.reset_key = None;
        changed.reset_date = None;

        Ok(Some(self.save(&user, &changed).await?))
    }

    /// Change the password of a logged-in user after checking the current one
    pub async fn change_password(
        &self,
        login: &str,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let user = db::find_user_by_login(self.pool(), login)
            .await?
            .ok_or_else(|| ServiceError::UserNotFound(login.to_string()))?;

        if !verify_blocking(current_password, &user.password_hash).await? {
            return Err(ServiceError::InvalidPassword);
        }

        let mut changed = user.clone();
        changed.password_hash = hash_blocking(new_password).await?;
        self.save(&user, &changed).await?;
        debug!("Changed password for User: {}", login);
        Ok(())
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Check credentials for a login or an email address
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<UserRecord> {
        let user = if username.contains('@') {
            match self.find_by_email_cached(username).await? {
                Some(user) => Some(user),
                None => self.find_by_login_cached(username).await?,
            }
        } else {
            self.find_by_login_cached(username).await?
        };

        let user = user.ok_or(AuthError::InvalidCredentials)?;
        if !user.activated {
            return Err(AuthError::UserNotActivated(user.login).into());
        }
        if !verify_blocking(password, &user.password_hash).await? {
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(user)
    }

    async fn find_by_login_cached(&self, login: &str) -> ServiceResult<Option<UserRecord>> {
        let login = login.to_lowercase();
        if let Some(user) = self.cache.get_by_login(&login).await {
            return Ok(Some(user));
        }
        let user = db::find_user_by_login(self.pool(), &login).await?;
        if let Some(user) = &user {
            self.cache.insert(user).await;
        }
        Ok(user)
    }

    async fn find_by_email_cached(&self, email: &str) -> ServiceResult<Option<UserRecord>> {
        if let Some(user) = self.cache.get_by_email(email).await {
            return Ok(Some(user));
        }
        let user = db::find_user_by_email(self.pool(), email).await?;
        if let Some(user) = &user {
            self.cache.insert(user).await;
        }
        Ok(user)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Create an activated account on behalf of an administrator
    ///
    /// The user gets a random password and a reset key so they can choose
    /// their own password from the creation mail.
    pub async fn create_user(&self, dto: &AdminUserDto, actor: &str) -> ServiceResult<UserRecord> {
        let login = dto.login.to_lowercase();

        if db::find_user_by_login(self.pool(), &login).await?.is_some() {
            return Err(ServiceError::LoginAlreadyUsed);
        }
        if let Some(email) = &dto.email {
            if db::find_user_by_email(self.pool(), email).await?.is_some() {
                return Err(ServiceError::EmailAlreadyUsed);
            }
        }

        let now = Utc::now();
        let new_user = UserRecord {
            id: 0,
            login,
            password_hash: hash_blocking(&auth::generate_random_key()).await?,
            first_name: dto.first_name.clone(),
            last_name: dto.last_name.clone(),
            email: dto.email.as_ref().map(|e| e.to_lowercase()),
            image_url: dto.image_url.clone(),
            activated: true,
            lang_key: Some(
                dto.lang_key
                    .clone()
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            ),
            activation_key: None,
            reset_key: Some(auth::generate_random_key()),
            reset_date: Some(now),
            created_by: actor.to_string(),
            created_date: now,
            last_modified_by: Some(actor.to_string()),
            last_modified_date: Some(now),
            authorities: self.existing_authorities(&dto.authorities).await?,
        };

        let saved = db::insert_user(self.pool(), &new_user).await?;
        self.cache.evict(&saved).await;
        debug!("Created Information for User: {}", saved.login);
        Ok(saved)
    }

    /// Replace every editable field and the authorities of the user with `dto.id`
    ///
    /// # Returns
    /// The updated user, or `None` when `dto.id` is missing or unknown
    pub async fn update_user(&self, dto: &AdminUserDto, actor: &str) -> ServiceResult<Option<UserRecord>> {
        let Some(id) = dto.id else {
            return Ok(None);
        };

        if let Some(email) = &dto.email {
            if let Some(other) = db::find_user_by_email(self.pool(), email).await? {
                if other.id != id {
                    return Err(ServiceError::EmailAlreadyUsed);
                }
            }
        }
        if let Some(other) = db::find_user_by_login(self.pool(), &dto.login.to_lowercase()).await? {
            if other.id != id {
                return Err(ServiceError::LoginAlreadyUsed);
            }
        }

        let Some(user) = db::find_user_by_id(self.pool(), id).await? else {
            return Ok(None);
        };

        let mut changed = user.clone();
        changed.login = dto.login.to_lowercase();
        changed.first_name = dto.first_name.clone();
        changed.last_name = dto.last_name.clone();
        changed.email = dto.email.as_ref().map(|e| e.to_lowercase());
        changed.image_url = dto.image_url.clone();
        changed.activated = dto.activated;
        changed.lang_key = dto.lang_key.clone();
        changed.authorities = self.existing_authorities(&dto.authorities).await?;
        changed.last_modified_by = Some(actor.to_string());
        changed.last_modified_date = Some(Utc::now());

        let saved = self.save(&user, &changed).await?;
        debug!("Changed Information for User: {}", saved.login);
        Ok(Some(saved))
    }

    /// Update the profile of the logged-in user
    pub async fn update_current_user(
        &self,
        login: &str,
        update: AccountUpdate,
    ) -> ServiceResult<Option<UserRecord>> {
        let Some(user) = db::find_user_by_login(self.pool(), login).await? else {
            return Ok(None);
        };

        if let Some(email) = &update.email {
            if let Some(other) = db::find_user_by_email(self.pool(), email).await? {
                if other.id != user.id {
                    return Err(ServiceError::EmailAlreadyUsed);
                }
            }
        }

        let mut changed = user.clone();
        changed.first_name = update.first_name;
        changed.last_name = update.last_name;
        if let Some(email) = update.email {
            changed.email = Some(email.to_lowercase());
        }
        changed.lang_key = update.lang_key;
        changed.image_url = update.image_url;
        changed.last_modified_by = Some(user.login.clone());
        changed.last_modified_date = Some(Utc::now());

        let saved = self.save(&user, &changed).await?;
        debug!("Changed Information for User: {}", saved.login);
        Ok(Some(saved))
    }

    /// Delete a user by login
    ///
    /// # Returns
    /// true if a user was deleted
    pub async fn delete_user(&self, login: &str) -> ServiceResult<bool> {
        let Some(user) = db::find_user_by_login(self.pool(), login).await? else {
            return Ok(false);
        };
        let deleted = db::delete_user_by_login(self.pool(), &user.login).await?;
        self.cache.evict(&user).await;
        debug!("Deleted User: {}", user.login);
        Ok(deleted)
    }

    async fn existing_authorities(&self, requested: &BTreeSet<String>) -> ServiceResult<BTreeSet<String>> {
        let mut kept = BTreeSet::new();
        for authority in requested {
            if db::authority_exists(self.pool(), authority).await? {
                kept.insert(authority.clone());
            }
        }
        Ok(kept)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_all_managed_users(&self, pageable: &Pageable) -> ServiceResult<Page<AdminUserDto>> {
        let page = db::find_all_users(self.pool(), pageable).await?;
        Ok(page.map(|user| AdminUserDto::from(&user)))
    }

    pub async fn get_all_public_users(&self, pageable: &Pageable) -> ServiceResult<Page<UserDto>> {
        let page = db::find_all_activated_users(self.pool(), pageable).await?;
        Ok(page.map(|user| UserDto::from(&user)))
    }

    pub async fn get_user_with_authorities_by_login(&self, login: &str) -> ServiceResult<Option<UserRecord>> {
        self.find_by_login_cached(login).await
    }

    pub async fn get_authorities(&self) -> ServiceResult<Vec<String>> {
        Ok(db::find_all_authorities(self.pool()).await?)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete accounts that were never activated within three days
    ///
    /// # Returns
    /// Number of users removed
    pub async fn remove_not_activated_users(&self) -> ServiceResult<usize> {
        let cutoff = Utc::now() - Duration::days(NOT_ACTIVATED_RETENTION_DAYS);
        let stale = db::find_not_activated_users_created_before(self.pool(), cutoff).await?;

        let mut removed = 0;
        for user in &stale {
            debug!("Deleting not activated user {}", user.login);
            if db::delete_user_by_id(self.pool(), user.id).await? {
                removed += 1;
            }
            self.cache.evict(user).await;
        }

        if removed > 0 {
            info!("Removed {} not activated users", removed);
        }
        Ok(removed)
    }
}

/// Whether a reset key issued at `reset_date` may still be used at `now`
fn is_reset_key_fresh(reset_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    reset_date.is_some_and(|issued| issued > now - Duration::hours(RESET_KEY_VALIDITY_HOURS))
}

/// Run bcrypt on the blocking pool
async fn hash_blocking(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| AuthError::HashingError(e.to_string()))?
}

async fn verify_blocking(password: &str, hash: &str) -> Result<bool, AuthError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::HashingError(e.to_string()))?
}
