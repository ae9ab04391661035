//! User lookup cache using moka
//!
//! Two concurrent caches keyed by lower-case login and lower-case email.
//! Every mutation in the user service evicts both keys of the user it touched.

use moka::future::Cache;
use std::time::Duration;

use crate::models::UserRecord;

/// Cached users by login and by email
#[derive(Debug, Clone)]
pub struct UserCache {
    by_login: Cache<String, UserRecord>,
    by_email: Cache<String, UserRecord>,
}

impl UserCache {
    /// Create caches with the given capacity and time to live
    #[must_use]
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            by_login: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            by_email: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get_by_login(&self, login: &str) -> Option<UserRecord> {
        self.by_login.get(&login.to_lowercase()).await
    }

    pub async fn get_by_email(&self, email: &str) -> Option<UserRecord> {
        self.by_email.get(&email.to_lowercase()).await
    }

    /// Store a user under its login and, when present, its email
    pub async fn insert(&self, user: &UserRecord) {
        self.by_login
            .insert(user.login.to_lowercase(), user.clone())
            .await;
        if let Some(email) = &user.email {
            self.by_email.insert(email.to_lowercase(), user.clone()).await;
        }
    }

    /// Drop both cache entries of a user
    pub async fn evict(&self, user: &UserRecord) {
        self.by_login.invalidate(&user.login.to_lowercase()).await;
        if let Some(email) = &user.email {
            self.by_email.invalidate(&email.to_lowercase()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn user(login: &str, email: Option<&str>) -> UserRecord {
        UserRecord {
            id: 1,
            login: login.to_string(),
            password_hash: String::new(),
            first_name: None,
            last_name: None,
            email: email.map(str::to_string),
            image_url: None,
            activated: true,
            lang_key: None,
            activation_key: None,
            reset_key: None,
            reset_date: None,
            created_by: "system".to_string(),
            created_date: Utc::now(),
            last_modified_by: None,
            last_modified_date: None,
            authorities: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup_ignore_case() {
        let cache = UserCache::new(10, Duration::from_secs(60));
        cache.insert(&user("vicious", Some("Vicious@RedDragon.example"))).await;

        assert!(cache.get_by_login("VICIOUS").await.is_some());
        assert!(cache.get_by_email("vicious@reddragon.example").await.is_some());
        assert!(cache.get_by_login("julia").await.is_none());
    }

    #[tokio::test]
    async fn test_evict_removes_both_keys() {
        let cache = UserCache::new(10, Duration::from_secs(60));
        let julia = user("julia", Some("julia@example.com"));
        cache.insert(&julia).await;

        cache.evict(&julia).await;
        assert!(cache.get_by_login("julia").await.is_none());
        assert!(cache.get_by_email("julia@example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_user_without_email_is_cached_by_login_only() {
        let cache = UserCache::new(10, Duration::from_secs(60));
        cache.insert(&user("annie", None)).await;
        assert!(cache.get_by_login("annie").await.is_some());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = UserCache::new(10, Duration::from_millis(50));
        cache.insert(&user("gren", None)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get_by_login("gren").await.is_none());
    }
}
