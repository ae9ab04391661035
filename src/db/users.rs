//! User and authority persistence
//!
//! Users are read together with their authorities in one aggregated query.
//! Writes replace the authority rows inside the same transaction as the user
//! row so both are always consistent.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::BTreeSet;

use super::repository::{order_by_clause, RepositoryError, RepositoryResult};
use crate::models::{Page, Pageable, UserRecord};

/// API property to column for user listings
pub const USER_SORTABLE: &[(&str, &str)] = &[
    ("id", "id"),
    ("login", "login"),
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("email", "email"),
    ("activated", "activated"),
    ("langKey", "lang_key"),
];

/// SELECT of a user with its authorities aggregated into a TEXT[]
fn user_select(where_clause: &str) -> String {
    format!(
        r#"
        SELECT u.id, u.login, u.password_hash, u.first_name, u.last_name, u.email,
               u.image_url, u.activated, u.lang_key, u.activation_key, u.reset_key,
               u.reset_date, u.created_by, u.created_date, u.last_modified_by,
               u.last_modified_date,
               COALESCE(
                   ARRAY_AGG(ua.authority_name::TEXT) FILTER (WHERE ua.authority_name IS NOT NULL),
                   ARRAY[]::TEXT[]
               ) AS authorities
        FROM app_user u
        LEFT JOIN user_authority ua ON ua.user_id = u.id
        {}
        GROUP BY u.id
        "#,
        where_clause
    )
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    let authorities: Vec<String> = row.try_get("authorities")?;

    Ok(UserRecord {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        image_url: row.try_get("image_url")?,
        activated: row.try_get("activated")?,
        lang_key: row.try_get("lang_key")?,
        activation_key: row.try_get("activation_key")?,
        reset_key: row.try_get("reset_key")?,
        reset_date: row.try_get("reset_date")?,
        created_by: row.try_get("created_by")?,
        created_date: row.try_get("created_date")?,
        last_modified_by: row.try_get("last_modified_by")?,
        last_modified_date: row.try_get("last_modified_date")?,
        authorities: authorities.into_iter().collect::<BTreeSet<_>>(),
    })
}

async fn find_one_user(
    pool: &PgPool,
    where_clause: &str,
    value: &str,
) -> RepositoryResult<Option<UserRecord>> {
    let row = sqlx::query(&user_select(where_clause))
        .bind(value)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(user_from_row).transpose()?)
}

async fn replace_authorities(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    authorities: &BTreeSet<String>,
) -> RepositoryResult<()> {
    sqlx::query("DELETE FROM user_authority WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    let names: Vec<&str> = authorities.iter().map(String::as_str).collect();
    sqlx::query(
        r#"
        INSERT INTO user_authority (user_id, authority_name)
        SELECT $1, UNNEST($2::TEXT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(&names)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// ============================================================================
// Lookups
// ============================================================================

/// Get a user by id
pub async fn find_user_by_id(pool: &PgPool, id: i64) -> RepositoryResult<Option<UserRecord>> {
    let row = sqlx::query(&user_select("WHERE u.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(user_from_row).transpose()?)
}

/// Get a user by login (logins are stored lower-case)
pub async fn find_user_by_login(pool: &PgPool, login: &str) -> RepositoryResult<Option<UserRecord>> {
    find_one_user(pool, "WHERE u.login = $1", login).await
}

/// Get a user by email, ignoring case
pub async fn find_user_by_email(pool: &PgPool, email: &str) -> RepositoryResult<Option<UserRecord>> {
    find_one_user(pool, "WHERE LOWER(u.email) = LOWER($1)", email).await
}

/// Get the user holding an activation key
pub async fn find_user_by_activation_key(
    pool: &PgPool,
    key: &str,
) -> RepositoryResult<Option<UserRecord>> {
    find_one_user(pool, "WHERE u.activation_key = $1", key).await
}

/// Get the user holding a password reset key
pub async fn find_user_by_reset_key(pool: &PgPool, key: &str) -> RepositoryResult<Option<UserRecord>> {
    find_one_user(pool, "WHERE u.reset_key = $1", key).await
}

/// Get one page of all users
pub async fn find_all_users(pool: &PgPool, pageable: &Pageable) -> RepositoryResult<Page<UserRecord>> {
    find_users_page(pool, pageable, "").await
}

/// Get one page of activated users
pub async fn find_all_activated_users(
    pool: &PgPool,
    pageable: &Pageable,
) -> RepositoryResult<Page<UserRecord>> {
    find_users_page(pool, pageable, "WHERE u.activated = TRUE").await
}

async fn find_users_page(
    pool: &PgPool,
    pageable: &Pageable,
    where_clause: &str,
) -> RepositoryResult<Page<UserRecord>> {
    let order_by = order_by_clause(pageable, USER_SORTABLE, "u.")?;

    let total: i64 = sqlx::query(&format!("SELECT COUNT(*) FROM app_user u {}", where_clause))
        .fetch_one(pool)
        .await?
        .try_get(0)?;

    let rows = sqlx::query(&format!(
        "{} {} LIMIT $1 OFFSET $2",
        user_select(where_clause),
        order_by
    ))
    .bind(pageable.limit())
    .bind(pageable.offset())
    .fetch_all(pool)
    .await?;

    let content = rows
        .iter()
        .map(user_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(content, total, pageable))
}

/// Get non-activated users that still hold an activation key and were created before `instant`
pub async fn find_not_activated_users_created_before(
    pool: &PgPool,
    instant: DateTime<Utc>,
) -> RepositoryResult<Vec<UserRecord>> {
    let rows = sqlx::query(&user_select(
        "WHERE u.activated = FALSE AND u.activation_key IS NOT NULL AND u.created_date < $1",
    ))
    .bind(instant)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(user_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

// ============================================================================
// Writes
// ============================================================================

/// Insert a new user and its authorities
///
/// `user.id` is ignored; the stored record is returned with its generated id
/// and creation date.
pub async fn insert_user(pool: &PgPool, user: &UserRecord) -> RepositoryResult<UserRecord> {
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query(
        r#"
        INSERT INTO app_user (
            login, password_hash, first_name, last_name, email, image_url,
            activated, lang_key, activation_key, reset_key, reset_date,
            created_by, created_date, last_modified_by, last_modified_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING id
        "#,
    )
    .bind(&user.login)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.image_url)
    .bind(user.activated)
    .bind(&user.lang_key)
    .bind(&user.activation_key)
    .bind(&user.reset_key)
    .bind(user.reset_date)
    .bind(&user.created_by)
    .bind(user.created_date)
    .bind(&user.last_modified_by)
    .bind(user.last_modified_date)
    .fetch_one(&mut *tx)
    .await?
    .try_get(0)?;

    replace_authorities(&mut tx, id, &user.authorities).await?;
    tx.commit().await?;

    find_user_by_id(pool, id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
}

/// Overwrite a user row and its authorities
pub async fn update_user(pool: &PgPool, user: &UserRecord) -> RepositoryResult<UserRecord> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE app_user SET
            login = $1, password_hash = $2, first_name = $3, last_name = $4,
            email = $5, image_url = $6, activated = $7, lang_key = $8,
            activation_key = $9, reset_key = $10, reset_date = $11,
            last_modified_by = $12, last_modified_date = $13
        WHERE id = $14
        "#,
    )
    .bind(&user.login)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.image_url)
    .bind(user.activated)
    .bind(&user.lang_key)
    .bind(&user.activation_key)
    .bind(&user.reset_key)
    .bind(user.reset_date)
    .bind(&user.last_modified_by)
    .bind(user.last_modified_date)
    .bind(user.id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("user {}", user.id)));
    }

    replace_authorities(&mut tx, user.id, &user.authorities).await?;
    tx.commit().await?;

    find_user_by_id(pool, user.id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user.id)))
}

/// Delete a user by login
///
/// # Returns
/// true if a user was deleted
pub async fn delete_user_by_login(pool: &PgPool, login: &str) -> RepositoryResult<bool> {
    let result = sqlx::query("DELETE FROM app_user WHERE login = $1")
        .bind(login)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a user by id
pub async fn delete_user_by_id(pool: &PgPool, id: i64) -> RepositoryResult<bool> {
    let result = sqlx::query("DELETE FROM app_user WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// Authorities
// ============================================================================

/// Get every authority name, sorted
pub async fn find_all_authorities(pool: &PgPool) -> RepositoryResult<Vec<String>> {
    let rows = sqlx::query("SELECT name FROM authority ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Check whether an authority exists
pub async fn authority_exists(pool: &PgPool, name: &str) -> RepositoryResult<bool> {
    let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM authority WHERE name = $1)")
        .bind(name)
        .fetch_one(pool)
        .await?
        .try_get(0)?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, SortOrder};

    #[test]
    fn test_user_select_includes_filter() {
        let sql = user_select("WHERE u.login = $1");
        assert!(sql.contains("WHERE u.login = $1"));
        assert!(sql.contains("GROUP BY u.id"));
        assert!(sql.find("WHERE u.login").unwrap() < sql.find("GROUP BY").unwrap());
    }

    #[test]
    fn test_user_sort_is_prefixed() {
        let pageable = Pageable {
            page: 0,
            size: 10,
            sort: vec![SortOrder {
                property: "lastName".to_string(),
                direction: Direction::Desc,
            }],
        };
        let clause = order_by_clause(&pageable, USER_SORTABLE, "u.").unwrap();
        assert_eq!(clause, "ORDER BY u.last_name DESC, u.id ASC");
    }

    #[test]
    fn test_user_sort_rejects_password_hash() {
        let pageable = Pageable {
            page: 0,
            size: 10,
            sort: vec![SortOrder {
                property: "passwordHash".to_string(),
                direction: Direction::Asc,
            }],
        };
        assert!(matches!(
            order_by_clause(&pageable, USER_SORTABLE, "u."),
            Err(RepositoryError::InvalidSort(_))
        ));
    }

    async fn test_pool() -> PgPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&database_url).await.expect("Failed to connect");
        sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to migrate");
        pool
    }

    fn new_user(login: &str) -> UserRecord {
        UserRecord {
            id: 0,
            login: login.to_string(),
            password_hash: "$2b$12$placeholderplaceholderplaceholderplaceholderplacehold".to_string(),
            first_name: None,
            last_name: None,
            email: Some(format!("{}@example.com", login)),
            image_url: None,
            activated: false,
            lang_key: Some("en".to_string()),
            activation_key: Some("12345678901234567890".to_string()),
            reset_key: None,
            reset_date: None,
            created_by: "system".to_string(),
            created_date: Utc::now(),
            last_modified_by: None,
            last_modified_date: None,
            authorities: BTreeSet::from(["ROLE_USER".to_string()]),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_seeded_admin_has_both_roles() {
        let pool = test_pool().await;

        let admin = find_user_by_login(&pool, "admin")
            .await
            .expect("Failed to query")
            .expect("Seeded admin should exist");
        assert!(admin.activated);
        assert!(admin.authorities.contains("ROLE_ADMIN"));
        assert!(admin.authorities.contains("ROLE_USER"));

        assert!(authority_exists(&pool, "ROLE_ADMIN").await.unwrap());
        assert!(!authority_exists(&pool, "ROLE_PIRATE").await.unwrap());
        assert_eq!(find_all_authorities(&pool).await.unwrap(), vec!["ROLE_ADMIN", "ROLE_USER"]);
    }

    #[tokio::test]
    #[ignore]
    async fn test_user_insert_update_delete() {
        let pool = test_pool().await;
        let _ = delete_user_by_login(&pool, "repo-test-user").await;

        let saved = insert_user(&pool, &new_user("repo-test-user")).await.expect("Failed to insert");
        assert!(saved.id > 0);
        assert_eq!(saved.authorities.len(), 1);

        let by_email = find_user_by_email(&pool, "REPO-TEST-USER@EXAMPLE.COM").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(saved.id));

        let by_key = find_user_by_activation_key(&pool, "12345678901234567890").await.unwrap();
        assert!(by_key.is_some());

        let mut changed = saved.clone();
        changed.activated = true;
        changed.activation_key = None;
        changed.authorities.insert("ROLE_ADMIN".to_string());
        let updated = update_user(&pool, &changed).await.expect("Failed to update");
        assert!(updated.activated);
        assert_eq!(updated.authorities.len(), 2);

        assert!(delete_user_by_login(&pool, "repo-test-user").await.unwrap());
        assert!(find_user_by_id(&pool, saved.id).await.unwrap().is_none());
    }
}
