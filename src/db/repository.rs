//! Repository module for catalog persistence
//!
//! Generic CRUD, paging and search over any [`Entity`], plus the anime/genre
//! association. SQL is assembled from the entity's column metadata; only
//! values are bound, and sort columns come from a fixed whitelist.

use sqlx::error::ErrorKind;
use sqlx::{PgPool, Row};
use thiserror::Error;

use super::entity::Entity;
use crate::models::{Genre, Page, Pageable};

/// Repository-related errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Cannot sort by property: {0}")]
    InvalidSort(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(
                db_err.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            ) {
                return RepositoryError::Constraint(db_err.message().to_string());
            }
        }
        RepositoryError::DatabaseError(err)
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Build an `ORDER BY` clause from whitelisted properties
///
/// `prefix` qualifies columns (e.g. `"u."`) when the query joins tables.
/// `id` is always appended as a tie-breaker so paging is stable.
pub(crate) fn order_by_clause(
    pageable: &Pageable,
    sortable: &[(&str, &str)],
    prefix: &str,
) -> RepositoryResult<String> {
    let mut terms = Vec::with_capacity(pageable.sort.len() + 1);
    let mut has_id = false;

    for order in &pageable.sort {
        let column = sortable
            .iter()
            .find(|(property, _)| *property == order.property)
            .map(|(_, column)| *column)
            .ok_or_else(|| RepositoryError::InvalidSort(order.property.clone()))?;

        has_id |= column == "id";
        terms.push(format!("{}{} {}", prefix, column, order.direction.as_sql()));
    }

    if !has_id {
        terms.push(format!("{}id ASC", prefix));
    }

    Ok(format!("ORDER BY {}", terms.join(", ")))
}

/// Escape `%`, `_` and `\` and wrap the term for a substring `ILIKE`
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn column_list<T: Entity>() -> String {
    T::COLUMNS.join(", ")
}

fn placeholders(count: usize, start: usize) -> String {
    (start..start + count)
        .map(|n| format!("${}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Generic entity repository
// ============================================================================

/// Get one page of entities ordered by the requested sort (default `id ASC`)
pub async fn find_all<T: Entity>(pool: &PgPool, pageable: &Pageable) -> RepositoryResult<Page<T>> {
    let order_by = order_by_clause(pageable, T::SORTABLE, "")?;

    let total: i64 = sqlx::query(&format!("SELECT COUNT(*) FROM {}", T::TABLE))
        .fetch_one(pool)
        .await?
        .try_get(0)?;

    let rows = sqlx::query(&format!(
        "SELECT id, {} FROM {} {} LIMIT $1 OFFSET $2",
        column_list::<T>(),
        T::TABLE,
        order_by
    ))
    .bind(pageable.limit())
    .bind(pageable.offset())
    .fetch_all(pool)
    .await?;

    let content = rows
        .iter()
        .map(T::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(content, total, pageable))
}

/// Get an entity by id
pub async fn find_by_id<T: Entity>(pool: &PgPool, id: i64) -> RepositoryResult<Option<T>> {
    let row = sqlx::query(&format!(
        "SELECT id, {} FROM {} WHERE id = $1",
        column_list::<T>(),
        T::TABLE
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(T::from_row).transpose()?)
}

/// Check whether an entity with this id exists
pub async fn exists_by_id<T: Entity>(pool: &PgPool, id: i64) -> RepositoryResult<bool> {
    let exists: bool = sqlx::query(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
        T::TABLE
    ))
    .bind(id)
    .fetch_one(pool)
    .await?
    .try_get(0)?;

    Ok(exists)
}

/// Insert a new entity and return it with its generated id
///
/// Any id already set on `entity` is ignored.
pub async fn insert<T: Entity>(pool: &PgPool, entity: &T) -> RepositoryResult<T> {
    let mut entity = entity.clone();
    entity.prepare_insert();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING id, {}",
        T::TABLE,
        column_list::<T>(),
        placeholders(T::COLUMNS.len(), 1),
        column_list::<T>()
    );

    let row = entity.bind(sqlx::query(&sql)).fetch_one(pool).await?;
    Ok(T::from_row(&row)?)
}

/// Overwrite every column of an existing entity
///
/// # Returns
/// The stored entity, or `NotFound` when no row has this id
pub async fn update<T: Entity>(pool: &PgPool, entity: &T) -> RepositoryResult<T> {
    let id = entity
        .id()
        .ok_or_else(|| RepositoryError::NotFound(format!("{} without id", T::NAME)))?;

    let assignments = T::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ${}", column, i + 1))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ${} RETURNING id, {}",
        T::TABLE,
        assignments,
        T::COLUMNS.len() + 1,
        column_list::<T>()
    );

    let row = entity
        .bind(sqlx::query(&sql))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("{} {}", T::NAME, id)))?;

    Ok(T::from_row(&row)?)
}

/// Delete an entity by id
///
/// # Returns
/// true if a row was deleted
pub async fn delete_by_id<T: Entity>(pool: &PgPool, id: i64) -> RepositoryResult<bool> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", T::TABLE))
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Case-insensitive substring search across the entity's text columns
///
/// Entities without searchable columns only match when the query is the
/// decimal id of a row.
pub async fn search<T: Entity>(
    pool: &PgPool,
    query: &str,
    pageable: &Pageable,
) -> RepositoryResult<Page<T>> {
    let order_by = order_by_clause(pageable, T::SORTABLE, "")?;

    let mut conditions: Vec<String> = T::SEARCHABLE
        .iter()
        .map(|column| format!("{} ILIKE $1", column))
        .collect();
    conditions.push("id::TEXT = $2".to_string());
    let where_clause = conditions.join(" OR ");

    let pattern = like_pattern(query.trim());
    let exact = query.trim().to_string();

    let total: i64 = sqlx::query(&format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        T::TABLE,
        where_clause
    ))
    .bind(&pattern)
    .bind(&exact)
    .fetch_one(pool)
    .await?
    .try_get(0)?;

    let rows = sqlx::query(&format!(
        "SELECT id, {} FROM {} WHERE {} {} LIMIT $3 OFFSET $4",
        column_list::<T>(),
        T::TABLE,
        where_clause,
        order_by
    ))
    .bind(&pattern)
    .bind(&exact)
    .bind(pageable.limit())
    .bind(pageable.offset())
    .fetch_all(pool)
    .await?;

    let content = rows
        .iter()
        .map(T::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(content, total, pageable))
}

// ============================================================================
// Anime genres
// ============================================================================

/// Get the genres linked to an anime, ordered by name
pub async fn get_anime_genres(pool: &PgPool, anime_id: i64) -> RepositoryResult<Vec<Genre>> {
    let rows = sqlx::query(
        r#"
        SELECT g.id, g.name, g.description
        FROM genre g
        JOIN anime_genre ag ON ag.genre_id = g.id
        WHERE ag.anime_id = $1
        ORDER BY g.name
        "#,
    )
    .bind(anime_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(<Genre as Entity>::from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

/// Replace the genres linked to an anime in one transaction
///
/// Unknown genre ids fail the whole replacement with a constraint error.
pub async fn set_anime_genres(
    pool: &PgPool,
    anime_id: i64,
    genre_ids: &[i64],
) -> RepositoryResult<Vec<Genre>> {
    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM anime WHERE id = $1)")
        .bind(anime_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get(0)?;
    if !exists {
        return Err(RepositoryError::NotFound(format!("anime {}", anime_id)));
    }

    sqlx::query("DELETE FROM anime_genre WHERE anime_id = $1")
        .bind(anime_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO anime_genre (anime_id, genre_id)
        SELECT $1, UNNEST($2::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(anime_id)
    .bind(genre_ids)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_anime_genres(pool, anime_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anime, Direction, SortOrder, Studio};

    fn pageable(sort: &[(&str, Direction)]) -> Pageable {
        Pageable {
            page: 0,
            size: 20,
            sort: sort
                .iter()
                .map(|(property, direction)| SortOrder {
                    property: property.to_string(),
                    direction: *direction,
                })
                .collect(),
        }
    }

    #[test]
    fn test_order_by_defaults_to_id() {
        let clause = order_by_clause(&pageable(&[]), Anime::SORTABLE, "").unwrap();
        assert_eq!(clause, "ORDER BY id ASC");
    }

    #[test]
    fn test_order_by_maps_properties_to_columns() {
        let clause = order_by_clause(
            &pageable(&[("releaseDate", Direction::Desc), ("title", Direction::Desc)]),
            Anime::SORTABLE,
            "",
        )
        .unwrap();
        assert_eq!(clause, "ORDER BY release_date DESC, title DESC, id ASC");
    }

    #[test]
    fn test_order_by_with_prefix_and_explicit_id() {
        let clause = order_by_clause(
            &pageable(&[("id", Direction::Desc)]),
            &[("id", "id"), ("login", "login")],
            "u.",
        )
        .unwrap();
        assert_eq!(clause, "ORDER BY u.id DESC");
    }

    #[test]
    fn test_order_by_rejects_unknown_property() {
        let err = order_by_clause(&pageable(&[("title; DROP TABLE anime", Direction::Asc)]), Anime::SORTABLE, "")
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidSort(_)));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bebop"), "%bebop%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3, 1), "$1, $2, $3");
        assert_eq!(placeholders(1, 4), "$4");
    }

    async fn test_pool() -> PgPool {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&database_url).await.expect("Failed to connect");
        sqlx::migrate!("./migrations").run(&pool).await.expect("Failed to migrate");
        pool
    }

    fn test_studio(name: &str) -> Studio {
        Studio {
            id: None,
            name: name.to_string(),
            country: Some("Japan".to_string()),
            founded_year: Some(1985),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_studio_crud() {
        let pool = test_pool().await;

        let saved = insert(&pool, &test_studio("Test Studio CRUD")).await.expect("Failed to insert");
        let id = saved.id.expect("Should have an id");
        assert!(exists_by_id::<Studio>(&pool, id).await.unwrap());

        let mut changed = saved.clone();
        changed.country = Some("France".to_string());
        let updated = update(&pool, &changed).await.expect("Failed to update");
        assert_eq!(updated.country.as_deref(), Some("France"));

        let fetched = find_by_id::<Studio>(&pool, id).await.unwrap().expect("Should find studio");
        assert_eq!(fetched, updated);

        assert!(delete_by_id::<Studio>(&pool, id).await.unwrap());
        assert!(!delete_by_id::<Studio>(&pool, id).await.unwrap());
        assert!(find_by_id::<Studio>(&pool, id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_update_missing_row_is_not_found() {
        let pool = test_pool().await;

        let mut ghost = test_studio("Ghost Studio");
        ghost.id = Some(i64::MAX);
        let err = update(&pool, &ghost).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_search_is_case_insensitive() {
        let pool = test_pool().await;

        let saved = insert(&pool, &test_studio("Search Target Studio")).await.unwrap();
        let page = search::<Studio>(&pool, "target STUDIO", &Pageable::default()).await.unwrap();
        assert!(page.content.iter().any(|s| s.id == saved.id));
        assert!(page.total >= 1);

        delete_by_id::<Studio>(&pool, saved.id.unwrap()).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_anime_genres_replace() {
        let pool = test_pool().await;

        let anime = insert(
            &pool,
            &Anime {
                id: None,
                title: "Genre Test Anime".to_string(),
                alternative_title: None,
                synopsis: None,
                anime_type: None,
                status: None,
                release_date: None,
                total_episodes: None,
                score: None,
                poster_url: None,
                studio_id: None,
            },
        )
        .await
        .unwrap();
        let anime_id = anime.id.unwrap();

        let genre = insert(
            &pool,
            &Genre {
                id: None,
                name: format!("genre-test-{}", anime_id),
                description: None,
            },
        )
        .await
        .unwrap();
        let genre_id = genre.id.unwrap();

        let genres = set_anime_genres(&pool, anime_id, &[genre_id, genre_id]).await.unwrap();
        assert_eq!(genres.len(), 1);

        let err = set_anime_genres(&pool, anime_id, &[i64::MAX]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint(_)));
        assert_eq!(get_anime_genres(&pool, anime_id).await.unwrap().len(), 1);

        delete_by_id::<Anime>(&pool, anime_id).await.unwrap();
        delete_by_id::<Genre>(&pool, genre_id).await.unwrap();
    }
}
