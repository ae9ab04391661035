//! Table metadata and row mapping shared by every catalog entity
//!
//! The generic repository in [`super::repository`] builds its SQL from the
//! constants declared here, so adding an entity only needs a model struct, a
//! migration and an `Entity` impl.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::str::FromStr;

use crate::models::catalog::UnknownVariant;

/// A query with Postgres arguments still being bound
pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// A record persisted in its own table with a `BIGSERIAL id` primary key
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Table name
    const TABLE: &'static str;

    /// Name used in alert headers, e.g. `animeCatalogApp.watchHistory.created`
    const NAME: &'static str;

    /// REST path segment, e.g. `watch-histories`
    const PATH: &'static str;

    /// Writable columns, in the order [`Entity::bind`] binds them
    const COLUMNS: &'static [&'static str];

    /// API property name to column for `ORDER BY`
    const SORTABLE: &'static [(&'static str, &'static str)];

    /// Text columns matched by the search endpoint
    const SEARCHABLE: &'static [&'static str];

    /// Whether creating, updating or deleting requires `ROLE_ADMIN`
    const ADMIN_WRITES: bool = false;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: Option<i64>);

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;

    /// Bind every column of [`Entity::COLUMNS`] in order
    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q>;

    /// Field constraints checked before any write
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Fill server-side defaults (creation timestamps) before an insert
    fn prepare_insert(&mut self) {}
}

/// Read a nullable TEXT column holding an enum value
pub(crate) fn decode_enum<T>(row: &PgRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr<Err = UnknownVariant>,
{
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| raw.parse::<T>())
        .transpose()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Apply a JSON merge patch to an existing record
///
/// Properties that are absent or `null` in the patch keep their stored value
/// and `id` is never overwritten.
pub fn merge_patch<T: Entity>(existing: &T, patch: &Value) -> Result<T, serde_json::Error> {
    let mut merged = serde_json::to_value(existing)?;

    if let (Value::Object(target), Value::Object(changes)) = (&mut merged, patch) {
        for (key, value) in changes {
            if key == "id" || value.is_null() {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
    }

    let mut result: T = serde_json::from_value(merged)?;
    result.set_id(existing.id());
    Ok(result)
}

/// Check a required text field is present and within `max` characters
pub(crate) fn check_text(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(format!("{} must be between {} and {} characters", field, min, max));
    }
    Ok(())
}

/// Check an optional text field does not exceed `max` characters
pub(crate) fn check_optional_text(field: &str, value: &Option<String>, max: usize) -> Result<(), String> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(format!("{} must be at most {} characters", field, max))
        }
        _ => Ok(()),
    }
}

/// Check an optional number lies in `range`
pub(crate) fn check_range<N>(field: &str, value: Option<N>, range: std::ops::RangeInclusive<N>) -> Result<(), String>
where
    N: PartialOrd + std::fmt::Display + Copy,
{
    match value {
        Some(v) if !range.contains(&v) => Err(format!(
            "{} must be between {} and {}",
            field,
            range.start(),
            range.end()
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Studio;
    use serde_json::json;

    fn studio() -> Studio {
        Studio {
            id: Some(5),
            name: "Sunrise".to_string(),
            country: Some("Japan".to_string()),
            founded_year: Some(1972),
        }
    }

    #[test]
    fn test_merge_patch_overwrites_present_fields() {
        let patched = merge_patch(&studio(), &json!({"name": "Bandai Namco Filmworks"})).unwrap();
        assert_eq!(patched.name, "Bandai Namco Filmworks");
        assert_eq!(patched.country.as_deref(), Some("Japan"));
        assert_eq!(patched.founded_year, Some(1972));
    }

    #[test]
    fn test_merge_patch_keeps_fields_sent_as_null() {
        let patched = merge_patch(&studio(), &json!({"country": null, "foundedYear": 1975})).unwrap();
        assert_eq!(patched.country.as_deref(), Some("Japan"));
        assert_eq!(patched.founded_year, Some(1975));
    }

    #[test]
    fn test_merge_patch_ignores_id() {
        let patched = merge_patch(&studio(), &json!({"id": 99})).unwrap();
        assert_eq!(patched.id, Some(5));
    }

    #[test]
    fn test_merge_patch_rejects_wrong_types() {
        assert!(merge_patch(&studio(), &json!({"foundedYear": "long ago"})).is_err());
    }

    #[test]
    fn test_check_helpers() {
        assert!(check_text("Name", "", 1, 10).is_err());
        assert!(check_text("Name", "ok", 1, 10).is_ok());
        assert!(check_optional_text("Bio", &None, 3).is_ok());
        assert!(check_optional_text("Bio", &Some("long".to_string()), 3).is_err());
        assert!(check_range("Score", Some(11), 1..=10).is_err());
        assert!(check_range("Score", None::<i32>, 1..=10).is_ok());
        assert_eq!(
            check_range("Score", Some(0.0), 0.5..=10.0).unwrap_err(),
            "Score must be between 0.5 and 10"
        );
    }
}
