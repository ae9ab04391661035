//! Catalog entities
//!
//! Anime titles and everything hanging off them (seasons, episodes, characters,
//! genres, studios) plus the user-owned records: comments, favorites, watch
//! history, profiles and reviews.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Raised when a stored enum column holds a value this build does not know
#[derive(Debug, Error)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a string-backed enum stored as TEXT and serialized in SCREAMING_SNAKE_CASE
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Database / wire representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Broadcast format of an anime
    AnimeType {
        Tv => "TV",
        Movie => "MOVIE",
        Ova => "OVA",
        Ona => "ONA",
        Special => "SPECIAL",
        Music => "MUSIC",
    }
);

text_enum!(
    /// Airing status of an anime
    AnimeStatus {
        Upcoming => "UPCOMING",
        Airing => "AIRING",
        Finished => "FINISHED",
        Hiatus => "HIATUS",
    }
);

text_enum!(
    /// Broadcast season
    SeasonOfYear {
        Winter => "WINTER",
        Spring => "SPRING",
        Summer => "SUMMER",
        Fall => "FALL",
    }
);

text_enum!(
    /// Importance of a character within its anime
    CharacterRole {
        Main => "MAIN",
        Supporting => "SUPPORTING",
        Background => "BACKGROUND",
    }
);

/// An anime title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Anime {
    pub id: Option<i64>,
    pub title: String,
    pub alternative_title: Option<String>,
    pub synopsis: Option<String>,
    pub anime_type: Option<AnimeType>,
    pub status: Option<AnimeStatus>,
    pub release_date: Option<NaiveDate>,
    pub total_episodes: Option<i32>,
    /// Aggregate score between 0 and 10
    pub score: Option<f64>,
    pub poster_url: Option<String>,
    pub studio_id: Option<i64>,
}

/// A season (cour) of an anime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub id: Option<i64>,
    pub anime_id: i64,
    pub number: i32,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub season_of_year: Option<SeasonOfYear>,
}

/// A single episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: Option<i64>,
    pub anime_id: i64,
    pub season_id: Option<i64>,
    pub number: i32,
    pub title: Option<String>,
    pub duration_minutes: Option<i32>,
    pub air_date: Option<NaiveDate>,
    pub synopsis: Option<String>,
}

/// A character appearing in an anime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: Option<i64>,
    pub anime_id: i64,
    pub name: String,
    pub role: Option<CharacterRole>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// A genre label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

/// An animation studio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Studio {
    pub id: Option<i64>,
    pub name: String,
    pub country: Option<String>,
    pub founded_year: Option<i32>,
}

/// A user comment on an anime, optionally pinned to an episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Option<i64>,
    pub anime_id: i64,
    pub episode_id: Option<i64>,
    pub user_id: i64,
    pub content: String,
    pub created_date: Option<DateTime<Utc>>,
}

/// An anime a user marked as favorite
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: Option<i64>,
    pub user_id: i64,
    pub anime_id: i64,
    pub created_date: Option<DateTime<Utc>>,
}

/// One watched (or partially watched) episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WatchHistory {
    pub id: Option<i64>,
    pub user_id: i64,
    pub episode_id: i64,
    pub watched_at: Option<DateTime<Utc>>,
    pub progress_seconds: Option<i32>,
    pub completed: Option<bool>,
}

/// Public profile attached to an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Option<i64>,
    pub user_id: i64,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub country: Option<String>,
}

/// A scored review of an anime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Option<i64>,
    pub anime_id: i64,
    pub user_id: i64,
    /// Score between 1 and 10
    pub score: i32,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anime_type_round_trips_through_text() {
        assert_eq!(AnimeType::Tv.as_str(), "TV");
        assert_eq!("OVA".parse::<AnimeType>().unwrap(), AnimeType::Ova);
        assert_eq!(AnimeType::Special.to_string(), "SPECIAL");
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = "WEEKLY".parse::<AnimeStatus>().unwrap_err();
        assert_eq!(err.kind, "AnimeStatus");
        assert_eq!(err.to_string(), "Unknown AnimeStatus value: WEEKLY");
    }

    #[test]
    fn test_enum_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&SeasonOfYear::Winter).unwrap();
        assert_eq!(json, "\"WINTER\"");

        let role: CharacterRole = serde_json::from_str("\"SUPPORTING\"").unwrap();
        assert_eq!(role, CharacterRole::Supporting);
    }

    #[test]
    fn test_anime_serialization_uses_camel_case() {
        let anime = Anime {
            id: Some(1),
            title: "Cowboy Bebop".to_string(),
            alternative_title: Some("カウボーイビバップ".to_string()),
            synopsis: None,
            anime_type: Some(AnimeType::Tv),
            status: Some(AnimeStatus::Finished),
            release_date: NaiveDate::from_ymd_opt(1998, 4, 3),
            total_episodes: Some(26),
            score: Some(8.8),
            poster_url: None,
            studio_id: Some(3),
        };

        let json = serde_json::to_string(&anime).unwrap();
        assert!(json.contains("\"alternativeTitle\""));
        assert!(json.contains("\"animeType\":\"TV\""));
        assert!(json.contains("\"releaseDate\":\"1998-04-03\""));
        assert!(json.contains("\"studioId\":3"));
    }

    #[test]
    fn test_anime_deserialization_without_optional_fields() {
        let json = r#"{"title": "Mushishi"}"#;

        let anime: Anime = serde_json::from_str(json).unwrap();
        assert_eq!(anime.id, None);
        assert_eq!(anime.title, "Mushishi");
        assert_eq!(anime.anime_type, None);
    }

    #[test]
    fn test_anime_deserialization_requires_title() {
        let json = r#"{"synopsis": "no title"}"#;
        assert!(serde_json::from_str::<Anime>(json).is_err());
    }

    #[test]
    fn test_watch_history_deserialization() {
        let json = r#"{
            "userId": 4,
            "episodeId": 12,
            "progressSeconds": 640,
            "completed": false
        }"#;

        let entry: WatchHistory = serde_json::from_str(json).unwrap();
        assert_eq!(entry.user_id, 4);
        assert_eq!(entry.episode_id, 12);
        assert_eq!(entry.progress_seconds, Some(640));
        assert_eq!(entry.completed, Some(false));
        assert!(entry.watched_at.is_none());
    }
}
