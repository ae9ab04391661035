//! `Entity` implementations for the catalog and user-owned tables

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::entity::{check_optional_text, check_range, check_text, decode_enum, Entity, PgQuery};
use crate::models::{
    Anime, Character, Comment, Episode, Favorite, Genre, Review, Season, Studio, UserProfile,
    WatchHistory,
};

// ============================================================================
// Catalog reference data (admin writes)
// ============================================================================

impl Entity for Anime {
    const TABLE: &'static str = "anime";
    const NAME: &'static str = "anime";
    const PATH: &'static str = "animes";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "alternative_title",
        "synopsis",
        "anime_type",
        "status",
        "release_date",
        "total_episodes",
        "score",
        "poster_url",
        "studio_id",
    ];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("title", "title"),
        ("alternativeTitle", "alternative_title"),
        ("animeType", "anime_type"),
        ("status", "status"),
        ("releaseDate", "release_date"),
        ("totalEpisodes", "total_episodes"),
        ("score", "score"),
        ("studioId", "studio_id"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["title", "alternative_title", "synopsis"];
    const ADMIN_WRITES: bool = true;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            title: row.try_get("title")?,
            alternative_title: row.try_get("alternative_title")?,
            synopsis: row.try_get("synopsis")?,
            anime_type: decode_enum(row, "anime_type")?,
            status: decode_enum(row, "status")?,
            release_date: row.try_get("release_date")?,
            total_episodes: row.try_get("total_episodes")?,
            score: row.try_get("score")?,
            poster_url: row.try_get("poster_url")?,
            studio_id: row.try_get("studio_id")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(&self.title)
            .bind(self.alternative_title.as_deref())
            .bind(self.synopsis.as_deref())
            .bind(self.anime_type.map(|t| t.as_str()))
            .bind(self.status.map(|s| s.as_str()))
            .bind(self.release_date)
            .bind(self.total_episodes)
            .bind(self.score)
            .bind(self.poster_url.as_deref())
            .bind(self.studio_id)
    }

    fn validate(&self) -> Result<(), String> {
        check_text("Title", &self.title, 1, 255)?;
        check_optional_text("Alternative title", &self.alternative_title, 255)?;
        check_optional_text("Synopsis", &self.synopsis, 4000)?;
        check_range("Total episodes", self.total_episodes, 0..=i32::MAX)?;
        check_range("Score", self.score, 0.0..=10.0)?;
        check_optional_text("Poster URL", &self.poster_url, 512)
    }
}

impl Entity for Season {
    const TABLE: &'static str = "season";
    const NAME: &'static str = "season";
    const PATH: &'static str = "seasons";
    const COLUMNS: &'static [&'static str] =
        &["anime_id", "number", "title", "year", "season_of_year"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("animeId", "anime_id"),
        ("number", "number"),
        ("title", "title"),
        ("year", "year"),
        ("seasonOfYear", "season_of_year"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["title"];
    const ADMIN_WRITES: bool = true;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            anime_id: row.try_get("anime_id")?,
            number: row.try_get("number")?,
            title: row.try_get("title")?,
            year: row.try_get("year")?,
            season_of_year: decode_enum(row, "season_of_year")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.anime_id)
            .bind(self.number)
            .bind(self.title.as_deref())
            .bind(self.year)
            .bind(self.season_of_year.map(|s| s.as_str()))
    }

    fn validate(&self) -> Result<(), String> {
        check_range("Number", Some(self.number), 1..=i32::MAX)?;
        check_optional_text("Title", &self.title, 255)?;
        check_range("Year", self.year, 1900..=2100)
    }
}

impl Entity for Episode {
    const TABLE: &'static str = "episode";
    const NAME: &'static str = "episode";
    const PATH: &'static str = "episodes";
    const COLUMNS: &'static [&'static str] = &[
        "anime_id",
        "season_id",
        "number",
        "title",
        "duration_minutes",
        "air_date",
        "synopsis",
    ];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("animeId", "anime_id"),
        ("seasonId", "season_id"),
        ("number", "number"),
        ("title", "title"),
        ("durationMinutes", "duration_minutes"),
        ("airDate", "air_date"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["title", "synopsis"];
    const ADMIN_WRITES: bool = true;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            anime_id: row.try_get("anime_id")?,
            season_id: row.try_get("season_id")?,
            number: row.try_get("number")?,
            title: row.try_get("title")?,
            duration_minutes: row.try_get("duration_minutes")?,
            air_date: row.try_get("air_date")?,
            synopsis: row.try_get("synopsis")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.anime_id)
            .bind(self.season_id)
            .bind(self.number)
            .bind(self.title.as_deref())
            .bind(self.duration_minutes)
            .bind(self.air_date)
            .bind(self.synopsis.as_deref())
    }

    fn validate(&self) -> Result<(), String> {
        check_range("Number", Some(self.number), 1..=i32::MAX)?;
        check_optional_text("Title", &self.title, 255)?;
        check_range("Duration", self.duration_minutes, 0..=i32::MAX)
    }
}

impl Entity for Character {
    const TABLE: &'static str = "anime_character";
    const NAME: &'static str = "character";
    const PATH: &'static str = "characters";
    const COLUMNS: &'static [&'static str] =
        &["anime_id", "name", "role", "description", "image_url"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("animeId", "anime_id"),
        ("name", "name"),
        ("role", "role"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["name", "description"];
    const ADMIN_WRITES: bool = true;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            anime_id: row.try_get("anime_id")?,
            name: row.try_get("name")?,
            role: decode_enum(row, "role")?,
            description: row.try_get("description")?,
            image_url: row.try_get("image_url")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.anime_id)
            .bind(&self.name)
            .bind(self.role.map(|r| r.as_str()))
            .bind(self.description.as_deref())
            .bind(self.image_url.as_deref())
    }

    fn validate(&self) -> Result<(), String> {
        check_text("Name", &self.name, 1, 255)?;
        check_optional_text("Image URL", &self.image_url, 512)
    }
}

impl Entity for Genre {
    const TABLE: &'static str = "genre";
    const NAME: &'static str = "genre";
    const PATH: &'static str = "genres";
    const COLUMNS: &'static [&'static str] = &["name", "description"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[("id", "id"), ("name", "name")];
    const SEARCHABLE: &'static [&'static str] = &["name", "description"];
    const ADMIN_WRITES: bool = true;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query.bind(&self.name).bind(self.description.as_deref())
    }

    fn validate(&self) -> Result<(), String> {
        check_text("Name", &self.name, 1, 100)
    }
}

impl Entity for Studio {
    const TABLE: &'static str = "studio";
    const NAME: &'static str = "studio";
    const PATH: &'static str = "studios";
    const COLUMNS: &'static [&'static str] = &["name", "country", "founded_year"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("name", "name"),
        ("country", "country"),
        ("foundedYear", "founded_year"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["name", "country"];
    const ADMIN_WRITES: bool = true;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            name: row.try_get("name")?,
            country: row.try_get("country")?,
            founded_year: row.try_get("founded_year")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(&self.name)
            .bind(self.country.as_deref())
            .bind(self.founded_year)
    }

    fn validate(&self) -> Result<(), String> {
        check_text("Name", &self.name, 1, 255)?;
        check_optional_text("Country", &self.country, 100)
    }
}

// ============================================================================
// User-owned records
// ============================================================================

impl Entity for Comment {
    const TABLE: &'static str = "comment";
    const NAME: &'static str = "comment";
    const PATH: &'static str = "comments";
    const COLUMNS: &'static [&'static str] =
        &["anime_id", "episode_id", "user_id", "content", "created_date"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("animeId", "anime_id"),
        ("episodeId", "episode_id"),
        ("userId", "user_id"),
        ("createdDate", "created_date"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["content"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            anime_id: row.try_get("anime_id")?,
            episode_id: row.try_get("episode_id")?,
            user_id: row.try_get("user_id")?,
            content: row.try_get("content")?,
            created_date: row.try_get("created_date")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.anime_id)
            .bind(self.episode_id)
            .bind(self.user_id)
            .bind(&self.content)
            .bind(self.created_date)
    }

    fn validate(&self) -> Result<(), String> {
        check_text("Content", &self.content, 1, 2000)
    }

    fn prepare_insert(&mut self) {
        self.created_date.get_or_insert_with(Utc::now);
    }
}

impl Entity for Favorite {
    const TABLE: &'static str = "favorite";
    const NAME: &'static str = "favorite";
    const PATH: &'static str = "favorites";
    const COLUMNS: &'static [&'static str] = &["user_id", "anime_id", "created_date"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("userId", "user_id"),
        ("animeId", "anime_id"),
        ("createdDate", "created_date"),
    ];
    const SEARCHABLE: &'static [&'static str] = &[];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            user_id: row.try_get("user_id")?,
            anime_id: row.try_get("anime_id")?,
            created_date: row.try_get("created_date")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.user_id)
            .bind(self.anime_id)
            .bind(self.created_date)
    }

    fn prepare_insert(&mut self) {
        self.created_date.get_or_insert_with(Utc::now);
    }
}

impl Entity for WatchHistory {
    const TABLE: &'static str = "watch_history";
    const NAME: &'static str = "watchHistory";
    const PATH: &'static str = "watch-histories";
    const COLUMNS: &'static [&'static str] =
        &["user_id", "episode_id", "watched_at", "progress_seconds", "completed"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("userId", "user_id"),
        ("episodeId", "episode_id"),
        ("watchedAt", "watched_at"),
        ("progressSeconds", "progress_seconds"),
        ("completed", "completed"),
    ];
    const SEARCHABLE: &'static [&'static str] = &[];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            user_id: row.try_get("user_id")?,
            episode_id: row.try_get("episode_id")?,
            watched_at: row.try_get("watched_at")?,
            progress_seconds: row.try_get("progress_seconds")?,
            completed: row.try_get("completed")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.user_id)
            .bind(self.episode_id)
            .bind(self.watched_at)
            .bind(self.progress_seconds)
            .bind(self.completed)
    }

    fn validate(&self) -> Result<(), String> {
        check_range("Progress", self.progress_seconds, 0..=i32::MAX)
    }

    fn prepare_insert(&mut self) {
        self.watched_at.get_or_insert_with(Utc::now);
    }
}

impl Entity for UserProfile {
    const TABLE: &'static str = "user_profile";
    const NAME: &'static str = "userProfile";
    const PATH: &'static str = "user-profiles";
    const COLUMNS: &'static [&'static str] = &[
        "user_id",
        "display_name",
        "bio",
        "avatar_url",
        "birth_date",
        "country",
    ];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("userId", "user_id"),
        ("displayName", "display_name"),
        ("birthDate", "birth_date"),
        ("country", "country"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["display_name", "bio", "country"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            bio: row.try_get("bio")?,
            avatar_url: row.try_get("avatar_url")?,
            birth_date: row.try_get("birth_date")?,
            country: row.try_get("country")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.user_id)
            .bind(self.display_name.as_deref())
            .bind(self.bio.as_deref())
            .bind(self.avatar_url.as_deref())
            .bind(self.birth_date)
            .bind(self.country.as_deref())
    }

    fn validate(&self) -> Result<(), String> {
        check_optional_text("Display name", &self.display_name, 100)?;
        check_optional_text("Bio", &self.bio, 2000)?;
        check_optional_text("Avatar URL", &self.avatar_url, 512)?;
        check_optional_text("Country", &self.country, 100)
    }
}

impl Entity for Review {
    const TABLE: &'static str = "review";
    const NAME: &'static str = "review";
    const PATH: &'static str = "reviews";
    const COLUMNS: &'static [&'static str] =
        &["anime_id", "user_id", "score", "title", "content", "created_date"];
    const SORTABLE: &'static [(&'static str, &'static str)] = &[
        ("id", "id"),
        ("animeId", "anime_id"),
        ("userId", "user_id"),
        ("score", "score"),
        ("title", "title"),
        ("createdDate", "created_date"),
    ];
    const SEARCHABLE: &'static [&'static str] = &["title", "content"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: Option<i64>) {
        self.id = id;
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            anime_id: row.try_get("anime_id")?,
            user_id: row.try_get("user_id")?,
            score: row.try_get("score")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            created_date: row.try_get("created_date")?,
        })
    }

    fn bind<'q>(&'q self, query: PgQuery<'q>) -> PgQuery<'q> {
        query
            .bind(self.anime_id)
            .bind(self.user_id)
            .bind(self.score)
            .bind(self.title.as_deref())
            .bind(self.content.as_deref())
            .bind(self.created_date)
    }

    fn validate(&self) -> Result<(), String> {
        check_range("Score", Some(self.score), 1..=10)?;
        check_optional_text("Title", &self.title, 255)
    }

    fn prepare_insert(&mut self) {
        self.created_date.get_or_insert_with(Utc::now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnimeType;

    fn columns_are_sortable<T: Entity>() {
        for (_, column) in T::SORTABLE {
            assert!(
                *column == "id" || T::COLUMNS.contains(column),
                "{} sorts by unknown column {}",
                T::TABLE,
                column
            );
        }
        for column in T::SEARCHABLE {
            assert!(T::COLUMNS.contains(column), "{} searches unknown column {}", T::TABLE, column);
        }
    }

    #[test]
    fn test_sortable_and_searchable_columns_exist() {
        columns_are_sortable::<Anime>();
        columns_are_sortable::<Season>();
        columns_are_sortable::<Episode>();
        columns_are_sortable::<Character>();
        columns_are_sortable::<Genre>();
        columns_are_sortable::<Studio>();
        columns_are_sortable::<Comment>();
        columns_are_sortable::<Favorite>();
        columns_are_sortable::<WatchHistory>();
        columns_are_sortable::<UserProfile>();
        columns_are_sortable::<Review>();
    }

    #[test]
    fn test_reference_data_requires_admin() {
        assert!(Anime::ADMIN_WRITES);
        assert!(Genre::ADMIN_WRITES);
        assert!(Studio::ADMIN_WRITES);
        assert!(!Comment::ADMIN_WRITES);
        assert!(!WatchHistory::ADMIN_WRITES);
    }

    #[test]
    fn test_anime_validation() {
        let mut anime = Anime {
            id: None,
            title: "Trigun".to_string(),
            alternative_title: None,
            synopsis: None,
            anime_type: Some(AnimeType::Tv),
            status: None,
            release_date: None,
            total_episodes: Some(26),
            score: Some(8.2),
            poster_url: None,
            studio_id: None,
        };
        assert!(anime.validate().is_ok());

        anime.score = Some(10.5);
        assert!(anime.validate().is_err());

        anime.score = None;
        anime.title = String::new();
        assert!(anime.validate().is_err());
    }

    #[test]
    fn test_review_score_bounds() {
        let mut review = Review {
            id: None,
            anime_id: 1,
            user_id: 2,
            score: 0,
            title: None,
            content: None,
            created_date: None,
        };
        assert!(review.validate().is_err());
        review.score = 10;
        assert!(review.validate().is_ok());
    }

    #[test]
    fn test_prepare_insert_stamps_creation_time() {
        let mut favorite = Favorite {
            id: None,
            user_id: 1,
            anime_id: 2,
            created_date: None,
        };
        favorite.prepare_insert();
        assert!(favorite.created_date.is_some());

        let stamped = favorite.created_date;
        favorite.prepare_insert();
        assert_eq!(favorite.created_date, stamped);
    }
}
