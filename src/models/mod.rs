//! Data models for the Anime Catalog API
//!
//! This module contains all data structures used throughout the application:
//! catalog entities, account DTOs, pagination types and the API envelopes.

pub mod catalog;
pub mod page;
pub mod user;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use catalog::{
    Anime, AnimeStatus, AnimeType, Character, CharacterRole, Comment, Episode, Favorite, Genre,
    Review, Season, SeasonOfYear, Studio, UserProfile, WatchHistory,
};
pub use page::{Direction, Page, PageParams, Pageable, SortOrder};
pub use user::{
    AdminUserDto, JwtToken, KeyAndPasswordVm, LoginVm, ManagedUserVm, PasswordChangeDto,
    UserDto, UserRecord,
};

/// Generic API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the operation was successful (always true for this type)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// ISO timestamp of the response
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Create a new successful API response with the current timestamp
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Whether the operation was successful (always false for errors)
    pub success: bool,
    /// Error message describing what went wrong
    pub error: String,
    /// ISO timestamp of when the error occurred
    pub timestamp: String,
}

impl ApiError {
    /// Create a new API error response with the current timestamp
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
