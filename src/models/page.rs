//! Pagination request/response types shared by repositories and routes

use serde::Deserialize;
use utoipa::IntoParams;

/// Page size used when the client does not send one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a client may request
pub const MAX_PAGE_SIZE: u32 = 2000;

/// Raw pagination query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Zero-based page index
    pub page: Option<u32>,
    /// Page size (default 20, max 2000)
    pub size: Option<u32>,
    /// `property` or `property,asc|desc`; several properties may share one direction
    pub sort: Option<String>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }
}

/// One `ORDER BY` term, still expressed as an API property name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

/// Validated pagination request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    pub page: u32,
    pub size: u32,
    pub sort: Vec<SortOrder>,
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: Vec::new(),
        }
    }
}

impl Pageable {
    /// Build a pageable from query parameters
    ///
    /// A zero size falls back to the default and oversized pages are clamped.
    /// Sort properties are not checked here; repositories reject the ones they
    /// cannot order by.
    pub fn from_params(params: &PageParams) -> Self {
        let size = match params.size {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(size) => size.min(MAX_PAGE_SIZE),
        };

        Self {
            page: params.page.unwrap_or(0),
            size,
            sort: params.sort.as_deref().map(parse_sort).unwrap_or_default(),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }
}

/// Parse `a,b,desc` into orders; a trailing direction applies to every property
fn parse_sort(raw: &str) -> Vec<SortOrder> {
    let mut parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let direction = match parts.last().and_then(|last| Direction::parse(last)) {
        Some(direction) => {
            parts.pop();
            direction
        }
        None => Direction::Asc,
    };

    parts
        .into_iter()
        .map(|property| SortOrder {
            property: property.to_string(),
            direction,
        })
        .collect()
}

/// One page of results plus the total number of matching rows
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, total: i64, pageable: &Pageable) -> Self {
        Self {
            content,
            total,
            page: pageable.page,
            size: pageable.size,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.size == 0 || self.total <= 0 {
            return 0;
        }
        let size = i64::from(self.size);
        u32::try_from((self.total + size - 1) / size).unwrap_or(u32::MAX)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
        }
    }
}
