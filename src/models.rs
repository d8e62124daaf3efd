use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MOVIES_PER_PAGE: u32 = 50;
pub const PERSONS_PER_PAGE: u32 = 15;

/// Opaque identifier assigned by the movie night service.
///
/// Empty and whitespace-only ids are rejected wherever an `Id` is parsed,
/// including inside response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("id must not be empty")]
pub struct EmptyId;

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Id {
    type Error = EmptyId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(EmptyId);
        }
        Ok(Self(value))
    }
}

impl FromStr for Id {
    type Err = EmptyId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetails {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub trailer_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub year_of_publication: Option<i32>,
    /// Runtime in minutes.
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub actors: Option<Vec<String>>,
    #[serde(default)]
    pub is_memento_import: bool,
    pub nights: Vec<Night>,
    #[serde(default)]
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonWithRatings {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub avg_rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDetails {
    pub id: Id,
    pub name: String,
    // The service emits this one field in snake_case.
    #[serde(alias = "latestNights")]
    pub latest_nights: Vec<Night>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Night {
    pub id: Id,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub movie: Option<Movie>,
    #[serde(default)]
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightDetails {
    pub id: Id,
    #[serde(default)]
    pub description: Option<String>,
    pub time: DateTime<Utc>,
    pub movie: Movie,
    pub persons: Vec<PersonWithRatings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub person: Person,
    pub value: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistDetails {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub entries: Vec<WatchlistEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub movie: Movie,
    pub idx: u32,
}

/// The signed-in user remembered between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovie {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNight {
    pub time: DateTime<Utc>,
    pub description: Option<String>,
    pub persons: Vec<Id>,
    pub movie: Id,
}

impl NewNight {
    pub fn now(movie: Id, description: Option<String>, persons: Vec<Id>) -> Self {
        Self {
            time: Utc::now(),
            description,
            persons,
            movie,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRating {
    pub value: f64,
    pub view_id: Id,
    pub time: DateTime<Utc>,
}

impl NewRating {
    pub fn now(view_id: Id, value: f64) -> Self {
        Self {
            value,
            view_id,
            time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWatchlist {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWatchlistEntry {
    pub movie: Id,
}

/// Zero-based page selection passed through to the service untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn movies(page: u32) -> Self {
        Self {
            page,
            per_page: MOVIES_PER_PAGE,
        }
    }

    pub fn persons(page: u32) -> Self {
        Self {
            page,
            per_page: PERSONS_PER_PAGE,
        }
    }
}
