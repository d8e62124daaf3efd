//! Page data loaders.
//!
//! Each loader turns route parameters into the view model a page renders.
//! Failures are never caught here: they propagate as `ApiError` and the
//! caller decides how to show them.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::api::MovieNightApi;
use crate::error::ApiError;
use crate::models::{
    Id, Movie, MovieDetails, NightDetails, Pagination, Person, PersonDetails, Rating, Watchlist,
    WatchlistDetails,
};

pub const ALL_WATCHLISTS_KEY: &str = "watchlist:all";

pub fn watchlist_key(id: &Id) -> String {
    format!("watchlist:{}", id)
}

/// Collects the dependency keys a loader declares, so the host can reload
/// the page when one of them is invalidated.
#[derive(Debug, Default)]
pub struct LoadContext {
    depends: BTreeSet<String>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depends(&mut self, key: impl Into<String>) {
        self.depends.insert(key.into());
    }

    /// Declared keys, sorted and without duplicates.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.depends.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoviePage {
    pub movie: MovieDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieSearchPage {
    pub query: String,
    pub page: u32,
    pub movies: Vec<Movie>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorPage {
    pub actor: String,
    pub movies: Vec<Movie>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonsPage {
    pub persons: Vec<Person>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonPage {
    pub person: PersonDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightPage {
    pub night: NightDetails,
    pub ratings: Vec<Rating>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistsPage {
    pub watchlists: Vec<Watchlist>,
}

pub async fn load_movie(
    api: &dyn MovieNightApi,
    id: &Id,
    ctx: &mut LoadContext,
) -> Result<MoviePage, ApiError> {
    ctx.depends(format!("movie:{}", id));
    let movie = api.get_movie(id).await?;
    Ok(MoviePage { movie })
}

pub async fn load_movie_search(
    api: &dyn MovieNightApi,
    name: &str,
    page: u32,
    _ctx: &mut LoadContext,
) -> Result<MovieSearchPage, ApiError> {
    let movies = api.search_movies(name, Pagination::movies(page)).await?;
    Ok(MovieSearchPage {
        query: name.to_string(),
        page,
        movies,
    })
}

pub async fn load_actor(
    api: &dyn MovieNightApi,
    name: &str,
    _ctx: &mut LoadContext,
) -> Result<ActorPage, ApiError> {
    let movies = api
        .search_movies_by_actor(name, Pagination::movies(0))
        .await?;
    Ok(ActorPage {
        actor: name.to_string(),
        movies,
    })
}

pub async fn load_persons(
    api: &dyn MovieNightApi,
    name: &str,
    page: u32,
    _ctx: &mut LoadContext,
) -> Result<PersonsPage, ApiError> {
    let persons = api.search_persons(name, Pagination::persons(page)).await?;
    Ok(PersonsPage { persons })
}

pub async fn load_person(
    api: &dyn MovieNightApi,
    id: &Id,
    ctx: &mut LoadContext,
) -> Result<PersonPage, ApiError> {
    ctx.depends(format!("person:{}", id));
    let person = api.get_person(id).await?;
    Ok(PersonPage { person })
}

pub async fn load_night(
    api: &dyn MovieNightApi,
    id: &Id,
    ctx: &mut LoadContext,
) -> Result<NightPage, ApiError> {
    ctx.depends(format!("night:{}", id));
    let (night, ratings) = tokio::try_join!(api.get_night(id), api.get_night_ratings(id))?;
    Ok(NightPage { night, ratings })
}

pub async fn load_watchlists(
    api: &dyn MovieNightApi,
    ctx: &mut LoadContext,
) -> Result<WatchlistsPage, ApiError> {
    ctx.depends(ALL_WATCHLISTS_KEY);
    let watchlists = api.list_watchlists().await?;
    Ok(WatchlistsPage { watchlists })
}

pub async fn load_watchlist(
    api: &dyn MovieNightApi,
    id: &Id,
    ctx: &mut LoadContext,
) -> Result<WatchlistDetails, ApiError> {
    ctx.depends(watchlist_key(id));
    api.get_watchlist(id).await
}
