use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::models::{
    Id, Movie, MovieDetails, NewNight, NewRating, NightDetails, Pagination, Person,
    PersonDetails, Rating, Watchlist, WatchlistDetails,
};

mod client;

pub use client::ApiClient;

/// One method per remote operation. Every call is a single round trip.
#[async_trait]
pub trait MovieNightApi: Send + Sync {
    async fn get_movie(&self, id: &Id) -> Result<MovieDetails, ApiError>;
    async fn search_movies(&self, name: &str, page: Pagination) -> Result<Vec<Movie>, ApiError>;
    async fn search_movies_by_actor(
        &self,
        name: &str,
        page: Pagination,
    ) -> Result<Vec<Movie>, ApiError>;
    async fn create_movie(&self, name: &str) -> Result<(), ApiError>;

    async fn get_night(&self, id: &Id) -> Result<NightDetails, ApiError>;
    async fn get_night_ratings(&self, id: &Id) -> Result<Vec<Rating>, ApiError>;
    /// Returns the view id created for each participant.
    async fn create_night(&self, night: &NewNight) -> Result<HashMap<Id, Id>, ApiError>;

    async fn get_person(&self, id: &Id) -> Result<PersonDetails, ApiError>;
    async fn search_persons(&self, name: &str, page: Pagination)
        -> Result<Vec<Person>, ApiError>;

    async fn create_rating(&self, rating: &NewRating) -> Result<Id, ApiError>;

    async fn create_watchlist(&self, name: &str) -> Result<Id, ApiError>;
    async fn list_watchlists(&self) -> Result<Vec<Watchlist>, ApiError>;
    async fn get_watchlist(&self, id: &Id) -> Result<WatchlistDetails, ApiError>;
    /// Returns the index the service assigned to the new entry.
    async fn add_to_watchlist(&self, watchlist: &Id, movie: &Id) -> Result<u32, ApiError>;
    async fn remove_from_watchlist(&self, watchlist: &Id, idx: u32) -> Result<(), ApiError>;
}
