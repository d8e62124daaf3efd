use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;
use urlencoding::encode;

use super::MovieNightApi;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{
    Id, Movie, MovieDetails, NewMovie, NewNight, NewRating, NewWatchlist, NewWatchlistEntry,
    NightDetails, Pagination, Person, PersonDetails, Rating, Watchlist, WatchlistDetails,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let user_agent = format!("movienight/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build movie night HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(&config.api_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<String, ApiError> {
        let res = request.send().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = res.status();
        let text = res.text().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
                body: text,
            });
        }
        Ok(text)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("GET /{}", path);
        let text = self.send(self.client.get(&url), &url).await?;
        parse_json(&url, &text)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(String, String), ApiError> {
        let url = self.url(path);
        debug!("POST /{}", path);
        let text = self.send(self.client.post(&url).json(body), &url).await?;
        Ok((url, text))
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!("DELETE /{}", path);
        self.send(self.client.delete(&url), &url).await?;
        Ok(())
    }
}

#[async_trait]
impl MovieNightApi for ApiClient {
    async fn get_movie(&self, id: &Id) -> Result<MovieDetails, ApiError> {
        self.get_json(&format!("movie/{}", encode(id.as_str())))
            .await
    }

    async fn search_movies(&self, name: &str, page: Pagination) -> Result<Vec<Movie>, ApiError> {
        self.get_json(&search_path("movie", name, page)).await
    }

    async fn search_movies_by_actor(
        &self,
        name: &str,
        page: Pagination,
    ) -> Result<Vec<Movie>, ApiError> {
        self.get_json(&search_path("movie/byActor", name, page))
            .await
    }

    async fn create_movie(&self, name: &str) -> Result<(), ApiError> {
        let body = NewMovie {
            name: name.to_string(),
        };
        self.post_json("movie", &body).await?;
        Ok(())
    }

    async fn get_night(&self, id: &Id) -> Result<NightDetails, ApiError> {
        self.get_json(&format!("night/{}", encode(id.as_str())))
            .await
    }

    async fn get_night_ratings(&self, id: &Id) -> Result<Vec<Rating>, ApiError> {
        self.get_json(&format!("night/{}/ratings", encode(id.as_str())))
            .await
    }

    async fn create_night(&self, night: &NewNight) -> Result<HashMap<Id, Id>, ApiError> {
        check_participants(&night.persons)?;
        let (url, text) = self.post_json("night", night).await?;
        let views: HashMap<Id, Id> = parse_json(&url, &text)?;
        check_views(&url, &night.persons, &views)?;
        Ok(views)
    }

    async fn get_person(&self, id: &Id) -> Result<PersonDetails, ApiError> {
        self.get_json(&format!("person/{}", encode(id.as_str())))
            .await
    }

    async fn search_persons(
        &self,
        name: &str,
        page: Pagination,
    ) -> Result<Vec<Person>, ApiError> {
        self.get_json(&search_path("person", name, page)).await
    }

    async fn create_rating(&self, rating: &NewRating) -> Result<Id, ApiError> {
        let (url, text) = self.post_json("rating", rating).await?;
        parse_id(&url, &text)
    }

    async fn create_watchlist(&self, name: &str) -> Result<Id, ApiError> {
        let body = NewWatchlist {
            name: name.to_string(),
        };
        let (url, text) = self.post_json("watchlist", &body).await?;
        parse_id(&url, &text)
    }

    async fn list_watchlists(&self) -> Result<Vec<Watchlist>, ApiError> {
        self.get_json("watchlist").await
    }

    async fn get_watchlist(&self, id: &Id) -> Result<WatchlistDetails, ApiError> {
        self.get_json(&format!("watchlist/{}/", encode(id.as_str())))
            .await
    }

    async fn add_to_watchlist(&self, watchlist: &Id, movie: &Id) -> Result<u32, ApiError> {
        let body = NewWatchlistEntry {
            movie: movie.clone(),
        };
        let (url, text) = self
            .post_json(&format!("watchlist/{}/", encode(watchlist.as_str())), &body)
            .await?;
        let raw = scalar_text(&text);
        raw.parse::<u32>().map_err(|_| ApiError::Decode {
            url,
            reason: format!("expected an entry index, got '{}'", raw),
        })
    }

    async fn remove_from_watchlist(&self, watchlist: &Id, idx: u32) -> Result<(), ApiError> {
        self.delete(&format!("watchlist/{}/{}", encode(watchlist.as_str()), idx))
            .await
    }
}

fn search_path(resource: &str, name: &str, page: Pagination) -> String {
    format!(
        "{resource}?name={}&page={}&per_page={}",
        encode(name),
        page.page,
        page.per_page
    )
}

fn parse_json<T: DeserializeOwned>(url: &str, text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Creation endpoints answer with a bare scalar, either JSON-encoded or as plain text.
fn scalar_text(text: &str) -> String {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => s,
        Ok(Value::Number(n)) => n.to_string(),
        _ => trimmed.to_string(),
    }
}

fn parse_id(url: &str, text: &str) -> Result<Id, ApiError> {
    scalar_text(text).parse().map_err(|_| ApiError::Decode {
        url: url.to_string(),
        reason: "expected a non-empty id".to_string(),
    })
}

/// Views are keyed by person, so a repeated participant could never get a view of its own.
fn check_participants(persons: &[Id]) -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    match persons.iter().find(|p| !seen.insert(*p)) {
        Some(dup) => Err(ApiError::InvalidRequest {
            reason: format!("person {} is listed more than once", dup),
        }),
        None => Ok(()),
    }
}

fn check_views(url: &str, persons: &[Id], views: &HashMap<Id, Id>) -> Result<(), ApiError> {
    if views.len() != persons.len() || !persons.iter().all(|p| views.contains_key(p)) {
        return Err(ApiError::Decode {
            url: url.to_string(),
            reason: format!(
                "expected one view per participant ({}), got {}",
                persons.len(),
                views.len()
            ),
        });
    }
    let distinct: HashSet<&Id> = views.values().collect();
    if distinct.len() != views.len() {
        return Err(ApiError::Decode {
            url: url.to_string(),
            reason: "view ids are not distinct".to_string(),
        });
    }
    Ok(())
}
