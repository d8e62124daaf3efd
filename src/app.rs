use crate::api::{ApiClient, MovieNightApi};
use crate::config::Config;
use crate::error::{ApiError, StoreError};
use crate::loaders::{self, LoadContext, ALL_WATCHLISTS_KEY};
use crate::models::{Id, NewNight, NewRating, User};
use crate::store::{ClientState, FileStorage};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB safety cap

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn MovieNightApi>,
    pub session: Arc<Mutex<ClientState>>,
    pub invalidations: Invalidations,
}

impl AppState {
    pub fn new(api: Arc<dyn MovieNightApi>, session: ClientState) -> Self {
        Self {
            api,
            session: Arc::new(Mutex::new(session)),
            invalidations: Invalidations::default(),
        }
    }
}

/// Version counter per dependency key. Write actions bump the keys they
/// affect; pages report the versions they were loaded at.
#[derive(Clone, Default)]
pub struct Invalidations {
    versions: Arc<Mutex<HashMap<String, u64>>>,
}

impl Invalidations {
    pub async fn invalidate(&self, key: &str) {
        let mut guard = self.versions.lock().await;
        *guard.entry(key.to_string()).or_insert(0) += 1;
        debug!("Invalidated {}", key);
    }

    pub async fn versions<'a>(
        &self,
        keys: impl Iterator<Item = &'a str>,
    ) -> BTreeMap<String, u64> {
        let guard = self.versions.lock().await;
        keys.map(|k| (k.to_string(), guard.get(k).copied().unwrap_or(0)))
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub data: T,
    pub depends: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse<T> {
    pub result: T,
    pub invalidated: Vec<String>,
}

/// Anything a handler can fail with, rendered for the user.
pub enum AppError {
    Api(ApiError),
    Store(StoreError),
    BadRequest(String),
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        AppError::Api(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Api(ApiError::Status { url, status, body }) => {
                warn!("Upstream {} answered {}", url, status);
                (status, body).into_response()
            }
            AppError::Api(e @ ApiError::InvalidRequest { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            AppError::Api(e) => {
                error!("Upstream call failed: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
            AppError::Store(e) => {
                error!("Client state failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let api: Arc<dyn MovieNightApi> = Arc::new(ApiClient::from_config(&config)?);
    info!("Using movie night API at {}", config.api_url);

    let session = match &config.state_path {
        Some(path) => {
            info!("Persisting client state to {}", path.display());
            ClientState::new(Box::new(FileStorage::new(path)))
        }
        None => {
            warn!("No client state path available, state will not persist");
            ClientState::without_storage()
        }
    };

    let app = build_router(AppState::new(api, session));

    info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/pages/movies", get(movie_search_page))
        .route("/pages/movies/:id", get(movie_page))
        .route("/pages/actors/:name", get(actor_page))
        .route("/pages/persons", get(persons_page))
        .route("/pages/persons/:id", get(person_page))
        .route("/pages/nights/:id", get(night_page))
        .route("/pages/watchlists", get(watchlists_page))
        .route("/pages/watchlists/:id", get(watchlist_page))
        .route("/actions/movies", post(create_movie))
        .route("/actions/nights", post(create_night))
        .route("/actions/ratings", post(create_rating))
        .route("/actions/watchlists", post(create_watchlist))
        .route("/actions/watchlists/:id/entries", post(add_watchlist_entry))
        .route(
            "/actions/watchlists/:id/entries/:idx",
            delete(remove_watchlist_entry),
        )
        .route(
            "/session/user",
            get(get_user).put(put_user).delete(delete_user),
        )
        .route("/session/selected", get(get_selected).put(put_selected))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

fn parse_id(raw: &str) -> Result<Id, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest("id must not be empty".to_string()))
}

async fn page<T>(state: &AppState, data: T, ctx: LoadContext) -> Json<PageResponse<T>> {
    let depends = state.invalidations.versions(ctx.keys()).await;
    Json(PageResponse { data, depends })
}

async fn action<T>(state: &AppState, result: T, keys: Vec<String>) -> Json<ActionResponse<T>> {
    for key in &keys {
        state.invalidations.invalidate(key).await;
    }
    Json(ActionResponse {
        result,
        invalidated: keys,
    })
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    name: String,
    #[serde(default)]
    page: u32,
}

async fn movie_search_page(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut ctx = LoadContext::new();
    let data = loaders::load_movie_search(state.api.as_ref(), &q.name, q.page, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn movie_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let mut ctx = LoadContext::new();
    let data = loaders::load_movie(state.api.as_ref(), &id, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn actor_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut ctx = LoadContext::new();
    let data = loaders::load_actor(state.api.as_ref(), &name, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn persons_page(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut ctx = LoadContext::new();
    let data = loaders::load_persons(state.api.as_ref(), &q.name, q.page, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn person_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let mut ctx = LoadContext::new();
    let data = loaders::load_person(state.api.as_ref(), &id, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn night_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let mut ctx = LoadContext::new();
    let data = loaders::load_night(state.api.as_ref(), &id, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn watchlists_page(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut ctx = LoadContext::new();
    let data = loaders::load_watchlists(state.api.as_ref(), &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

async fn watchlist_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let mut ctx = LoadContext::new();
    let data = loaders::load_watchlist(state.api.as_ref(), &id, &mut ctx).await?;
    Ok(page(&state, data, ctx).await)
}

#[derive(Debug, Deserialize)]
struct NameBody {
    name: String,
}

async fn create_movie(
    State(state): State<AppState>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, AppError> {
    state.api.create_movie(&body.name).await?;
    info!("Created movie '{}'", body.name);
    Ok((StatusCode::CREATED, action(&state, (), Vec::new()).await))
}

#[derive(Debug, Deserialize)]
struct NightBody {
    movie: Id,
    #[serde(default)]
    description: Option<String>,
    persons: Vec<Id>,
}

async fn create_night(
    State(state): State<AppState>,
    Json(body): Json<NightBody>,
) -> Result<impl IntoResponse, AppError> {
    let night = NewNight::now(body.movie, body.description, body.persons);
    let views = state.api.create_night(&night).await?;
    info!(
        "Created night for movie {} with {} participants",
        night.movie,
        views.len()
    );
    let mut keys: Vec<String> = night
        .persons
        .iter()
        .map(|p| format!("person:{}", p))
        .collect();
    keys.push(format!("movie:{}", night.movie));
    Ok((StatusCode::CREATED, action(&state, views, keys).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RatingBody {
    view_id: Id,
    value: f64,
    #[serde(default)]
    night: Option<Id>,
}

async fn create_rating(
    State(state): State<AppState>,
    Json(body): Json<RatingBody>,
) -> Result<impl IntoResponse, AppError> {
    let rating = NewRating::now(body.view_id, body.value);
    let id = state.api.create_rating(&rating).await?;
    info!("Created rating {} for view {}", id, rating.view_id);
    let keys = body
        .night
        .map(|n| vec![format!("night:{}", n)])
        .unwrap_or_default();
    Ok((StatusCode::CREATED, action(&state, id, keys).await))
}

async fn create_watchlist(
    State(state): State<AppState>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.api.create_watchlist(&body.name).await?;
    info!("Created watchlist '{}' ({})", body.name, id);
    let keys = vec![ALL_WATCHLISTS_KEY.to_string()];
    Ok((StatusCode::CREATED, action(&state, id, keys).await))
}

#[derive(Debug, Deserialize)]
struct EntryBody {
    movie: Id,
}

async fn add_watchlist_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EntryBody>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let idx = state.api.add_to_watchlist(&id, &body.movie).await?;
    info!("Added movie {} to watchlist {} at {}", body.movie, id, idx);
    let keys = vec![loaders::watchlist_key(&id)];
    Ok((StatusCode::CREATED, action(&state, idx, keys).await))
}

async fn remove_watchlist_entry(
    State(state): State<AppState>,
    Path((id, idx)): Path<(String, u32)>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    state.api.remove_from_watchlist(&id, idx).await?;
    info!("Removed entry {} from watchlist {}", idx, id);
    let keys = vec![loaders::watchlist_key(&id)];
    Ok(action(&state, (), keys).await)
}

/// Runs `f` on the blocking pool with the session locked; file-backed
/// storage does synchronous disk I/O.
async fn with_session<T, F>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&mut ClientState) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let mut session = state.session.clone().lock_owned().await;
    let outcome = tokio::task::spawn_blocking(move || f(&mut session))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
    Ok(outcome?)
}

async fn get_user(State(state): State<AppState>) -> Result<Json<Option<User>>, AppError> {
    let user = with_session(&state, |session| Ok(session.user().cloned())).await?;
    Ok(Json(user))
}

async fn put_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<Json<User>, AppError> {
    let stored = user.clone();
    with_session(&state, move |session| session.set_user(stored)).await?;
    info!("Signed in as '{}'", user.name);
    Ok(Json(user))
}

async fn delete_user(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    with_session(&state, |session| session.reset_user()).await?;
    info!("Signed out");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectedBody {
    selected_id: Option<String>,
}

async fn get_selected(State(state): State<AppState>) -> Result<Json<SelectedBody>, AppError> {
    let selected_id =
        with_session(&state, |session| Ok(session.selected_id().map(str::to_string))).await?;
    Ok(Json(SelectedBody { selected_id }))
}

async fn put_selected(
    State(state): State<AppState>,
    Json(body): Json<SelectedBody>,
) -> Result<Json<SelectedBody>, AppError> {
    let id = body.selected_id.unwrap_or_default();
    let stored = id.clone();
    with_session(&state, move |session| session.set_selected_id(stored)).await?;
    Ok(Json(SelectedBody {
        selected_id: Some(id),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
