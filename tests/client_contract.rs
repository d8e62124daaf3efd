use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use movienight::api::{ApiClient, MovieNightApi};
use movienight::error::ApiError;
use movienight::models::{Id, NewNight, NewRating, Pagination};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeService {
    requests: Vec<(Method, String, Option<Value>)>,
    watchlists: HashMap<String, Vec<(u32, String)>>,
    next_idx: u32,
    next_view: u32,
}

type Shared = Arc<Mutex<FakeService>>;

fn record(state: &Shared, method: Method, uri: &Uri, body: Option<Value>) {
    state
        .lock()
        .unwrap()
        .requests
        .push((method, uri.to_string(), body));
}

fn catalogue() -> Vec<Value> {
    (0..60)
        .map(|i| json!({ "id": format!("m{i}"), "name": format!("Movie {i}") }))
        .collect()
}

#[derive(Deserialize)]
struct SearchArgs {
    name: Option<String>,
    page: u32,
    per_page: u32,
}

async fn search_movies(
    State(state): State<Shared>,
    uri: Uri,
    Query(args): Query<SearchArgs>,
) -> Json<Vec<Value>> {
    record(&state, Method::GET, &uri, None);
    let needle = args.name.unwrap_or_default().to_uppercase();
    let hits = catalogue()
        .into_iter()
        .filter(|m| m["name"].as_str().unwrap().to_uppercase().contains(&needle))
        .skip((args.page * args.per_page) as usize)
        .take(args.per_page as usize)
        .collect();
    Json(hits)
}

async fn movies_by_actor(State(state): State<Shared>, uri: Uri) -> Json<Vec<Value>> {
    record(&state, Method::GET, &uri, None);
    Json(vec![json!({ "id": "m1", "name": "Heat" })])
}

async fn create_movie(
    State(state): State<Shared>,
    uri: Uri,
    Json(body): Json<Value>,
) -> StatusCode {
    record(&state, Method::POST, &uri, Some(body));
    StatusCode::CREATED
}

async fn movie_details(Path(id): Path<String>) -> impl IntoResponse {
    if id != "m1" {
        return (
            StatusCode::BAD_REQUEST,
            "A movie with that id does not exist".to_string(),
        )
            .into_response();
    }
    Json(json!({
        "id": "m1",
        "name": "Heat",
        "tagline": "A Los Angeles crime saga",
        "coverUrl": null,
        "description": null,
        "yearOfPublication": 1995,
        "nights": [
            { "id": "n1", "time": "2024-03-01T20:00:00Z", "avgRating": 8.0 }
        ],
        "avgRating": 8.0
    }))
    .into_response()
}

async fn night_details(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "id": id,
        "description": "Friday",
        "time": "2024-03-01T20:00:00Z",
        "movie": { "id": "m1", "name": "Heat" },
        "persons": [
            { "id": "p1", "name": "Ana", "avgRating": 8.0, "ratingCount": 1 }
        ]
    }))
}

async fn night_ratings(Path(_id): Path<String>) -> Json<Value> {
    Json(json!([
        { "person": { "id": "p1", "name": "Ana" }, "value": 8.0, "time": "2024-03-01T23:00:00Z" }
    ]))
}

async fn create_night(
    State(state): State<Shared>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Json<HashMap<String, String>> {
    record(&state, Method::POST, &uri, Some(body.clone()));
    let mut guard = state.lock().unwrap();
    let shared_view = body["movie"] == "m-broken";
    let mut views = HashMap::new();
    for person in body["persons"].as_array().unwrap() {
        if !shared_view {
            guard.next_view += 1;
        }
        views.insert(
            person.as_str().unwrap().to_string(),
            format!("view-{}", guard.next_view),
        );
    }
    Json(views)
}

async fn person_details(Path(id): Path<String>) -> Json<Value> {
    if id == "broken" {
        return Json(json!({ "id": "broken", "name": 42, "latest_nights": [] }));
    }
    Json(json!({
        "id": id,
        "name": "Ana",
        "latest_nights": [
            { "id": "n1", "time": "2024-03-01T20:00:00Z", "movie": { "id": "m1", "name": "Heat" } }
        ]
    }))
}

async fn search_persons(State(state): State<Shared>, uri: Uri) -> Json<Vec<Value>> {
    record(&state, Method::GET, &uri, None);
    Json(vec![json!({ "id": "p1", "name": "Ana" })])
}

async fn create_rating(
    State(state): State<Shared>,
    uri: Uri,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    record(&state, Method::POST, &uri, Some(body));
    (
        StatusCode::CREATED,
        "5b1d4c4e-6a53-4c52-9e3e-2f6f1f0d1a11".to_string(),
    )
}

async fn create_watchlist(
    State(state): State<Shared>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Json<String> {
    record(&state, Method::POST, &uri, Some(body));
    state
        .lock()
        .unwrap()
        .watchlists
        .insert("w1".to_string(), Vec::new());
    Json("w1".to_string())
}

async fn list_watchlists(State(state): State<Shared>) -> Json<Vec<Value>> {
    let guard = state.lock().unwrap();
    let mut ids: Vec<&String> = guard.watchlists.keys().collect();
    ids.sort();
    Json(
        ids.into_iter()
            .map(|id| json!({ "id": id, "name": format!("List {id}") }))
            .collect(),
    )
}

async fn watchlist_details(
    State(state): State<Shared>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let guard = state.lock().unwrap();
    let Some(entries) = guard.watchlists.get(&id) else {
        return (StatusCode::NOT_FOUND, "No watchlist with that id found").into_response();
    };
    let entries: Vec<Value> = entries
        .iter()
        .map(|(idx, movie)| json!({ "idx": idx, "movie": { "id": movie, "name": "Heat" } }))
        .collect();
    Json(json!({ "id": id, "name": format!("List {id}"), "entries": entries })).into_response()
}

async fn add_entry(
    State(state): State<Shared>,
    uri: Uri,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record(&state, Method::POST, &uri, Some(body.clone()));
    let mut guard = state.lock().unwrap();
    let idx = guard.next_idx;
    guard.next_idx += 1;
    let Some(entries) = guard.watchlists.get_mut(&id) else {
        return (StatusCode::NOT_FOUND, "No watchlist with that id found".to_string());
    };
    entries.push((idx, body["movie"].as_str().unwrap().to_string()));
    (StatusCode::CREATED, idx.to_string())
}

async fn remove_entry(
    State(state): State<Shared>,
    uri: Uri,
    Path((id, idx)): Path<(String, u32)>,
) -> StatusCode {
    record(&state, Method::DELETE, &uri, None);
    let mut guard = state.lock().unwrap();
    match guard.watchlists.get_mut(&id) {
        Some(entries) => {
            entries.retain(|(i, _)| *i != idx);
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn spawn_service() -> (ApiClient, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeService::default()));
    let app = Router::new()
        .route("/movie", get(search_movies).post(create_movie))
        .route("/movie/byActor", get(movies_by_actor))
        .route("/movie/:id", get(movie_details))
        .route("/night", post(create_night))
        .route("/night/:id", get(night_details))
        .route("/night/:id/ratings", get(night_ratings))
        .route("/person", get(search_persons))
        .route("/person/:id", get(person_details))
        .route("/rating", post(create_rating))
        .route("/watchlist", get(list_watchlists).post(create_watchlist))
        .route("/watchlist/:id/", get(watchlist_details).post(add_entry))
        .route("/watchlist/:id/:idx", delete(remove_entry))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake service");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake service");
    });

    let client = ApiClient::new(&format!("http://{addr}/"), Duration::from_secs(5))
        .expect("client");
    (client, state)
}

fn id(s: &str) -> Id {
    s.parse().expect("valid id")
}

fn requests(state: &Shared) -> Vec<(Method, String, Option<Value>)> {
    state.lock().unwrap().requests.clone()
}

#[tokio::test]
async fn refetching_a_movie_yields_identical_data() {
    let (api, _state) = spawn_service().await;
    let first = api.get_movie(&id("m1")).await.unwrap();
    let second = api.get_movie(&id("m1")).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.tagline.as_deref(), Some("A Los Angeles crime saga"));
    assert_eq!(first.avg_rating, Some(8.0));
}

#[tokio::test]
async fn empty_search_requests_first_page_with_page_size() {
    let (api, state) = spawn_service().await;
    let movies = api.search_movies("", Pagination::movies(0)).await.unwrap();
    assert_eq!(movies.len(), 50);
    assert_eq!(movies[0].id, id("m0"));

    let persons = api.search_persons("", Pagination::persons(0)).await.unwrap();
    assert_eq!(persons.len(), 1);

    let second = api.search_movies("", Pagination::movies(1)).await.unwrap();
    assert_eq!(second.len(), 10);

    let uris: Vec<String> = requests(&state).into_iter().map(|(_, u, _)| u).collect();
    assert_eq!(
        uris,
        vec![
            "/movie?name=&page=0&per_page=50".to_string(),
            "/person?name=&page=0&per_page=15".to_string(),
            "/movie?name=&page=1&per_page=50".to_string(),
        ]
    );
}

#[tokio::test]
async fn actor_search_encodes_the_name() {
    let (api, state) = spawn_service().await;
    let movies = api
        .search_movies_by_actor("Al Pacino", Pagination::movies(0))
        .await
        .unwrap();
    assert_eq!(movies[0].name, "Heat");
    let (_, uri, _) = requests(&state).remove(0);
    assert_eq!(uri, "/movie/byActor?name=Al%20Pacino&page=0&per_page=50");
}

#[tokio::test]
async fn create_movie_posts_name() {
    let (api, state) = spawn_service().await;
    api.create_movie("Thief").await.unwrap();
    let (method, _, body) = requests(&state).remove(0);
    assert_eq!(method, Method::POST);
    assert_eq!(body, Some(json!({ "name": "Thief" })));
}

#[tokio::test]
async fn night_and_ratings_are_parsed() {
    let (api, _state) = spawn_service().await;
    let night = api.get_night(&id("n1")).await.unwrap();
    assert_eq!(night.movie.name, "Heat");
    assert_eq!(night.persons[0].rating_count, Some(1));
    let ratings = api.get_night_ratings(&id("n1")).await.unwrap();
    assert_eq!(ratings[0].person.name, "Ana");
    assert_eq!(ratings[0].value, 8.0);
}

#[tokio::test]
async fn creating_a_night_returns_one_view_per_participant() {
    let (api, state) = spawn_service().await;
    let persons = vec![id("p1"), id("p2"), id("p3")];
    let night = NewNight::now(id("m1"), Some("Friday".to_string()), persons.clone());
    let views = api.create_night(&night).await.unwrap();

    assert_eq!(views.len(), persons.len());
    for p in &persons {
        assert!(views.contains_key(p));
    }
    let mut view_ids: Vec<&Id> = views.values().collect();
    view_ids.sort();
    view_ids.dedup();
    assert_eq!(view_ids.len(), persons.len());

    let (_, _, body) = requests(&state).remove(0);
    let body = body.unwrap();
    assert_eq!(body["movie"], "m1");
    assert_eq!(body["description"], "Friday");
    assert_eq!(body["persons"], json!(["p1", "p2", "p3"]));
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn shared_view_ids_are_rejected() {
    let (api, _state) = spawn_service().await;
    let night = NewNight::now(id("m-broken"), None, vec![id("p1"), id("p2")]);
    let err = api.create_night(&night).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}

#[tokio::test]
async fn repeated_participant_is_refused_before_sending() {
    let (api, state) = spawn_service().await;
    let night = NewNight::now(id("m1"), None, vec![id("p1"), id("p2"), id("p1")]);
    let err = api.create_night(&night).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest { .. }));
    assert!(requests(&state).is_empty());
}

#[tokio::test]
async fn rating_id_is_read_from_plain_text() {
    let (api, state) = spawn_service().await;
    let rating = NewRating::now(id("view-1"), 7.5);
    let rating_id = api.create_rating(&rating).await.unwrap();
    assert_eq!(rating_id.as_str(), "5b1d4c4e-6a53-4c52-9e3e-2f6f1f0d1a11");

    let (_, _, body) = requests(&state).remove(0);
    let body = body.unwrap();
    assert_eq!(body["viewId"], "view-1");
    assert_eq!(body["value"], 7.5);
}

#[tokio::test]
async fn removed_watchlist_entry_is_gone() {
    let (api, state) = spawn_service().await;
    let watchlist = api.create_watchlist("Friday picks").await.unwrap();
    assert_eq!(watchlist, id("w1"));

    let first = api.add_to_watchlist(&watchlist, &id("m1")).await.unwrap();
    let second = api.add_to_watchlist(&watchlist, &id("m2")).await.unwrap();
    assert_ne!(first, second);

    api.remove_from_watchlist(&watchlist, first).await.unwrap();
    let details = api.get_watchlist(&watchlist).await.unwrap();
    assert!(details.entries.iter().all(|e| e.idx != first));
    assert!(details.entries.iter().any(|e| e.idx == second));

    let lists = api.list_watchlists().await.unwrap();
    assert_eq!(lists.len(), 1);

    let uris: Vec<(Method, String)> = requests(&state)
        .into_iter()
        .map(|(m, u, _)| (m, u))
        .collect();
    assert!(uris.contains(&(Method::POST, "/watchlist/w1/".to_string())));
    assert!(uris.contains(&(Method::DELETE, format!("/watchlist/w1/{first}"))));
}

#[tokio::test]
async fn error_status_carries_raw_server_text() {
    let (api, _state) = spawn_service().await;
    let err = api.get_movie(&id("m404")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.to_string(), "A movie with that id does not exist");

    let err = api.get_watchlist(&id("missing")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.to_string(), "No watchlist with that id found");
}

#[tokio::test]
async fn malformed_bodies_fail_to_decode() {
    let (api, _state) = spawn_service().await;
    let person = api.get_person(&id("p1")).await.unwrap();
    assert_eq!(person.latest_nights.len(), 1);

    let err = api.get_person(&id("broken")).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ApiClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = api.list_watchlists().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
}
