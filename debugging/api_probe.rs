//! Call one movie night API operation and print the parsed response as pretty JSON.
//! Usage:
//!   cargo run --bin api_probe -- movie <id>
//!   cargo run --bin api_probe -- night <id>
//!   cargo run --bin api_probe -- ratings <night_id>
//!   cargo run --bin api_probe -- person <id>
//!   cargo run --bin api_probe -- watchlist <id>
//!   cargo run --bin api_probe -- movies <name> [page]
//!   cargo run --bin api_probe -- actor <name> [page]
//!   cargo run --bin api_probe -- persons <name> [page]
//!   cargo run --bin api_probe -- watchlists
//! Requires MOVIENIGHT_API_URL in the environment (.env supported).

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use movienight::api::{ApiClient, MovieNightApi};
use movienight::config::Config;
use movienight::models::{Id, Pagination};
use serde::Serialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Movie,
    Night,
    Ratings,
    Person,
    Watchlist,
    Movies,
    Actor,
    Persons,
    Watchlists,
}

impl FromStr for Command {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(Command::Movie),
            "night" => Ok(Command::Night),
            "ratings" => Ok(Command::Ratings),
            "person" => Ok(Command::Person),
            "watchlist" => Ok(Command::Watchlist),
            "movies" => Ok(Command::Movies),
            "actor" => Ok(Command::Actor),
            "persons" => Ok(Command::Persons),
            "watchlists" => Ok(Command::Watchlists),
            other => Err(anyhow!("unknown command '{}'", other)),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let mut args = env::args().skip(1);
    let command: Command = args
        .next()
        .context("Usage: api_probe <command> [arg] [page]")?
        .parse()?;
    let arg = args.next();
    let page = args
        .next()
        .map(|p| p.parse::<u32>())
        .transpose()
        .context("page must be a non-negative number")?
        .unwrap_or(0);

    let config = Config::from_env()?;
    let api = ApiClient::from_config(&config)?;

    let id = || -> Result<Id> {
        arg.as_deref()
            .context("this command needs an id")?
            .parse::<Id>()
            .map_err(|e| anyhow!("{}", e))
    };
    let name = arg.clone().unwrap_or_default();

    match command {
        Command::Movie => print_json(&api.get_movie(&id()?).await?),
        Command::Night => print_json(&api.get_night(&id()?).await?),
        Command::Ratings => print_json(&api.get_night_ratings(&id()?).await?),
        Command::Person => print_json(&api.get_person(&id()?).await?),
        Command::Watchlist => print_json(&api.get_watchlist(&id()?).await?),
        Command::Movies => print_json(&api.search_movies(&name, Pagination::movies(page)).await?),
        Command::Actor => print_json(
            &api.search_movies_by_actor(&name, Pagination::movies(page))
                .await?,
        ),
        Command::Persons => {
            print_json(&api.search_persons(&name, Pagination::persons(page)).await?)
        }
        Command::Watchlists => print_json(&api.list_watchlists().await?),
    }
}
