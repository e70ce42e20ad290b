#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use crate::cors::Cors;
use crate::db::Database;
use crate::request_log::RequestLogger;
use crate::settings::Settings;
use crate::storage::StorageBackend;
use anyhow::Result;
use rocket::config::Ident;
use rocket::data::{ByteUnit, Limits};
use rocket::shield::Shield;
use rocket::{Build, Rocket};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub mod auth;
pub mod cors;
pub mod db;
pub mod error;
pub mod filesystem;
pub mod permissions;
pub mod request_log;
pub mod routes;
pub mod settings;
pub mod storage;

/// Server config derived from the app settings.
pub fn rocket_config(settings: &Settings) -> Result<rocket::Config> {
    let mut config = rocket::Config::default();
    let ip: SocketAddr = match &settings.listen {
        Some(i) => i.parse()?,
        None => SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 8000),
    };
    config.address = ip.ip();
    config.port = ip.port();

    let upload_limit = ByteUnit::from(settings.max_upload_bytes);
    config.limits = Limits::default()
        .limit("file", upload_limit)
        .limit("data-form", upload_limit)
        .limit("form", upload_limit);
    config.ident = Ident::try_new("yummly").map_err(anyhow::Error::msg)?;
    Ok(config)
}

/// Builds the HTTP application with every route, fairing and catcher mounted.
pub fn build_rocket(
    settings: Settings,
    db: Database,
    storage: Arc<dyn StorageBackend>,
) -> Result<Rocket<Build>> {
    let config = rocket_config(&settings)?;
    let cors = Cors::new(&settings.cors());

    Ok(Rocket::custom(config)
        .manage(settings)
        .manage(db)
        .manage(storage)
        .attach(cors)
        .attach(RequestLogger)
        .attach(Shield::default())
        .mount("/", routes::media_routes())
        .mount("/", cors::preflight_routes())
        .mount("/api/v1", routes::user_routes())
        .mount("/api/posts", routes::post_routes())
        .mount("/api/posts", routes::comment_routes())
        .mount("/api/posts", routes::like_routes())
        .mount("/api/groups", routes::group_routes())
        .mount("/api/groups", routes::message_routes())
        .mount("/api/groups", routes::discussion_routes())
        .mount("/api/recipes", routes::recipe_routes())
        .register("/", routes::api_catchers()))
}
