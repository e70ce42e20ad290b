use anyhow::Error;
use clap::Parser;
use config::Config;
use log::{error, info};
use std::sync::Arc;
use yummly::db::Database;
use yummly::filesystem::FileStore;
use yummly::settings::{Settings, DEFAULT_MAX_CONNECTIONS};
use yummly::storage::StorageBackend;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long)]
    pub config: Option<String>,
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let args: Args = Args::parse();

    let builder = Config::builder()
        .add_source(config::File::with_name(if let Some(ref c) = args.config {
            c.as_str()
        } else {
            "config.yaml"
        }))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = builder.try_deserialize()?;

    let db = Database::new(
        &settings.database,
        settings.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
    )
    .await?;

    info!("Running DB migration");
    db.migrate().await?;

    let store = FileStore::new(&settings.filesystem)?;
    info!("Storing media in {}", store.storage_dir.display());
    let storage: Arc<dyn StorageBackend> = Arc::new(store);

    let rocket = yummly::build_rocket(settings, db, storage)?;
    if let Err(e) = rocket.launch().await {
        error!("Rocket error {}", e);
        Err(Error::from(e))
    } else {
        Ok(())
    }
}
