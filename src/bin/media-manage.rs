use anyhow::{Context, Error, Result};
use clap::{Parser, Subcommand};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use yummly::db::Database;
use yummly::filesystem::FileStore;
use yummly::settings::{Settings, DEFAULT_MAX_CONNECTIONS};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Verify file hash matches filename / path and optionally delete mismatches.
    VerifyIntegrity {
        #[arg(long, default_missing_value = "true", num_args = 0..=1)]
        delete: Option<bool>,
    },

    /// Delete stored media that no post references.
    PruneOrphans {
        /// Print files that would be deleted without removing them.
        #[arg(long, default_missing_value = "true", num_args = 0..=1)]
        dry_run: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
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
    let fs = FileStore::new(&settings.filesystem)?;

    match args.command {
        Commands::VerifyIntegrity { delete } => {
            info!("Checking files in: {}", fs.storage_dir.display());
            for_each_media_file(&fs.storage_dir, 4, |entry, p| {
                Box::pin(async move {
                    let Some(id) = id_from_path(&entry) else {
                        p.set_message(format!("Skipping invalid file: {}", entry.display()));
                        return Ok(());
                    };

                    let hash = FileStore::hash_file(&entry).await?;
                    if hash != id {
                        if delete.unwrap_or(false) {
                            p.set_message(format!("Deleting corrupt file: {}", entry.display()));
                            tokio::fs::remove_file(&entry).await?;
                        } else {
                            p.set_message(format!("File is corrupted: {}", entry.display()));
                        }
                    }
                    Ok(())
                })
            })
            .await?;
        }
        Commands::PruneOrphans { dry_run } => {
            let db = Database::new(
                &settings.database,
                settings.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            )
            .await?;
            db.migrate().await?;

            let referenced: Arc<HashSet<String>> = Arc::new(
                db.list_media_ids()
                    .await
                    .context("list referenced media")?
                    .into_iter()
                    .collect(),
            );
            info!("{} media files referenced by posts", referenced.len());

            let dry_run = dry_run.unwrap_or(false);
            for_each_media_file(&fs.storage_dir, 4, |entry, p| {
                let referenced = referenced.clone();
                Box::pin(async move {
                    let Some(id) = id_from_path(&entry) else {
                        p.set_message(format!("Skipping invalid file: {}", entry.display()));
                        return Ok(());
                    };
                    if referenced.contains(&hex::encode(&id)) {
                        return Ok(());
                    }
                    if dry_run {
                        p.set_message(format!("[DRY-RUN] Deleting orphan: {}", entry.display()));
                    } else {
                        p.set_message(format!("Deleting orphan: {}", entry.display()));
                        tokio::fs::remove_file(&entry)
                            .await
                            .with_context(|| format!("remove {}", entry.display()))?;
                    }
                    Ok(())
                })
            })
            .await?;
        }
    }
    Ok(())
}

fn id_from_path(path: &Path) -> Option<Vec<u8>> {
    let id = hex::decode(path.file_name()?.to_str()?).ok()?;
    (id.len() == 32).then_some(id)
}

/// Runs `op` on every stored file, at most `workers` at a time, and returns
/// how many files failed.
async fn for_each_media_file<F>(root: &Path, workers: usize, mut op: F) -> Result<usize>
where
    F: FnMut(PathBuf, ProgressBar) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>,
{
    info!("Scanning media under {}", root.display());
    let files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();

    let progress = ProgressBar::new(files.len() as u64)
        .with_style(ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")?);
    let slots = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    for path in files {
        let permit = slots.clone().acquire_owned().await?;
        let work = op(path.clone(), progress.clone());
        let bar = progress.clone();
        tasks.spawn(async move {
            let res = work.await;
            bar.inc(1);
            drop(permit);
            if let Err(e) = &res {
                error!("{}: {}", path.display(), e);
            }
            res.is_err()
        });
    }

    let mut failed = 0;
    while let Some(res) = tasks.join_next().await {
        if res? {
            failed += 1;
        }
    }
    progress.finish_with_message(format!("Done, {} failed", failed));
    Ok(failed)
}
