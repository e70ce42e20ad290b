use crate::auth::UserId;
use crate::db::{Database, Post, PostWithAuthor};
use crate::error::{ApiResult, ServiceError, ServiceResult};
use crate::filesystem::TempFileCleanup;
use crate::routes::{check_length, require_user, required, MAX_NAME_LENGTH};
use crate::settings::Settings;
use crate::storage::{MediaKind, MediaName, StorageBackend};
use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::{ContentType, Status};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::serde::Serialize;
use rocket::{routes, FromForm, Route, State};
use std::sync::Arc;

#[derive(Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct PostView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_path: Option<String>,
    pub video_path: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub user_id: i64,
    pub user_name: String,
    pub created: DateTime<Utc>,
}

impl PostView {
    pub fn new(post: Post, user_name: String, settings: &Settings) -> Self {
        Self {
            image_url: post.image.as_deref().map(|n| settings.media_url(n)),
            video_url: post.video.as_deref().map(|n| settings.media_url(n)),
            id: post.id,
            title: post.title,
            description: post.description,
            image_path: post.image,
            video_path: post.video,
            user_id: post.user_id,
            user_name,
            created: post.created,
        }
    }

    fn from_row(row: PostWithAuthor, settings: &Settings) -> Self {
        Self::new(row.post, row.user_name, settings)
    }
}

#[derive(FromForm)]
pub struct NewPost<'r> {
    pub title: String,
    pub description: String,
    #[field(name = "userId")]
    pub user_id: i64,
    pub image: Option<TempFile<'r>>,
    pub video: Option<TempFile<'r>>,
}

#[derive(FromForm)]
pub struct PostUpdate<'r> {
    pub title: String,
    pub description: String,
    pub image: Option<TempFile<'r>>,
    pub video: Option<TempFile<'r>>,
}

pub fn post_routes() -> Vec<Route> {
    routes![
        create_post,
        list_posts,
        get_post,
        update_post,
        delete_post,
        posts_by_user
    ]
}

fn detect_mime(file: &TempFile<'_>, staged: &std::path::Path) -> Option<String> {
    match file.content_type() {
        Some(ct) if *ct != ContentType::Binary => Some(format!("{}/{}", ct.top(), ct.sub())),
        _ => match infer::get_from_path(staged) {
            Ok(Some(t)) => Some(t.mime_type().to_string()),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to sniff upload {:?}: {}", staged, e);
                None
            }
        },
    }
}

/// Stores an uploaded file and returns its media name.
///
/// Empty parts and files whose type does not match `kind` are skipped.
async fn save_upload(
    file: Option<&mut TempFile<'_>>,
    kind: MediaKind,
    storage: &dyn StorageBackend,
) -> ServiceResult<Option<String>> {
    let file = match file {
        Some(f) if f.len() > 0 => f,
        _ => return Ok(None),
    };

    let staged = storage.temp_path();
    let _cleanup = TempFileCleanup(staged.clone());
    file.copy_to(&staged)
        .await
        .with_context(|| format!("Failed to stage upload at {:?}", staged))?;

    let mime = match detect_mime(file, &staged) {
        Some(m) if MediaKind::from_mime(&m) == Some(kind) => m,
        other => {
            warn!("Ignoring {:?} upload with type {:?}", kind, other);
            return Ok(None);
        }
    };

    let stored = storage.put(&staged).await?;
    let name = MediaName::new(stored.id(), &mime).to_string();
    debug!("Stored {:?} upload as {}", kind, name);
    Ok(Some(name))
}

/// Deletes blobs that no post points at any more.
pub(crate) async fn release_media(db: &Database, storage: &dyn StorageBackend, names: &[String]) {
    for name in names {
        let Some(media) = MediaName::parse(name) else {
            warn!("Skipping malformed media name {}", name);
            continue;
        };
        let hex_id = hex::encode(&media.id);
        match db.count_media_references(&hex_id).await {
            Ok(0) => match storage.delete(&media.id).await {
                Ok(()) => info!("Deleted unreferenced media {}", name),
                Err(e) => error!("Failed to delete media {}: {}", name, e),
            },
            Ok(n) => debug!("Media {} still referenced by {} posts", name, n),
            Err(e) => error!("Failed to count references to {}: {}", name, e),
        }
    }
}

/// Stores both uploads. When either fails, whatever was already stored is
/// released again before the error is returned.
async fn save_media(
    db: &Database,
    storage: &dyn StorageBackend,
    image: Option<&mut TempFile<'_>>,
    video: Option<&mut TempFile<'_>>,
) -> ServiceResult<(Option<String>, Option<String>)> {
    let image = save_upload(image, MediaKind::Image, storage).await?;
    match save_upload(video, MediaKind::Video, storage).await {
        Ok(video) => Ok((image, video)),
        Err(e) => {
            let stored: Vec<String> = image.into_iter().collect();
            release_media(db, storage, &stored).await;
            Err(e)
        }
    }
}

fn post_title(title: &str) -> ServiceResult<&str> {
    let title = required(title, "title")?;
    check_length(title, "title", MAX_NAME_LENGTH)?;
    Ok(title)
}

async fn owned_post(db: &Database, id: i64, caller: UserId) -> ServiceResult<PostWithAuthor> {
    let post = db.get_post(id).await?.ok_or(ServiceError::NotFound("Post"))?;
    if post.post.user_id != caller.0 {
        warn!("User {} tried to modify post {} of user {}", caller.0, id, post.post.user_id);
        return Err(ServiceError::forbidden("Only the author can modify this post"));
    }
    Ok(post)
}

#[rocket::post("/create", data = "<form>")]
async fn create_post(
    db: &State<Database>,
    storage: &State<Arc<dyn StorageBackend>>,
    settings: &State<Settings>,
    mut form: Form<NewPost<'_>>,
) -> ApiResult<status::Custom<Json<PostView>>> {
    let form = &mut *form;
    let title = post_title(&form.title)?.to_string();
    let description = form.description.trim().to_string();
    let user = require_user(db, form.user_id).await?;

    let storage = storage.inner().as_ref();
    let (image, video) = save_media(db, storage, form.image.as_mut(), form.video.as_mut()).await?;

    let post = match db
        .add_post(&title, &description, image.as_deref(), video.as_deref(), user.id)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            let orphans: Vec<String> = image.into_iter().chain(video).collect();
            release_media(db, storage, &orphans).await;
            return Err(e.into());
        }
    };
    info!("User {} created post {}", user.id, post.id);
    Ok(status::Custom(
        Status::Created,
        Json(PostView::new(post, user.name, settings)),
    ))
}

#[rocket::get("/")]
async fn list_posts(db: &State<Database>, settings: &State<Settings>) -> ApiResult<Json<Vec<PostView>>> {
    let posts = db.list_posts().await?;
    Ok(Json(
        posts
            .into_iter()
            .map(|p| PostView::from_row(p, settings))
            .collect(),
    ))
}

#[rocket::get("/<id>")]
async fn get_post(
    db: &State<Database>,
    settings: &State<Settings>,
    id: i64,
) -> ApiResult<Json<PostView>> {
    let post = db.get_post(id).await?.ok_or(ServiceError::NotFound("Post"))?;
    Ok(Json(PostView::from_row(post, settings)))
}

#[rocket::put("/<id>", data = "<form>")]
async fn update_post(
    db: &State<Database>,
    storage: &State<Arc<dyn StorageBackend>>,
    settings: &State<Settings>,
    caller: UserId,
    id: i64,
    mut form: Form<PostUpdate<'_>>,
) -> ApiResult<Json<PostView>> {
    let existing = owned_post(db, id, caller).await?;
    let form = &mut *form;
    let title = post_title(&form.title)?.to_string();
    let description = form.description.trim().to_string();

    let storage = storage.inner().as_ref();
    let (new_image, new_video) =
        save_media(db, storage, form.image.as_mut(), form.video.as_mut()).await?;

    let old = existing.post;
    let image = new_image.clone().or_else(|| old.image.clone());
    let video = new_video.clone().or_else(|| old.video.clone());

    let post = match db
        .update_post(id, &title, &description, image.as_deref(), video.as_deref())
        .await
    {
        Ok(p) => p,
        Err(e) => {
            // the post still points at its old media
            let orphans: Vec<String> = new_image.into_iter().chain(new_video).collect();
            release_media(db, storage, &orphans).await;
            return Err(e.into());
        }
    };

    let replaced: Vec<String> = [(old.image, &post.image), (old.video, &post.video)]
        .into_iter()
        .filter_map(|(before, after)| before.filter(|b| Some(b) != after.as_ref()))
        .collect();
    release_media(db, storage, &replaced).await;

    info!("User {} updated post {}", caller.0, id);
    Ok(Json(PostView::new(post, existing.user_name, settings)))
}

#[rocket::delete("/<id>")]
async fn delete_post(
    db: &State<Database>,
    storage: &State<Arc<dyn StorageBackend>>,
    caller: UserId,
    id: i64,
) -> ApiResult<status::NoContent> {
    let existing = owned_post(db, id, caller).await?;
    if !db.delete_post(id).await? {
        return Err(ServiceError::NotFound("Post").into());
    }
    let media: Vec<String> = existing
        .post
        .image
        .into_iter()
        .chain(existing.post.video)
        .collect();
    release_media(db, storage.inner().as_ref(), &media).await;
    info!("User {} deleted post {}", caller.0, id);
    Ok(status::NoContent)
}

#[rocket::get("/user/<user_id>", rank = 1)]
async fn posts_by_user(
    db: &State<Database>,
    settings: &State<Settings>,
    user_id: i64,
) -> ApiResult<Json<Vec<PostView>>> {
    require_user(db, user_id).await?;
    let posts = db.list_posts_by_user(user_id).await?;
    Ok(Json(
        posts
            .into_iter()
            .map(|p| PostView::from_row(p, settings))
            .collect(),
    ))
}
