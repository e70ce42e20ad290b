//! Tests against a real Postgres. They run when `DATABASE_URL` is set and
//! are skipped otherwise; every test works on rows it creates itself.

use anyhow::Result;
use async_trait::async_trait;
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncRead;
use uuid::Uuid;
use yummly::auth::password::PasswordHash;
use yummly::db::{Database, RecipeFields, RecipeFilter, User};
use yummly::filesystem::FileStore;
use yummly::settings::{FileSystemStorageSettings, Settings};
use yummly::storage::{BlobMetadata, HttpRange, StorageBackend, StorageResult};

async fn database() -> Result<Option<Database>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return Ok(None);
    };
    let db = Database::new(&url, 4).await?;
    db.migrate().await?;
    Ok(Some(db))
}

fn token() -> String {
    Uuid::new_v4().simple().to_string()
}

async fn user(db: &Database, name: &str) -> Result<User> {
    let email = format!("{}-{}@yummly.test", name.to_lowercase(), token());
    Ok(db.add_user(name, &email, &PasswordHash::new("secret")).await?)
}

fn media_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[tokio::test]
async fn group_creator_is_moderator_member() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let chef = user(&db, "Chef").await?;
    let group = db
        .create_group("Dumpling Club", None, "Chinese", None, chef.id)
        .await?;

    let membership = db.get_membership(group.id, chef.id).await?;
    assert!(membership.is_some_and(|m| m.is_moderator));

    let moderators = db.list_moderators(group.id).await?;
    assert_eq!(moderators.iter().map(|m| m.id).collect::<Vec<_>>(), vec![chef.id]);

    let summary = db.get_group_summary(group.id).await?.expect("group summary");
    assert_eq!(summary.member_count, 1);
    assert_eq!(summary.admin_name, "Chef");
    Ok(())
}

#[tokio::test]
async fn one_membership_and_one_like_per_pair() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let admin = user(&db, "Admin").await?;
    let cook = user(&db, "Cook").await?;
    let group = db.create_group("Bread", None, "French", None, admin.id).await?;

    assert!(db.add_member(group.id, cook.id).await?);
    assert!(!db.add_member(group.id, cook.id).await?);
    assert_eq!(db.list_members(group.id).await?.len(), 2);

    let post = db.add_post("Baguette", "", None, None, admin.id).await?;
    assert!(db.toggle_like(post.id, cook.id).await?);
    assert!(db.has_liked(post.id, cook.id).await?);
    assert_eq!(db.count_likes(post.id).await?, 1);

    assert!(!db.toggle_like(post.id, cook.id).await?);
    assert!(!db.has_liked(post.id, cook.id).await?);
    assert_eq!(db.count_likes(post.id).await?, 0);

    let duplicate = sqlx::query("insert into likes(post_id, user_id) values($1, $2), ($1, $2)")
        .bind(post.id)
        .bind(cook.id)
        .execute(&db.pool)
        .await;
    assert!(duplicate.is_err());
    assert_eq!(db.count_likes(post.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn ownership_transfer_keeps_both_moderators() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let founder = user(&db, "Founder").await?;
    let heir = user(&db, "Heir").await?;
    let group = db.create_group("Spice", None, "Indian", None, founder.id).await?;
    db.add_member(group.id, heir.id).await?;

    db.transfer_ownership(group.id, heir.id).await?;

    let group = db.get_group(group.id).await?.expect("group");
    assert_eq!(group.admin_id, heir.id);
    for id in [founder.id, heir.id] {
        let m = db.get_membership(group.id, id).await?;
        assert!(m.is_some_and(|m| m.is_moderator));
    }
    assert_eq!(db.groups_by_admin(heir.id).await?.len(), 1);
    assert!(db.groups_by_admin(founder.id).await?.is_empty());
    assert_eq!(db.groups_by_member(founder.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn media_references_ignore_extension() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let cook = user(&db, "Cook").await?;
    let hash = media_hash(token().as_bytes());

    let first = db
        .add_post("Tart", "", Some(&format!("{}.png", hash)), None, cook.id)
        .await?;
    db.add_post("Tart video", "", None, Some(&format!("{}.mp4", hash)), cook.id)
        .await?;
    assert_eq!(db.count_media_references(&hash).await?, 2);
    assert!(db.list_media_ids().await?.contains(&hash));

    db.delete_post(first.id).await?;
    assert_eq!(db.count_media_references(&hash).await?, 1);
    Ok(())
}

#[tokio::test]
async fn deleting_group_or_user_cascades() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let admin = user(&db, "Admin").await?;
    let member = user(&db, "Member").await?;
    let group = db.create_group("Soup", None, "Any", None, admin.id).await?;
    db.add_member(group.id, member.id).await?;
    let message = db.add_message(group.id, member.id, "Miso tonight?").await?;
    let discussion = db
        .add_discussion(group.id, member.id, "Stock", "Bones or veg?")
        .await?;

    assert!(db.delete_group(group.id).await?);
    assert!(db.get_membership(group.id, member.id).await?.is_none());
    assert!(db.get_message(message.id).await?.is_none());
    assert!(db.get_discussion(discussion.id).await?.is_none());

    let post = db.add_post("Gazpacho", "", None, None, member.id).await?;
    let comment = db.add_comment(post.id, admin.id, "Needs salt").await?;
    db.toggle_like(post.id, admin.id).await?;
    assert!(db.delete_user(member.id).await?);
    assert!(db.get_post(post.id).await?.is_none());
    assert!(db.get_comment(comment.id).await?.is_none());

    // an admin cannot be deleted while administering a group
    db.create_group("Stew", None, "Any", None, admin.id).await?;
    assert!(db.delete_user(admin.id).await.is_err());
    Ok(())
}

#[tokio::test]
async fn group_search_matches_name_or_cuisine() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let admin = user(&db, "Admin").await?;
    let tag = token();
    let by_name = db
        .create_group(&format!("Weekend {} cooks", tag), None, "Mexican", None, admin.id)
        .await?;
    let by_cuisine = db.create_group("Tamales", None, &tag, None, admin.id).await?;
    let both = db
        .create_group(&format!("{} fans", tag), None, &tag, None, admin.id)
        .await?;

    let mut found: Vec<i64> = db
        .search_groups(&tag.to_uppercase())
        .await?
        .into_iter()
        .map(|g| g.id)
        .collect();
    found.sort_unstable();
    let mut expected = vec![by_name.id, by_cuisine.id, both.id];
    expected.sort_unstable();
    assert_eq!(found, expected);

    // cuisine must match exactly, not as a substring
    let partial = &tag[..8];
    let found = db.search_groups(&format!("x{}", partial)).await?;
    assert!(found.is_empty());
    Ok(())
}

#[tokio::test]
async fn recipe_filters_match_rows() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let cook = user(&db, "Cook").await?;
    let tag = token();
    let curry = db
        .add_recipe(
            cook.id,
            &RecipeFields {
                title: format!("Green curry {}", tag),
                ingredients: vec![format!("lemongrass-{}", tag), "coconut milk".to_string()],
                cuisine: Some(format!("thai-{}", tag)),
                dietary_preferences: vec![format!("vegan-{}", tag)],
                ..Default::default()
            },
        )
        .await?;
    let salad = db
        .add_recipe(
            cook.id,
            &RecipeFields {
                title: "Som tam".to_string(),
                cuisine: Some(format!("thai-{}", tag)),
                ..Default::default()
            },
        )
        .await?;

    let ids = |rows: Vec<yummly::db::RecipeWithAuthor>| {
        let mut ids: Vec<i64> = rows.into_iter().map(|r| r.recipe.id).collect();
        ids.sort_unstable();
        ids
    };
    let mut both = vec![curry.recipe.id, salad.recipe.id];
    both.sort_unstable();

    let by_text = db.search_recipes(&RecipeFilter::Text(tag.to_uppercase())).await?;
    assert_eq!(ids(by_text), both);

    let by_ingredient = db
        .search_recipes(&RecipeFilter::Ingredient(format!("LEMONGRASS-{}", tag)))
        .await?;
    assert_eq!(ids(by_ingredient), vec![curry.recipe.id]);

    let by_cuisine = db.search_recipes(&RecipeFilter::Cuisine(format!("thai-{}", tag))).await?;
    assert_eq!(ids(by_cuisine), both);

    let by_diet = db
        .search_recipes(&RecipeFilter::DietaryPreference(format!("vegan-{}", tag)))
        .await?;
    assert_eq!(ids(by_diet), vec![curry.recipe.id]);

    let comment = db.add_recipe_comment(curry.recipe.id, cook.id, "Add basil").await?;
    assert!(db.delete_recipe(curry.recipe.id).await?);
    assert!(db.list_recipe_comments(curry.recipe.id).await?.is_empty());
    assert_ne!(comment.id, 0);
    Ok(())
}

/// File store whose `put` fails from the `fail_from`-th call on.
struct FlakyStore {
    inner: FileStore,
    puts: AtomicUsize,
    fail_from: usize,
}

#[async_trait]
impl StorageBackend for FlakyStore {
    async fn put(&self, source: &Path) -> Result<StorageResult> {
        if self.puts.fetch_add(1, Ordering::SeqCst) + 1 >= self.fail_from {
            anyhow::bail!("disk full");
        }
        self.inner.put(source).await
    }

    async fn head(&self, id: &[u8]) -> Result<BlobMetadata> {
        self.inner.head(id).await
    }

    async fn stream_reader(
        &self,
        id: &[u8],
        range: Option<HttpRange>,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        self.inner.stream_reader(id, range).await
    }

    async fn delete(&self, id: &[u8]) -> Result<()> {
        self.inner.delete(id).await
    }

    fn temp_path(&self) -> PathBuf {
        self.inner.temp_path()
    }
}

struct PostApp {
    client: Client,
    store: FileStore,
    _dir: TempDir,
}

async fn post_app(db: &Database, fail_from: usize) -> Result<PostApp> {
    let dir = tempfile::tempdir()?;
    let store = FileStore::with_dirs(dir.path().join("media"), dir.path().join("tmp"))?;
    let settings = Settings {
        listen: Some("127.0.0.1:0".to_string()),
        database: String::new(),
        max_connections: Some(4),
        max_upload_bytes: 1024 * 1024,
        public_url: "http://localhost:8000".to_string(),
        filesystem: FileSystemStorageSettings {
            storage_dir: dir.path().join("media").display().to_string(),
        },
        cors: None,
    };
    let storage: Arc<dyn StorageBackend> = Arc::new(FlakyStore {
        inner: store.clone(),
        puts: AtomicUsize::new(0),
        fail_from,
    });
    let rocket = yummly::build_rocket(settings, db.clone(), storage)?;
    Ok(PostApp {
        client: Client::tracked(rocket).await?,
        store,
        _dir: dir,
    })
}

const BOUNDARY: &str = "yummly-form-boundary";

fn post_form(user_id: i64, image: &[u8], video: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in [
        ("title", "Pho".to_string()),
        ("description", "Eight hour broth".to_string()),
        ("userId", user_id.to_string()),
    ] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    let files = [("image", "pho.png", "image/png", Some(image)), ("video", "pho.mp4", "video/mp4", video)];
    for (name, file, mime, content) in files {
        let Some(content) = content else { continue };
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                Content-Type: {}\r\n\r\n",
                BOUNDARY, name, file, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn form_type() -> ContentType {
    ContentType::new("multipart", "form-data").with_params(("boundary", BOUNDARY))
}

#[rocket::async_test]
async fn failed_video_upload_leaves_no_image_behind() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let cook = user(&db, "Cook").await?;
    let app = post_app(&db, 2).await?;
    let image = format!("png bytes {}", token()).into_bytes();
    let video = format!("mp4 bytes {}", token()).into_bytes();

    let res = app
        .client
        .post("/api/posts/create")
        .header(form_type())
        .body(post_form(cook.id, &image, Some(&video)))
        .dispatch()
        .await;
    assert_eq!(res.status(), Status::InternalServerError);
    let body: serde_json::Value = serde_json::from_str(&res.into_string().await.unwrap_or_default())?;
    assert_eq!(body["message"], "Internal server error");

    assert!(db.list_posts_by_user(cook.id).await?.is_empty());
    let stored = hex::decode(media_hash(&image))?;
    assert!(!app.store.get_path(&stored).exists());
    Ok(())
}

#[rocket::async_test]
async fn shared_media_survives_until_last_post_is_gone() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let cook = user(&db, "Cook").await?;
    let app = post_app(&db, usize::MAX).await?;
    let image = format!("shared png {}", token()).into_bytes();
    let stored = hex::decode(media_hash(&image))?;

    let mut ids = vec![];
    for _ in 0..2 {
        let res = app
            .client
            .post("/api/posts/create")
            .header(form_type())
            .body(post_form(cook.id, &image, None))
            .dispatch()
            .await;
        assert_eq!(res.status(), Status::Created);
        let body: serde_json::Value = serde_json::from_str(&res.into_string().await.unwrap_or_default())?;
        assert_eq!(body["imagePath"], format!("{}.png", hex::encode(&stored)));
        ids.push(body["id"].as_i64().unwrap_or_default());
    }
    assert!(app.store.get_path(&stored).exists());

    let delete = |id: i64| {
        app.client
            .delete(format!("/api/posts/{}", id))
            .header(Header::new("userid", cook.id.to_string()))
    };
    assert_eq!(delete(ids[0]).dispatch().await.status(), Status::NoContent);
    assert!(app.store.get_path(&stored).exists());
    assert_eq!(delete(ids[1]).dispatch().await.status(), Status::NoContent);
    assert!(!app.store.get_path(&stored).exists());
    Ok(())
}

#[rocket::async_test]
async fn group_rules_over_http() -> Result<()> {
    let Some(db) = database().await? else {
        return Ok(());
    };
    let admin = user(&db, "Admin").await?;
    let cook = user(&db, "Cook").await?;
    let app = post_app(&db, usize::MAX).await?;
    let as_user = |id: i64| Header::new("userid", id.to_string());

    let res = app
        .client
        .post("/api/groups")
        .header(as_user(admin.id))
        .header(ContentType::JSON)
        .body(r#"{"name":"Noodle Nerds","cuisineType":"Japanese"}"#)
        .dispatch()
        .await;
    assert_eq!(res.status(), Status::Created);
    let body: serde_json::Value = serde_json::from_str(&res.into_string().await.unwrap_or_default())?;
    let id = body["id"].as_i64().unwrap_or_default();
    assert_eq!(body["memberCount"], 1);

    let join = || app.client.post(format!("/api/groups/{}/join", id)).header(as_user(cook.id));
    assert_eq!(join().dispatch().await.status(), Status::Ok);
    assert_eq!(join().dispatch().await.status(), Status::BadRequest);

    let leave = app
        .client
        .post(format!("/api/groups/{}/leave", id))
        .header(as_user(admin.id))
        .dispatch()
        .await;
    assert_eq!(leave.status(), Status::Forbidden);

    let res = app
        .client
        .post(format!("/api/groups/{}/transfer-ownership", id))
        .header(as_user(admin.id))
        .header(ContentType::JSON)
        .body(format!(r#"{{"newAdminId":{}}}"#, cook.id))
        .dispatch()
        .await;
    assert_eq!(res.status(), Status::Ok);

    let res = app
        .client
        .get(format!("/api/groups/{}/is-admin", id))
        .header(as_user(cook.id))
        .dispatch()
        .await;
    assert_eq!(res.into_string().await.as_deref(), Some("true"));

    let res = app
        .client
        .get(format!("/api/groups/{}/moderators", id))
        .dispatch()
        .await;
    let moderators: serde_json::Value = serde_json::from_str(&res.into_string().await.unwrap_or_default())?;
    assert_eq!(moderators.as_array().map(Vec::len), Some(2));
    Ok(())
}
