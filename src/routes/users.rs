use crate::auth::password::PasswordHash;
use crate::auth::UserId;
use crate::db::{Database, User};
use crate::error::{ApiError, ApiResult, ServiceError};
use crate::routes::posts::release_media;
use crate::routes::{check_length, required, MAX_NAME_LENGTH};
use crate::storage::StorageBackend;
use chrono::{DateTime, Utc};
use log::{info, warn};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{routes, Route, State};
use std::sync::Arc;

/// Public view of a user; never carries password data.
#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            created: u.created,
        }
    }
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct UserUpdate {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct UserRef {
    pub id: i64,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct Login {
    pub email: String,
    pub password: String,
}

pub fn user_routes() -> Vec<Route> {
    routes![get_users, add_user, update_user, delete_user, login]
}

/// Trimmed name and email, bounded by their column widths.
fn validate_profile<'a>(name: &'a str, email: &'a str) -> Result<(&'a str, &'a str), ServiceError> {
    let name = required(name, "name")?;
    let email = required(email, "email")?;
    check_length(name, "name", MAX_NAME_LENGTH)?;
    check_length(email, "email", MAX_NAME_LENGTH)?;
    Ok((name, email))
}

fn check_self(caller: UserId, id: i64) -> Result<(), ServiceError> {
    if caller.0 == id {
        Ok(())
    } else {
        warn!("User {} tried to modify user {}", caller.0, id);
        Err(ServiceError::forbidden("Users can only modify their own account"))
    }
}

async fn check_email_free(db: &Database, email: &str, owner: Option<i64>) -> Result<(), ServiceError> {
    match db.get_user_by_email(email).await? {
        Some(u) if Some(u.id) != owner => {
            Err(ServiceError::Conflict("Email already registered".to_string()))
        }
        _ => Ok(()),
    }
}

#[rocket::get("/getUsers")]
async fn get_users(db: &State<Database>) -> ApiResult<Json<Vec<UserView>>> {
    let users = db.list_users().await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

#[rocket::post("/adduser", data = "<req>", format = "json")]
async fn add_user(
    db: &State<Database>,
    req: Json<NewUser>,
) -> ApiResult<status::Custom<Json<UserView>>> {
    let (name, email) = validate_profile(&req.name, &req.email)?;
    if req.password.is_empty() {
        return Err(ServiceError::bad_request("password is required").into());
    }
    check_email_free(db, email, None).await?;

    let user = db.add_user(name, email, &PasswordHash::new(&req.password)).await?;
    info!("Created user {} ({})", user.id, user.email);
    Ok(status::Custom(Status::Created, Json(user.into())))
}

#[rocket::put("/updateuser", data = "<req>", format = "json")]
async fn update_user(
    db: &State<Database>,
    caller: UserId,
    req: Json<UserUpdate>,
) -> ApiResult<Json<UserView>> {
    check_self(caller, req.id)?;
    let (name, email) = validate_profile(&req.name, &req.email)?;
    check_email_free(db, email, Some(req.id)).await?;

    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(PasswordHash::new);
    let user = db
        .update_user(req.id, name, email, password.as_ref())
        .await?
        .ok_or(ServiceError::NotFound("User"))?;
    info!("Updated user {}", user.id);
    Ok(Json(user.into()))
}

#[rocket::delete("/deleteuser", data = "<req>", format = "json")]
async fn delete_user(
    db: &State<Database>,
    storage: &State<Arc<dyn StorageBackend>>,
    caller: UserId,
    req: Json<UserRef>,
) -> ApiResult<status::NoContent> {
    check_self(caller, req.id)?;
    if !db.groups_by_admin(req.id).await?.is_empty() {
        return Err(ServiceError::Conflict(
            "User still administers groups. Transfer ownership first.".to_string(),
        )
        .into());
    }
    // posts go with the user, their media must be released afterwards
    let media: Vec<String> = db
        .list_posts_by_user(req.id)
        .await?
        .into_iter()
        .flat_map(|p| p.post.image.into_iter().chain(p.post.video))
        .collect();
    if !db.delete_user(req.id).await? {
        return Err(ServiceError::NotFound("User").into());
    }
    release_media(db, storage.inner().as_ref(), &media).await;
    info!("Deleted user {}", req.id);
    Ok(status::NoContent)
}

#[rocket::post("/login", data = "<req>", format = "json")]
async fn login(db: &State<Database>, req: Json<Login>) -> ApiResult<Json<UserView>> {
    match db.get_user_by_email(req.email.trim()).await? {
        Some(user) if user.check_password(&req.password) => {
            info!("User {} logged in", user.id);
            Ok(Json(user.into()))
        }
        _ => {
            warn!("Failed login for {}", req.email.trim());
            Err(ApiError::new(Status::Unauthorized, "Invalid credentials"))
        }
    }
}
