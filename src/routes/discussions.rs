use crate::auth::UserId;
use crate::db::{Database, GroupDiscussion};
use crate::error::{ApiResult, ServiceError, ServiceResult};
use crate::permissions;
use crate::routes::groups::{load_group, member_role};
use crate::routes::{check_length, required};
use log::{info, warn};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::serde::Deserialize;
use rocket::{routes, FromForm, Route, State};

pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_CONTENT_LENGTH: usize = 10_000;

#[derive(Deserialize, Default)]
#[serde(crate = "rocket::serde", default)]
pub struct DiscussionRequest {
    pub title: String,
    pub content: String,
}

impl DiscussionRequest {
    /// Trimmed title and content.
    fn validate(&self) -> ServiceResult<(&str, &str)> {
        let title = required(&self.title, "title")?;
        let content = required(&self.content, "content")?;
        check_length(title, "title", MAX_TITLE_LENGTH)?;
        check_length(content, "content", MAX_CONTENT_LENGTH)?;
        Ok((title, content))
    }
}

#[derive(FromForm)]
pub struct KeywordQuery {
    pub keyword: Option<String>,
}

pub fn discussion_routes() -> Vec<Route> {
    routes![
        list_discussions,
        get_discussion,
        create_discussion,
        update_discussion,
        delete_discussion,
        search_discussions
    ]
}

async fn group_discussion(
    db: &Database,
    group_id: i64,
    discussion_id: i64,
) -> ServiceResult<GroupDiscussion> {
    db.get_discussion(discussion_id)
        .await?
        .filter(|d| d.group_id == group_id)
        .ok_or(ServiceError::NotFound("Discussion"))
}

#[rocket::get("/<group_id>/discussions")]
async fn list_discussions(
    db: &State<Database>,
    group_id: i64,
) -> ApiResult<Json<Vec<GroupDiscussion>>> {
    load_group(db, group_id).await?;
    Ok(Json(db.list_discussions(group_id).await?))
}

#[rocket::get("/<group_id>/discussions/<discussion_id>", rank = 2)]
async fn get_discussion(
    db: &State<Database>,
    group_id: i64,
    discussion_id: i64,
) -> ApiResult<Json<GroupDiscussion>> {
    Ok(Json(group_discussion(db, group_id, discussion_id).await?))
}

#[rocket::post("/<group_id>/discussions", data = "<req>", format = "json")]
async fn create_discussion(
    db: &State<Database>,
    caller: UserId,
    group_id: i64,
    req: Json<DiscussionRequest>,
) -> ApiResult<status::Custom<Json<GroupDiscussion>>> {
    let (title, content) = req.validate()?;
    let group = load_group(db, group_id).await?;
    permissions::check_member(
        member_role(db, &group, caller.0).await?,
        "start discussions",
    )?;

    let discussion = db.add_discussion(group_id, caller.0, title, content).await?;
    info!(
        "User {} started discussion {} in group {}",
        caller.0, discussion.id, group_id
    );
    Ok(status::Custom(Status::Created, Json(discussion)))
}

#[rocket::put("/<group_id>/discussions/<discussion_id>", data = "<req>", format = "json")]
async fn update_discussion(
    db: &State<Database>,
    caller: UserId,
    group_id: i64,
    discussion_id: i64,
    req: Json<DiscussionRequest>,
) -> ApiResult<Json<GroupDiscussion>> {
    let existing = group_discussion(db, group_id, discussion_id).await?;
    if existing.user_id != caller.0 {
        warn!("User {} tried to edit discussion {}", caller.0, discussion_id);
        return Err(ServiceError::forbidden("Only the author can edit this discussion").into());
    }
    let (title, content) = req.validate()?;
    Ok(Json(db.update_discussion(discussion_id, title, content).await?))
}

#[rocket::delete("/<group_id>/discussions/<discussion_id>")]
async fn delete_discussion(
    db: &State<Database>,
    caller: UserId,
    group_id: i64,
    discussion_id: i64,
) -> ApiResult<status::NoContent> {
    let group = load_group(db, group_id).await?;
    let discussion = group_discussion(db, group_id, discussion_id).await?;
    let role = member_role(db, &group, caller.0).await?;
    if !permissions::can_delete_content(role, discussion.user_id, caller.0) {
        warn!("User {} tried to delete discussion {}", caller.0, discussion_id);
        return Err(ServiceError::forbidden(
            "Only the author, a moderator or the admin can delete this discussion",
        )
        .into());
    }
    db.delete_discussion(discussion_id).await?;
    info!("User {} deleted discussion {}", caller.0, discussion_id);
    Ok(status::NoContent)
}

#[rocket::get("/<group_id>/discussions/search?<q..>", rank = 1)]
async fn search_discussions(
    db: &State<Database>,
    group_id: i64,
    q: KeywordQuery,
) -> ApiResult<Json<Vec<GroupDiscussion>>> {
    load_group(db, group_id).await?;
    match q.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(keyword) => Ok(Json(db.search_discussions(group_id, keyword).await?)),
        None => Ok(Json(db.list_discussions(group_id).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(title: &str, content: &str) -> DiscussionRequest {
        DiscussionRequest {
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn validates_discussion_fields() {
        let ok = req(" Knife skills ", "Which chef knife?");
        assert_eq!(ok.validate().unwrap(), ("Knife skills", "Which chef knife?"));

        assert!(matches!(req("", "x").validate(), Err(ServiceError::BadRequest(_))));
        assert!(matches!(req("t", "  ").validate(), Err(ServiceError::BadRequest(_))));

        let long = "a".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(req("t", &long).validate().is_err());
        assert!(req("t", &"a".repeat(MAX_CONTENT_LENGTH)).validate().is_ok());
    }
}
