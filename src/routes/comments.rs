use crate::auth::UserId;
use crate::db::{Comment, Database};
use crate::error::{ApiResult, ServiceError, ServiceResult};
use crate::routes::{require_post, require_user, required};
use log::{info, warn};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{routes, FromForm, Route, State};

#[derive(FromForm)]
pub struct NewComment {
    #[field(name = "userId")]
    pub user_id: i64,
    pub content: String,
}

#[derive(FromForm)]
pub struct CommentEdit {
    #[field(name = "newContent")]
    pub new_content: String,
}

pub fn comment_routes() -> Vec<Route> {
    routes![
        add_comment,
        list_comments,
        delete_comment,
        update_comment,
        count_comments
    ]
}

/// Comment on `post_id`, 404 when it belongs to another post.
async fn post_comment(db: &Database, post_id: i64, comment_id: i64) -> ServiceResult<Comment> {
    db.get_comment(comment_id)
        .await?
        .filter(|c| c.post_id == post_id)
        .ok_or(ServiceError::NotFound("Comment"))
}

#[rocket::post("/<post_id>/comments?<q..>")]
async fn add_comment(
    db: &State<Database>,
    post_id: i64,
    q: NewComment,
) -> ApiResult<status::Custom<Json<Comment>>> {
    let content = required(&q.content, "content")?;
    require_post(db, post_id).await?;
    require_user(db, q.user_id).await?;

    let comment = db.add_comment(post_id, q.user_id, content).await?;
    info!("User {} commented on post {}", q.user_id, post_id);
    Ok(status::Custom(Status::Created, Json(comment)))
}

#[rocket::get("/<post_id>/comments")]
async fn list_comments(db: &State<Database>, post_id: i64) -> ApiResult<Json<Vec<Comment>>> {
    require_post(db, post_id).await?;
    Ok(Json(db.list_comments(post_id).await?))
}

#[rocket::delete("/<post_id>/comments/<comment_id>")]
async fn delete_comment(
    db: &State<Database>,
    caller: UserId,
    post_id: i64,
    comment_id: i64,
) -> ApiResult<status::NoContent> {
    let comment = post_comment(db, post_id, comment_id).await?;
    if comment.user_id != caller.0 {
        // the post owner may clean up their own thread
        let post = db.get_post(post_id).await?.ok_or(ServiceError::NotFound("Post"))?;
        if post.post.user_id != caller.0 {
            warn!("User {} tried to delete comment {}", caller.0, comment_id);
            return Err(ServiceError::forbidden(
                "Only the comment author or post owner can delete this comment",
            )
            .into());
        }
    }
    db.delete_comment(comment_id).await?;
    info!("User {} deleted comment {}", caller.0, comment_id);
    Ok(status::NoContent)
}

#[rocket::put("/<post_id>/comments/<comment_id>?<q..>")]
async fn update_comment(
    db: &State<Database>,
    caller: UserId,
    post_id: i64,
    comment_id: i64,
    q: CommentEdit,
) -> ApiResult<Json<Comment>> {
    let content = required(&q.new_content, "newContent")?;
    let comment = post_comment(db, post_id, comment_id).await?;
    if comment.user_id != caller.0 {
        warn!("User {} tried to edit comment {}", caller.0, comment_id);
        return Err(ServiceError::forbidden("Only the author can edit this comment").into());
    }
    let updated = db.update_comment(comment_id, content).await?;
    Ok(Json(updated))
}

#[rocket::get("/<post_id>/comments/count")]
async fn count_comments(db: &State<Database>, post_id: i64) -> ApiResult<Json<i64>> {
    require_post(db, post_id).await?;
    Ok(Json(db.count_comments(post_id).await?))
}
