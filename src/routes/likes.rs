use crate::db::{Database, Like};
use crate::error::ApiResult;
use crate::routes::{require_post, require_user};
use log::info;
use rocket::serde::json::Json;
use rocket::{routes, FromForm, Route, State};

#[derive(FromForm)]
pub struct LikeQuery {
    #[field(name = "userId")]
    pub user_id: i64,
}

pub fn like_routes() -> Vec<Route> {
    routes![toggle_like, check_like, count_likes, list_likes]
}

#[rocket::post("/<post_id>/likes?<q..>")]
async fn toggle_like(db: &State<Database>, post_id: i64, q: LikeQuery) -> ApiResult<&'static str> {
    require_post(db, post_id).await?;
    require_user(db, q.user_id).await?;

    if db.toggle_like(post_id, q.user_id).await? {
        info!("User {} liked post {}", q.user_id, post_id);
        Ok("Liked")
    } else {
        info!("User {} unliked post {}", q.user_id, post_id);
        Ok("Unliked")
    }
}

#[rocket::get("/<post_id>/likes/check?<q..>")]
async fn check_like(db: &State<Database>, post_id: i64, q: LikeQuery) -> ApiResult<Json<bool>> {
    Ok(Json(db.has_liked(post_id, q.user_id).await?))
}

#[rocket::get("/<post_id>/likes/count")]
async fn count_likes(db: &State<Database>, post_id: i64) -> ApiResult<Json<i64>> {
    require_post(db, post_id).await?;
    Ok(Json(db.count_likes(post_id).await?))
}

#[rocket::get("/<post_id>/likes")]
async fn list_likes(db: &State<Database>, post_id: i64) -> ApiResult<Json<Vec<Like>>> {
    require_post(db, post_id).await?;
    Ok(Json(db.list_likes(post_id).await?))
}
