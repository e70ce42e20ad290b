use crate::auth::UserId;
use crate::db::{Database, GroupMessage};
use crate::error::{ApiResult, ServiceError};
use crate::permissions;
use crate::routes::groups::{load_group, member_role};
use crate::routes::required;
use log::{info, warn};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::serde::Deserialize;
use rocket::{routes, Route, State};

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NewMessage {
    #[serde(default)]
    pub content: String,
}

pub fn message_routes() -> Vec<Route> {
    routes![list_messages, send_message, delete_message]
}

#[rocket::get("/<group_id>/messages")]
async fn list_messages(
    db: &State<Database>,
    caller: UserId,
    group_id: i64,
) -> ApiResult<Json<Vec<GroupMessage>>> {
    let group = load_group(db, group_id).await?;
    permissions::check_member(member_role(db, &group, caller.0).await?, "view messages")?;
    Ok(Json(db.list_messages(group_id).await?))
}

#[rocket::post("/<group_id>/messages", data = "<req>", format = "json")]
async fn send_message(
    db: &State<Database>,
    caller: UserId,
    group_id: i64,
    req: Json<NewMessage>,
) -> ApiResult<status::Custom<Json<GroupMessage>>> {
    let content = required(&req.content, "content")?;
    let group = load_group(db, group_id).await?;
    permissions::check_member(member_role(db, &group, caller.0).await?, "send messages")?;

    let message = db.add_message(group_id, caller.0, content).await?;
    info!("User {} posted message {} in group {}", caller.0, message.id, group_id);
    Ok(status::Custom(Status::Created, Json(message)))
}

#[rocket::delete("/<group_id>/messages/<message_id>")]
async fn delete_message(
    db: &State<Database>,
    caller: UserId,
    group_id: i64,
    message_id: i64,
) -> ApiResult<status::NoContent> {
    let group = load_group(db, group_id).await?;
    let message = db
        .get_message(message_id)
        .await?
        .filter(|m| m.group_id == group_id)
        .ok_or(ServiceError::NotFound("Message"))?;

    let role = member_role(db, &group, caller.0).await?;
    if !permissions::can_delete_content(role, message.user_id, caller.0) {
        warn!("User {} tried to delete message {}", caller.0, message_id);
        return Err(ServiceError::forbidden(
            "Only the author, a moderator or the admin can delete this message",
        )
        .into());
    }
    db.delete_message(message_id).await?;
    info!("User {} deleted message {} in group {}", caller.0, message_id, group_id);
    Ok(status::NoContent)
}
