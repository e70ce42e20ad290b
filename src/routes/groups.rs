use crate::auth::UserId;
use crate::db::{Database, Group, GroupMember, GroupSummary};
use crate::error::{ApiResult, ServiceError, ServiceResult};
use crate::permissions::{self, GroupRole};
use crate::routes::{
    check_length, require_user, required, MAX_CUISINE_LENGTH, MAX_NAME_LENGTH, MAX_URL_LENGTH,
};
use log::{info, warn};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::serde::Deserialize;
use rocket::{routes, FromForm, Route, State};

#[derive(Deserialize, Default)]
#[serde(crate = "rocket::serde", rename_all = "camelCase", default)]
pub struct GroupRequest {
    pub name: String,
    pub description: Option<String>,
    pub cuisine_type: String,
    pub image_url: Option<String>,
}

impl GroupRequest {
    /// Trimmed name and cuisine type.
    fn validate(&self) -> ServiceResult<(&str, &str)> {
        let name = required(&self.name, "name")?;
        let cuisine_type = required(&self.cuisine_type, "cuisineType")?;
        check_length(name, "name", MAX_NAME_LENGTH)?;
        check_length(cuisine_type, "cuisineType", MAX_CUISINE_LENGTH)?;
        if let Some(url) = optional(&self.image_url) {
            check_length(url, "imageUrl", MAX_URL_LENGTH)?;
        }
        Ok((name, cuisine_type))
    }
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct TransferRequest {
    pub new_admin_id: Option<i64>,
}

#[derive(FromForm)]
pub struct DeleteQuery {
    #[field(name = "userId")]
    pub user_id: Option<i64>,
}

#[derive(FromForm)]
pub struct SearchQuery {
    pub query: Option<String>,
}

pub fn group_routes() -> Vec<Route> {
    routes![
        list_groups,
        get_group,
        create_group,
        update_group,
        delete_group,
        delete_group_via_post,
        join_group,
        leave_group,
        list_members,
        list_moderators,
        add_moderator,
        remove_moderator,
        transfer_ownership,
        search_groups,
        groups_by_member,
        groups_by_admin,
        is_member,
        is_moderator,
        is_admin,
        remove_member
    ]
}

pub(crate) async fn load_group(db: &Database, id: i64) -> ServiceResult<Group> {
    db.get_group(id).await?.ok_or(ServiceError::NotFound("Group"))
}

/// Role of `user_id` within `group`, from its membership row.
pub(crate) async fn member_role(db: &Database, group: &Group, user_id: i64) -> ServiceResult<GroupRole> {
    let membership = db.get_membership(group.id, user_id).await?;
    Ok(GroupRole::resolve(
        group.admin_id,
        user_id,
        membership.map(|m| m.is_moderator),
    ))
}

async fn summary(db: &Database, id: i64) -> ServiceResult<GroupSummary> {
    db.get_group_summary(id)
        .await?
        .ok_or(ServiceError::NotFound("Group"))
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn delete_as(db: &Database, id: i64, user_id: i64) -> ServiceResult<()> {
    let group = load_group(db, id).await?;
    let role = member_role(db, &group, user_id).await?;
    if let Err(e) = permissions::check_admin(role, "delete the group") {
        warn!("User {} tried to delete group {}", user_id, id);
        return Err(e);
    }
    if !db.delete_group(id).await? {
        return Err(ServiceError::NotFound("Group"));
    }
    info!("User {} deleted group {} ({})", user_id, id, group.name);
    Ok(())
}

#[rocket::get("/")]
async fn list_groups(db: &State<Database>) -> ApiResult<Json<Vec<GroupSummary>>> {
    Ok(Json(db.list_groups().await?))
}

#[rocket::get("/<id>")]
async fn get_group(db: &State<Database>, id: i64) -> ApiResult<Json<GroupSummary>> {
    Ok(Json(summary(db, id).await?))
}

#[rocket::post("/", data = "<req>", format = "json")]
async fn create_group(
    db: &State<Database>,
    caller: UserId,
    req: Json<GroupRequest>,
) -> ApiResult<status::Custom<Json<GroupSummary>>> {
    let (name, cuisine_type) = req.validate()?;
    let admin = require_user(db, caller.0).await?;

    let group = db
        .create_group(
            name,
            optional(&req.description),
            cuisine_type,
            optional(&req.image_url),
            admin.id,
        )
        .await?;
    info!("User {} created group {} ({})", admin.id, group.id, group.name);
    Ok(status::Custom(Status::Created, Json(summary(db, group.id).await?)))
}

#[rocket::put("/<id>", data = "<req>", format = "json")]
async fn update_group(
    db: &State<Database>,
    caller: UserId,
    id: i64,
    req: Json<GroupRequest>,
) -> ApiResult<Json<GroupSummary>> {
    let group = load_group(db, id).await?;
    permissions::check_admin(member_role(db, &group, caller.0).await?, "update the group")?;
    let (name, cuisine_type) = req.validate()?;

    db.update_group(
        id,
        name,
        optional(&req.description),
        cuisine_type,
        optional(&req.image_url),
    )
    .await?;
    info!("User {} updated group {}", caller.0, id);
    Ok(Json(summary(db, id).await?))
}

#[rocket::delete("/<id>?<q..>")]
async fn delete_group(
    db: &State<Database>,
    caller: Option<UserId>,
    id: i64,
    q: DeleteQuery,
) -> ApiResult<status::NoContent> {
    let user_id = q
        .user_id
        .or(caller.map(|c| c.0))
        .ok_or_else(|| ServiceError::Unauthorized("userid header not found".to_string()))?;
    delete_as(db, id, user_id).await?;
    Ok(status::NoContent)
}

#[rocket::post("/<id>/delete")]
async fn delete_group_via_post(db: &State<Database>, caller: UserId, id: i64) -> ApiResult<Status> {
    delete_as(db, id, caller.0).await?;
    Ok(Status::Ok)
}

#[rocket::post("/<id>/join")]
async fn join_group(db: &State<Database>, caller: UserId, id: i64) -> ApiResult<Status> {
    let group = load_group(db, id).await?;
    require_user(db, caller.0).await?;
    permissions::check_join(member_role(db, &group, caller.0).await?)?;

    if !db.add_member(id, caller.0).await? {
        return Err(ServiceError::bad_request("Already a member of this group").into());
    }
    info!("User {} joined group {}", caller.0, id);
    Ok(Status::Ok)
}

#[rocket::post("/<id>/leave")]
async fn leave_group(db: &State<Database>, caller: UserId, id: i64) -> ApiResult<Status> {
    let group = load_group(db, id).await?;
    permissions::check_leave(member_role(db, &group, caller.0).await?)?;

    db.remove_member(id, caller.0).await?;
    info!("User {} left group {}", caller.0, id);
    Ok(Status::Ok)
}

#[rocket::get("/<id>/members")]
async fn list_members(db: &State<Database>, id: i64) -> ApiResult<Json<Vec<GroupMember>>> {
    load_group(db, id).await?;
    Ok(Json(db.list_members(id).await?))
}

#[rocket::get("/<id>/moderators")]
async fn list_moderators(db: &State<Database>, id: i64) -> ApiResult<Json<Vec<GroupMember>>> {
    load_group(db, id).await?;
    Ok(Json(db.list_moderators(id).await?))
}

async fn set_moderator(db: &Database, caller: UserId, id: i64, user_id: i64, flag: bool) -> ServiceResult<()> {
    let group = load_group(db, id).await?;
    let acting = member_role(db, &group, caller.0).await?;
    let target = member_role(db, &group, user_id).await?;
    permissions::check_set_moderator(acting, target, flag)?;

    db.set_moderator(id, user_id, flag).await?;
    info!(
        "User {} set moderator={} for user {} in group {}",
        caller.0, flag, user_id, id
    );
    Ok(())
}

#[rocket::post("/<id>/moderators/<user_id>")]
async fn add_moderator(db: &State<Database>, caller: UserId, id: i64, user_id: i64) -> ApiResult<Status> {
    set_moderator(db, caller, id, user_id, true).await?;
    Ok(Status::Ok)
}

#[rocket::delete("/<id>/moderators/<user_id>")]
async fn remove_moderator(
    db: &State<Database>,
    caller: UserId,
    id: i64,
    user_id: i64,
) -> ApiResult<Status> {
    set_moderator(db, caller, id, user_id, false).await?;
    Ok(Status::Ok)
}

#[rocket::post("/<id>/transfer-ownership", data = "<req>", format = "json")]
async fn transfer_ownership(
    db: &State<Database>,
    caller: UserId,
    id: i64,
    req: Json<TransferRequest>,
) -> ApiResult<Status> {
    let new_admin = req
        .new_admin_id
        .ok_or_else(|| ServiceError::bad_request("newAdminId is required"))?;
    let group = load_group(db, id).await?;
    let current = member_role(db, &group, caller.0).await?;
    let next = member_role(db, &group, new_admin).await?;
    permissions::check_transfer(current, next)?;

    db.transfer_ownership(id, new_admin).await?;
    info!(
        "Group {} ownership transferred from {} to {}",
        id, caller.0, new_admin
    );
    Ok(Status::Ok)
}

#[rocket::get("/search?<q..>")]
async fn search_groups(db: &State<Database>, q: SearchQuery) -> ApiResult<Json<Vec<GroupSummary>>> {
    match q.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(query) => Ok(Json(db.search_groups(query).await?)),
        None => Ok(Json(db.list_groups().await?)),
    }
}

#[rocket::get("/member/<user_id>", rank = 1)]
async fn groups_by_member(db: &State<Database>, user_id: i64) -> ApiResult<Json<Vec<GroupSummary>>> {
    require_user(db, user_id).await?;
    Ok(Json(db.groups_by_member(user_id).await?))
}

#[rocket::get("/admin/<user_id>", rank = 1)]
async fn groups_by_admin(db: &State<Database>, user_id: i64) -> ApiResult<Json<Vec<GroupSummary>>> {
    require_user(db, user_id).await?;
    Ok(Json(db.groups_by_admin(user_id).await?))
}

/// Role check that answers `false` for a missing group.
async fn role_test(db: &Database, id: i64, user_id: i64, test: fn(GroupRole) -> bool) -> ServiceResult<bool> {
    match db.get_group(id).await? {
        Some(group) => Ok(test(member_role(db, &group, user_id).await?)),
        None => Ok(false),
    }
}

#[rocket::get("/<id>/is-member")]
async fn is_member(db: &State<Database>, caller: UserId, id: i64) -> ApiResult<Json<bool>> {
    Ok(Json(role_test(db, id, caller.0, GroupRole::is_member).await?))
}

#[rocket::get("/<id>/is-moderator")]
async fn is_moderator(db: &State<Database>, caller: UserId, id: i64) -> ApiResult<Json<bool>> {
    Ok(Json(role_test(db, id, caller.0, GroupRole::can_moderate).await?))
}

#[rocket::get("/<id>/is-admin")]
async fn is_admin(db: &State<Database>, caller: UserId, id: i64) -> ApiResult<Json<bool>> {
    Ok(Json(role_test(db, id, caller.0, GroupRole::is_admin).await?))
}

#[rocket::delete("/<id>/members/<user_id>")]
async fn remove_member(
    db: &State<Database>,
    caller: UserId,
    id: i64,
    user_id: i64,
) -> ApiResult<Status> {
    let group = load_group(db, id).await?;
    let acting = member_role(db, &group, caller.0).await?;
    let target = member_role(db, &group, user_id).await?;
    if let Err(e) = permissions::check_remove_member(acting, target) {
        warn!(
            "User {} may not remove user {} from group {}: {}",
            caller.0, user_id, id, e
        );
        return Err(e.into());
    }

    db.remove_member(id, user_id).await?;
    info!("User {} removed user {} from group {}", caller.0, user_id, id);
    Ok(Status::Ok)
}
