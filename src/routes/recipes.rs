use crate::auth::UserId;
use crate::db::{Database, RecipeComment, RecipeFields, RecipeFilter, RecipeWithAuthor};
use crate::error::{ApiError, ApiResult, ServiceError, ServiceResult};
use crate::routes::{
    check_length, require_user, required, MAX_CUISINE_LENGTH, MAX_NAME_LENGTH, MAX_URL_LENGTH,
};
use log::{info, warn};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{routes, FromForm, Route, State};

pub const MAX_INSTRUCTIONS_LENGTH: usize = 2000;
pub const MAX_COMMENT_LENGTH: usize = 1000;
const LATEST_LIMIT: i64 = 10;

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: RecipeWithAuthor,
    pub comments: Vec<RecipeComment>,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NewRecipeComment {
    #[serde(default)]
    pub content: String,
}

#[derive(FromForm)]
pub struct RecipeSearch {
    pub query: Option<String>,
    pub ingredient: Option<String>,
    pub cuisine: Option<String>,
    #[field(name = "dietaryPreference")]
    pub dietary_preference: Option<String>,
}

pub fn recipe_routes() -> Vec<Route> {
    routes![
        list_recipes,
        get_recipe,
        recipes_by_user,
        latest_recipes,
        search_recipes,
        create_recipe,
        update_recipe,
        delete_recipe,
        add_comment,
        list_comments
    ]
}

/// Normalizes client input: trims text, drops blank list entries.
fn clean_fields(mut fields: RecipeFields) -> ServiceResult<RecipeFields> {
    fields.title = required(&fields.title, "title")?.to_string();
    check_length(&fields.title, "title", MAX_NAME_LENGTH)?;
    fields.instructions = fields.instructions.trim().to_string();
    check_length(&fields.instructions, "instructions", MAX_INSTRUCTIONS_LENGTH)?;

    let tidy = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    fields.ingredients = tidy(fields.ingredients);
    fields.dietary_preferences = tidy(fields.dietary_preferences);
    fields.cuisine = fields
        .cuisine
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(cuisine) = &fields.cuisine {
        check_length(cuisine, "cuisine", MAX_CUISINE_LENGTH)?;
    }
    fields.image_url = fields
        .image_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());
    if let Some(url) = &fields.image_url {
        check_length(url, "imageUrl", MAX_URL_LENGTH)?;
    }

    for (n, name) in [
        (fields.prep_time_minutes, "prepTimeMinutes"),
        (fields.cook_time_minutes, "cookTimeMinutes"),
        (fields.servings, "servings"),
    ] {
        if n.is_some_and(|v| v < 0) {
            return Err(ServiceError::bad_request(format!("{} cannot be negative", name)));
        }
    }
    Ok(fields)
}

async fn owned_recipe(db: &Database, id: i64, caller: UserId) -> ServiceResult<RecipeWithAuthor> {
    let recipe = db.get_recipe(id).await?.ok_or(ServiceError::NotFound("Recipe"))?;
    if recipe.recipe.user_id != caller.0 {
        warn!("User {} tried to modify recipe {}", caller.0, id);
        return Err(ServiceError::forbidden("Only the owner can modify this recipe"));
    }
    Ok(recipe)
}

#[rocket::get("/")]
async fn list_recipes(db: &State<Database>) -> ApiResult<Json<Vec<RecipeWithAuthor>>> {
    Ok(Json(db.search_recipes(&RecipeFilter::All).await?))
}

#[rocket::get("/<id>")]
async fn get_recipe(db: &State<Database>, id: i64) -> ApiResult<Json<RecipeDetail>> {
    let recipe = db.get_recipe(id).await?.ok_or(ServiceError::NotFound("Recipe"))?;
    let comments = db.list_recipe_comments(id).await?;
    Ok(Json(RecipeDetail { recipe, comments }))
}

#[rocket::get("/user/<user_id>", rank = 1)]
async fn recipes_by_user(
    db: &State<Database>,
    user_id: i64,
) -> ApiResult<Json<Vec<RecipeWithAuthor>>> {
    require_user(db, user_id).await?;
    Ok(Json(db.list_recipes_by_user(user_id).await?))
}

#[rocket::get("/latest")]
async fn latest_recipes(db: &State<Database>) -> ApiResult<Json<Vec<RecipeWithAuthor>>> {
    Ok(Json(db.latest_recipes(LATEST_LIMIT).await?))
}

#[rocket::get("/search?<q..>")]
async fn search_recipes(
    db: &State<Database>,
    q: RecipeSearch,
) -> ApiResult<Json<Vec<RecipeWithAuthor>>> {
    let filter = RecipeFilter::from_params(
        q.query.as_deref(),
        q.ingredient.as_deref(),
        q.cuisine.as_deref(),
        q.dietary_preference.as_deref(),
    );
    Ok(Json(db.search_recipes(&filter).await?))
}

#[rocket::post("/", data = "<req>", format = "json")]
async fn create_recipe(
    db: &State<Database>,
    caller: UserId,
    req: Json<RecipeFields>,
) -> ApiResult<status::Custom<Json<RecipeWithAuthor>>> {
    if db.get_user(caller.0).await?.is_none() {
        return Err(ApiError::new(Status::Unauthorized, "Unknown user"));
    }
    let fields = clean_fields(req.into_inner())?;
    let recipe = db.add_recipe(caller.0, &fields).await?;
    info!("User {} created recipe {}", caller.0, recipe.recipe.id);
    Ok(status::Custom(Status::Created, Json(recipe)))
}

#[rocket::put("/<id>", data = "<req>", format = "json")]
async fn update_recipe(
    db: &State<Database>,
    caller: UserId,
    id: i64,
    req: Json<RecipeFields>,
) -> ApiResult<Json<RecipeWithAuthor>> {
    owned_recipe(db, id, caller).await?;
    let fields = clean_fields(req.into_inner())?;
    let recipe = db.update_recipe(id, &fields).await?;
    info!("User {} updated recipe {}", caller.0, id);
    Ok(Json(recipe))
}

#[rocket::delete("/<id>")]
async fn delete_recipe(
    db: &State<Database>,
    caller: UserId,
    id: i64,
) -> ApiResult<status::NoContent> {
    owned_recipe(db, id, caller).await?;
    db.delete_recipe(id).await?;
    info!("User {} deleted recipe {}", caller.0, id);
    Ok(status::NoContent)
}

#[rocket::post("/<id>/comments", data = "<req>", format = "json")]
async fn add_comment(
    db: &State<Database>,
    caller: UserId,
    id: i64,
    req: Json<NewRecipeComment>,
) -> ApiResult<status::Custom<Json<RecipeComment>>> {
    let content = required(&req.content, "content")?;
    check_length(content, "content", MAX_COMMENT_LENGTH)?;
    if !db.recipe_exists(id).await? {
        return Err(ServiceError::NotFound("Recipe").into());
    }
    require_user(db, caller.0).await?;

    let comment = db.add_recipe_comment(id, caller.0, content).await?;
    info!("User {} commented on recipe {}", caller.0, id);
    Ok(status::Custom(Status::Created, Json(comment)))
}

#[rocket::get("/<id>/comments")]
async fn list_comments(db: &State<Database>, id: i64) -> ApiResult<Json<Vec<RecipeComment>>> {
    if !db.recipe_exists(id).await? {
        return Err(ServiceError::NotFound("Recipe").into());
    }
    Ok(Json(db.list_recipe_comments(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_recipe_fields() {
        let fields = RecipeFields {
            title: "  Shakshuka ".to_string(),
            ingredients: vec!["eggs".into(), " ".into(), " tomato ".into()],
            cuisine: Some("  ".to_string()),
            servings: Some(2),
            ..Default::default()
        };
        let clean = clean_fields(fields).unwrap();
        assert_eq!(clean.title, "Shakshuka");
        assert_eq!(clean.ingredients, vec!["eggs", "tomato"]);
        assert_eq!(clean.cuisine, None);
        assert_eq!(clean.servings, Some(2));
    }

    #[test]
    fn rejects_bad_recipes() {
        assert!(clean_fields(RecipeFields::default()).is_err());

        let long = RecipeFields {
            title: "Stew".to_string(),
            instructions: "x".repeat(MAX_INSTRUCTIONS_LENGTH + 1),
            ..Default::default()
        };
        assert!(matches!(clean_fields(long), Err(ServiceError::BadRequest(_))));

        let negative = RecipeFields {
            title: "Stew".to_string(),
            cook_time_minutes: Some(-5),
            ..Default::default()
        };
        assert!(clean_fields(negative).is_err());

        let wide_title = RecipeFields {
            title: "t".repeat(MAX_NAME_LENGTH + 1),
            ..Default::default()
        };
        assert!(matches!(clean_fields(wide_title), Err(ServiceError::BadRequest(_))));

        let wide_cuisine = RecipeFields {
            title: "Stew".to_string(),
            cuisine: Some("c".repeat(MAX_CUISINE_LENGTH + 1)),
            ..Default::default()
        };
        assert!(clean_fields(wide_cuisine).is_err());
    }
}
