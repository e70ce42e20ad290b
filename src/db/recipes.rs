use crate::db::{contains_pattern, Database};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Error, FromRow, Postgres, QueryBuilder};

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub instructions: String,
    pub image_url: Option<String>,
    pub ingredients: Vec<String>,
    pub cuisine: Option<String>,
    pub dietary_preferences: Vec<String>,
    pub prep_time_minutes: Option<i32>,
    pub cook_time_minutes: Option<i32>,
    pub servings: Option<i32>,
    pub user_id: i64,
    #[serde(rename = "createdAt")]
    pub created: DateTime<Utc>,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeWithAuthor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub recipe: Recipe,
    pub user_name: String,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeComment {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub user_name: String,
    pub recipe_id: i64,
    #[serde(rename = "createdAt")]
    pub created: DateTime<Utc>,
}

/// Writable recipe fields, as sent by clients.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeFields {
    pub title: String,
    pub instructions: String,
    pub image_url: Option<String>,
    pub ingredients: Vec<String>,
    pub cuisine: Option<String>,
    pub dietary_preferences: Vec<String>,
    pub prep_time_minutes: Option<i32>,
    pub cook_time_minutes: Option<i32>,
    pub servings: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipeFilter {
    All,
    /// Title or cuisine contains the text
    Text(String),
    Ingredient(String),
    Cuisine(String),
    DietaryPreference(String),
}

impl RecipeFilter {
    /// The first non-empty parameter wins, in argument order.
    pub fn from_params(
        query: Option<&str>,
        ingredient: Option<&str>,
        cuisine: Option<&str>,
        dietary_preference: Option<&str>,
    ) -> Self {
        let pick = |v: Option<&str>| v.filter(|s| !s.trim().is_empty()).map(|s| s.trim().to_string());
        if let Some(q) = pick(query) {
            RecipeFilter::Text(q)
        } else if let Some(i) = pick(ingredient) {
            RecipeFilter::Ingredient(i)
        } else if let Some(c) = pick(cuisine) {
            RecipeFilter::Cuisine(c)
        } else if let Some(d) = pick(dietary_preference) {
            RecipeFilter::DietaryPreference(d)
        } else {
            RecipeFilter::All
        }
    }

    fn push_where(&self, q: &mut QueryBuilder<'_, Postgres>) {
        match self {
            RecipeFilter::All => {}
            RecipeFilter::Text(t) => {
                let pattern = contains_pattern(t);
                q.push(" where r.title ilike ");
                q.push_bind(pattern.clone());
                q.push(" or r.cuisine ilike ");
                q.push_bind(pattern);
            }
            RecipeFilter::Ingredient(i) => {
                q.push(" where exists(select 1 from unnest(r.ingredients) i where i ilike ");
                q.push_bind(contains_pattern(i));
                q.push(")");
            }
            RecipeFilter::Cuisine(c) => {
                q.push(" where r.cuisine ilike ");
                q.push_bind(contains_pattern(c));
            }
            RecipeFilter::DietaryPreference(d) => {
                q.push(" where exists(select 1 from unnest(r.dietary_preferences) d where d ilike ");
                q.push_bind(contains_pattern(d));
                q.push(")");
            }
        }
    }
}

const RECIPE_SELECT: &str =
    "select r.*, u.name as user_name from recipes r join users u on u.id = r.user_id";

impl Database {
    pub async fn get_recipe(&self, id: i64) -> Result<Option<RecipeWithAuthor>, Error> {
        sqlx::query_as(&format!("{} where r.id = $1", RECIPE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn recipe_exists(&self, id: i64) -> Result<bool, Error> {
        sqlx::query_scalar("select exists(select 1 from recipes where id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn search_recipes(&self, filter: &RecipeFilter) -> Result<Vec<RecipeWithAuthor>, Error> {
        let mut q = QueryBuilder::new(RECIPE_SELECT);
        filter.push_where(&mut q);
        q.push(" order by r.created desc, r.id desc");
        q.build_query_as().fetch_all(&self.pool).await
    }

    pub async fn list_recipes_by_user(&self, user_id: i64) -> Result<Vec<RecipeWithAuthor>, Error> {
        sqlx::query_as(&format!(
            "{} where r.user_id = $1 order by r.created desc, r.id desc",
            RECIPE_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn latest_recipes(&self, limit: i64) -> Result<Vec<RecipeWithAuthor>, Error> {
        let mut q = QueryBuilder::new(RECIPE_SELECT);
        q.push(" order by r.created desc, r.id desc limit ");
        q.push_bind(limit);
        q.build_query_as().fetch_all(&self.pool).await
    }

    pub async fn add_recipe(
        &self,
        user_id: i64,
        fields: &RecipeFields,
    ) -> Result<RecipeWithAuthor, Error> {
        sqlx::query_as(
            "with r as (insert into recipes(title, instructions, image_url, ingredients, cuisine, \
            dietary_preferences, prep_time_minutes, cook_time_minutes, servings, user_id) \
            values($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) returning *) \
            select r.*, u.name as user_name from r join users u on u.id = r.user_id",
        )
        .bind(&fields.title)
        .bind(&fields.instructions)
        .bind(&fields.image_url)
        .bind(&fields.ingredients)
        .bind(&fields.cuisine)
        .bind(&fields.dietary_preferences)
        .bind(fields.prep_time_minutes)
        .bind(fields.cook_time_minutes)
        .bind(fields.servings)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_recipe(
        &self,
        id: i64,
        fields: &RecipeFields,
    ) -> Result<RecipeWithAuthor, Error> {
        sqlx::query_as(
            "with r as (update recipes set title = $2, instructions = $3, image_url = $4, \
            ingredients = $5, cuisine = $6, dietary_preferences = $7, prep_time_minutes = $8, \
            cook_time_minutes = $9, servings = $10 where id = $1 returning *) \
            select r.*, u.name as user_name from r join users u on u.id = r.user_id",
        )
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.instructions)
        .bind(&fields.image_url)
        .bind(&fields.ingredients)
        .bind(&fields.cuisine)
        .bind(&fields.dietary_preferences)
        .bind(fields.prep_time_minutes)
        .bind(fields.cook_time_minutes)
        .bind(fields.servings)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_recipe(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from recipes where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn add_recipe_comment(
        &self,
        recipe_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<RecipeComment, Error> {
        sqlx::query_as(
            "with c as (insert into recipe_comments(recipe_id, user_id, content) values($1, $2, $3) returning *) \
            select c.*, u.name as user_name from c join users u on u.id = c.user_id",
        )
        .bind(recipe_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
    }

    /// Newest first.
    pub async fn list_recipe_comments(&self, recipe_id: i64) -> Result<Vec<RecipeComment>, Error> {
        sqlx::query_as(
            "select c.*, u.name as user_name from recipe_comments c join users u on u.id = c.user_id \
            where c.recipe_id = $1 order by c.created desc, c.id desc",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
    }
}
