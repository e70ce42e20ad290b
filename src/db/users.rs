use crate::auth::password::PasswordHash;
use crate::db::Database;
use chrono::{DateTime, Utc};
use sqlx::{Error, FromRow};

#[derive(Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub created: DateTime<Utc>,
}

impl User {
    pub fn check_password(&self, password: &str) -> bool {
        crate::auth::password::verify_password(password, &self.password_salt, &self.password_hash)
    }
}

impl Database {
    pub async fn add_user(
        &self,
        name: &str,
        email: &str,
        password: &PasswordHash,
    ) -> Result<User, Error> {
        sqlx::query_as(
            "insert into users(name, email, password_hash, password_salt) \
            values($1, $2, $3, $4) returning *",
        )
        .bind(name)
        .bind(email)
        .bind(&password.hash)
        .bind(&password.salt)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, Error> {
        sqlx::query_as("select * from users where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        sqlx::query_as("select * from users where lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, Error> {
        sqlx::query_as("select * from users order by id")
            .fetch_all(&self.pool)
            .await
    }

    /// Password is only replaced when `password` is set.
    pub async fn update_user(
        &self,
        id: i64,
        name: &str,
        email: &str,
        password: Option<&PasswordHash>,
    ) -> Result<Option<User>, Error> {
        sqlx::query_as(
            "update users set name = $2, email = $3, \
            password_hash = coalesce($4, password_hash), \
            password_salt = coalesce($5, password_salt) \
            where id = $1 returning *",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(password.map(|p| p.hash.as_str()))
        .bind(password.map(|p| p.salt.as_str()))
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_user(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from users where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
