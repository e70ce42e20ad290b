use crate::db::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Error, Executor, FromRow};

#[derive(Clone, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Media name of the attached image
    pub image: Option<String>,
    /// Media name of the attached video
    pub video: Option<String>,
    pub user_id: i64,
    pub created: DateTime<Utc>,
}

#[derive(Clone, FromRow)]
pub struct PostWithAuthor {
    #[sqlx(flatten)]
    pub post: Post,
    pub user_name: String,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub created: DateTime<Utc>,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub created: DateTime<Utc>,
}

const POST_SELECT: &str =
    "select p.*, u.name as user_name from posts p join users u on u.id = p.user_id";

const COMMENT_SELECT: &str =
    "select c.*, u.name as user_name from comments c join users u on u.id = c.user_id";

impl Database {
    pub async fn add_post(
        &self,
        title: &str,
        description: &str,
        image: Option<&str>,
        video: Option<&str>,
        user_id: i64,
    ) -> Result<Post, Error> {
        sqlx::query_as(
            "insert into posts(title, description, image, video, user_id) \
            values($1, $2, $3, $4, $5) returning *",
        )
        .bind(title)
        .bind(description)
        .bind(image)
        .bind(video)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_post(&self, id: i64) -> Result<Option<PostWithAuthor>, Error> {
        sqlx::query_as(&format!("{} where p.id = $1", POST_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn post_exists(&self, id: i64) -> Result<bool, Error> {
        sqlx::query_scalar("select exists(select 1 from posts where id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn list_posts(&self) -> Result<Vec<PostWithAuthor>, Error> {
        sqlx::query_as(&format!("{} order by p.created desc, p.id desc", POST_SELECT))
            .fetch_all(&self.pool)
            .await
    }

    pub async fn list_posts_by_user(&self, user_id: i64) -> Result<Vec<PostWithAuthor>, Error> {
        sqlx::query_as(&format!(
            "{} where p.user_id = $1 order by p.created desc, p.id desc",
            POST_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn update_post(
        &self,
        id: i64,
        title: &str,
        description: &str,
        image: Option<&str>,
        video: Option<&str>,
    ) -> Result<Post, Error> {
        sqlx::query_as(
            "update posts set title = $2, description = $3, image = $4, video = $5 \
            where id = $1 returning *",
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(image)
        .bind(video)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_post(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from posts where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Number of posts still pointing at the blob with hex hash `id`, whatever
    /// extension their media name carries.
    pub async fn count_media_references(&self, id: &str) -> Result<i64, Error> {
        sqlx::query_scalar(
            "select count(*) from posts \
            where split_part(image, '.', 1) = $1 or split_part(video, '.', 1) = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    /// Hex hashes of every blob referenced by some post.
    pub async fn list_media_ids(&self) -> Result<Vec<String>, Error> {
        sqlx::query_scalar(
            "select split_part(image, '.', 1) from posts where image is not null \
            union select split_part(video, '.', 1) from posts where video is not null",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn add_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<Comment, Error> {
        sqlx::query_as(
            "with c as (insert into comments(post_id, user_id, content) values($1, $2, $3) returning *) \
            select c.*, u.name as user_name from c join users u on u.id = c.user_id",
        )
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_comment(&self, id: i64) -> Result<Option<Comment>, Error> {
        sqlx::query_as(&format!("{} where c.id = $1", COMMENT_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, Error> {
        sqlx::query_as(&format!(
            "{} where c.post_id = $1 order by c.created, c.id",
            COMMENT_SELECT
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn update_comment(&self, id: i64, content: &str) -> Result<Comment, Error> {
        sqlx::query_as(
            "with c as (update comments set content = $2 where id = $1 returning *) \
            select c.*, u.name as user_name from c join users u on u.id = c.user_id",
        )
        .bind(id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from comments where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_comments(&self, post_id: i64) -> Result<i64, Error> {
        sqlx::query_scalar("select count(*) from comments where post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Flips the like of `user_id` on `post_id`, returns true when the post is now liked.
    pub async fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;
        let removed = tx
            .execute(
                sqlx::query("delete from likes where post_id = $1 and user_id = $2")
                    .bind(post_id)
                    .bind(user_id),
            )
            .await?
            .rows_affected();

        if removed == 0 {
            tx.execute(
                sqlx::query(
                    "insert into likes(post_id, user_id) values($1, $2) \
                    on conflict (post_id, user_id) do nothing",
                )
                .bind(post_id)
                .bind(user_id),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(removed == 0)
    }

    pub async fn has_liked(&self, post_id: i64, user_id: i64) -> Result<bool, Error> {
        sqlx::query_scalar(
            "select exists(select 1 from likes where post_id = $1 and user_id = $2)",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn count_likes(&self, post_id: i64) -> Result<i64, Error> {
        sqlx::query_scalar("select count(*) from likes where post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn list_likes(&self, post_id: i64) -> Result<Vec<Like>, Error> {
        sqlx::query_as(
            "select l.*, u.name as user_name from likes l join users u on u.id = l.user_id \
            where l.post_id = $1 order by l.created, l.id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
    }
}
