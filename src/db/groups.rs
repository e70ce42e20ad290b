use crate::db::{contains_pattern, Database};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Error, Executor, FromRow};

#[derive(Clone, FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cuisine_type: String,
    pub image_url: Option<String>,
    pub admin_id: i64,
    pub created: DateTime<Utc>,
}

/// Group row joined with its admin name and member count.
#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cuisine_type: String,
    pub image_url: Option<String>,
    pub admin_id: i64,
    #[serde(rename = "createdAt")]
    pub created: DateTime<Utc>,
    pub admin_name: String,
    pub member_count: i64,
}

#[derive(Clone, FromRow)]
pub struct GroupMembership {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    pub is_moderator: bool,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
    #[serde(rename = "moderator")]
    pub is_moderator: bool,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub group_id: i64,
    pub user_name: String,
    #[serde(rename = "createdAt")]
    pub created: DateTime<Utc>,
}

#[derive(Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDiscussion {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: i64,
    pub group_id: i64,
    pub user_name: String,
    #[serde(rename = "createdAt")]
    pub created: DateTime<Utc>,
}

const SUMMARY_SELECT: &str = "select g.*, u.name as admin_name, \
    (select count(*) from group_memberships m where m.group_id = g.id) as member_count \
    from community_groups g join users u on u.id = g.admin_id";

const MEMBER_SELECT: &str = "select u.id, u.name, u.email, m.joined_at, m.is_moderator \
    from group_memberships m join users u on u.id = m.user_id";

const MESSAGE_SELECT: &str =
    "select gm.*, u.name as user_name from group_messages gm join users u on u.id = gm.user_id";

const DISCUSSION_SELECT: &str =
    "select d.*, u.name as user_name from group_discussions d join users u on u.id = d.user_id";

impl Database {
    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>, Error> {
        sqlx::query_as(&format!("{} order by g.created desc, g.id desc", SUMMARY_SELECT))
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_group(&self, id: i64) -> Result<Option<Group>, Error> {
        sqlx::query_as("select * from community_groups where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_group_summary(&self, id: i64) -> Result<Option<GroupSummary>, Error> {
        sqlx::query_as(&format!("{} where g.id = $1", SUMMARY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Inserts the group and makes `admin_id` its first member, flagged moderator.
    pub async fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        cuisine_type: &str,
        image_url: Option<&str>,
        admin_id: i64,
    ) -> Result<Group, Error> {
        let mut tx = self.pool.begin().await?;
        let group: Group = sqlx::query_as(
            "insert into community_groups(name, description, cuisine_type, image_url, admin_id) \
            values($1, $2, $3, $4, $5) returning *",
        )
        .bind(name)
        .bind(description)
        .bind(cuisine_type)
        .bind(image_url)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.execute(
            sqlx::query(
                "insert into group_memberships(group_id, user_id, is_moderator) values($1, $2, true)",
            )
            .bind(group.id)
            .bind(admin_id),
        )
        .await?;
        tx.commit().await?;
        Ok(group)
    }

    pub async fn update_group(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
        cuisine_type: &str,
        image_url: Option<&str>,
    ) -> Result<Group, Error> {
        sqlx::query_as(
            "update community_groups set name = $2, description = $3, cuisine_type = $4, image_url = $5 \
            where id = $1 returning *",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(cuisine_type)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_group(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from community_groups where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn search_groups(&self, query: &str) -> Result<Vec<GroupSummary>, Error> {
        sqlx::query_as(&format!(
            "{} where g.name ilike $1 or lower(g.cuisine_type) = lower($2) \
            order by g.created desc, g.id desc",
            SUMMARY_SELECT
        ))
        .bind(contains_pattern(query))
        .bind(query)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn groups_by_member(&self, user_id: i64) -> Result<Vec<GroupSummary>, Error> {
        sqlx::query_as(&format!(
            "{} where exists(select 1 from group_memberships m \
            where m.group_id = g.id and m.user_id = $1) \
            order by g.created desc, g.id desc",
            SUMMARY_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn groups_by_admin(&self, user_id: i64) -> Result<Vec<GroupSummary>, Error> {
        sqlx::query_as(&format!(
            "{} where g.admin_id = $1 order by g.created desc, g.id desc",
            SUMMARY_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_membership(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMembership>, Error> {
        sqlx::query_as("select * from group_memberships where group_id = $1 and user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Returns false when the user was already a member.
    pub async fn add_member(&self, group_id: i64, user_id: i64) -> Result<bool, Error> {
        let res = sqlx::query(
            "insert into group_memberships(group_id, user_id) values($1, $2) \
            on conflict (group_id, user_id) do nothing",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from group_memberships where group_id = $1 and user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_moderator(
        &self,
        group_id: i64,
        user_id: i64,
        moderator: bool,
    ) -> Result<bool, Error> {
        let res = sqlx::query(
            "update group_memberships set is_moderator = $3 where group_id = $1 and user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(moderator)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Moves the admin role to `new_admin_id` and flags them moderator.
    pub async fn transfer_ownership(&self, group_id: i64, new_admin_id: i64) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        tx.execute(
            sqlx::query("update community_groups set admin_id = $2 where id = $1")
                .bind(group_id)
                .bind(new_admin_id),
        )
        .await?;
        tx.execute(
            sqlx::query(
                "update group_memberships set is_moderator = true where group_id = $1 and user_id = $2",
            )
            .bind(group_id)
            .bind(new_admin_id),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_members(&self, group_id: i64) -> Result<Vec<GroupMember>, Error> {
        sqlx::query_as(&format!(
            "{} where m.group_id = $1 order by m.joined_at, m.id",
            MEMBER_SELECT
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_moderators(&self, group_id: i64) -> Result<Vec<GroupMember>, Error> {
        sqlx::query_as(&format!(
            "{} where m.group_id = $1 and m.is_moderator order by m.joined_at, m.id",
            MEMBER_SELECT
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_messages(&self, group_id: i64) -> Result<Vec<GroupMessage>, Error> {
        sqlx::query_as(&format!(
            "{} where gm.group_id = $1 order by gm.created desc, gm.id desc",
            MESSAGE_SELECT
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_message(&self, id: i64) -> Result<Option<GroupMessage>, Error> {
        sqlx::query_as(&format!("{} where gm.id = $1", MESSAGE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn add_message(
        &self,
        group_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<GroupMessage, Error> {
        sqlx::query_as(
            "with gm as (insert into group_messages(group_id, user_id, content) values($1, $2, $3) returning *) \
            select gm.*, u.name as user_name from gm join users u on u.id = gm.user_id",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_message(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from group_messages where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_discussions(&self, group_id: i64) -> Result<Vec<GroupDiscussion>, Error> {
        sqlx::query_as(&format!(
            "{} where d.group_id = $1 order by d.created desc, d.id desc",
            DISCUSSION_SELECT
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_discussion(&self, id: i64) -> Result<Option<GroupDiscussion>, Error> {
        sqlx::query_as(&format!("{} where d.id = $1", DISCUSSION_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn add_discussion(
        &self,
        group_id: i64,
        user_id: i64,
        title: &str,
        content: &str,
    ) -> Result<GroupDiscussion, Error> {
        sqlx::query_as(
            "with d as (insert into group_discussions(group_id, user_id, title, content) \
            values($1, $2, $3, $4) returning *) \
            select d.*, u.name as user_name from d join users u on u.id = d.user_id",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_discussion(
        &self,
        id: i64,
        title: &str,
        content: &str,
    ) -> Result<GroupDiscussion, Error> {
        sqlx::query_as(
            "with d as (update group_discussions set title = $2, content = $3 where id = $1 returning *) \
            select d.*, u.name as user_name from d join users u on u.id = d.user_id",
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn delete_discussion(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("delete from group_discussions where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn search_discussions(
        &self,
        group_id: i64,
        keyword: &str,
    ) -> Result<Vec<GroupDiscussion>, Error> {
        sqlx::query_as(&format!(
            "{} where d.group_id = $1 and d.title ilike $2 order by d.created desc, d.id desc",
            DISCUSSION_SELECT
        ))
        .bind(group_id)
        .bind(contains_pattern(keyword))
        .fetch_all(&self.pool)
        .await
    }
}
