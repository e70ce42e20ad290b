use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error;

mod groups;
mod posts;
mod recipes;
mod users;

pub use groups::{Group, GroupDiscussion, GroupMember, GroupMembership, GroupMessage, GroupSummary};
pub use posts::{Comment, Like, Post, PostWithAuthor};
pub use recipes::{Recipe, RecipeComment, RecipeFields, RecipeFilter, RecipeWithAuthor};
pub use users::User;

#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(conn: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(conn)
            .await?;
        Ok(Self { pool })
    }

    /// Pool that only connects on first use.
    pub fn new_lazy(conn: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(conn)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./migrations/").run(&self.pool).await
    }
}

/// `%term%` for ILIKE, with LIKE wildcards in `term` escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
