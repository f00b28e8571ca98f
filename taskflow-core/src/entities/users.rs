use crate::framework::{DatabaseError, DatabaseProcessor};
use kanau::processor::Processor;
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    #[sqlx(rename = "user_id")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Already hashed by the caller; never interpreted here.
    pub password_hash: String,
}

/// Data for signing up a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            password_hash: self.password_hash,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertUser {
    pub user: User,
}

impl Processor<InsertUser> for DatabaseProcessor {
    type Output = ();
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertUser")]
    async fn process(&self, insert: InsertUser) -> Result<(), DatabaseError> {
        let InsertUser { user } = insert;
        let mut conn = self.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO users
                (user_id, username, email, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password_hash)
        .execute(conn.executor()?)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetUserById {
    pub user_id: UserId,
}

impl Processor<GetUserById> for DatabaseProcessor {
    type Output = Option<User>;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUserById")]
    async fn process(&self, query: GetUserById) -> Result<Option<User>, DatabaseError> {
        let mut conn = self.acquire().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, email, first_name, last_name, password_hash
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(query.user_id)
        .fetch_optional(conn.executor()?)
        .await?;
        Ok(user)
    }
}

/// Which unique user attribute to look up.
#[derive(Debug, Clone)]
pub enum UserLookup {
    Id(UserId),
    Username(String),
    Email(String),
}

#[derive(Debug, Clone)]
pub struct UserExists {
    pub lookup: UserLookup,
}

impl Processor<UserExists> for DatabaseProcessor {
    type Output = bool;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:UserExists")]
    async fn process(&self, query: UserExists) -> Result<bool, DatabaseError> {
        let mut conn = self.acquire().await?;
        let exists = match query.lookup {
            UserLookup::Id(id) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM users WHERE user_id = $1)",
                )
                .bind(id)
                .fetch_one(conn.executor()?)
                .await?
            }
            UserLookup::Username(username) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
                )
                .bind(username)
                .fetch_one(conn.executor()?)
                .await?
            }
            UserLookup::Email(email) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))",
                )
                .bind(email)
                .fetch_one(conn.executor()?)
                .await?
            }
        };
        Ok(exists)
    }
}

#[derive(Debug, Clone)]
/// Delete a user. Returns the number of rows deleted.
pub struct DeleteUser {
    pub user_id: UserId,
}

impl Processor<DeleteUser> for DatabaseProcessor {
    type Output = u64;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteUser")]
    async fn process(&self, cmd: DeleteUser) -> Result<u64, DatabaseError> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(cmd.user_id)
            .execute(conn.executor()?)
            .await?;
        Ok(result.rows_affected())
    }
}
