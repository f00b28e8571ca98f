use crate::entities::users::UserId;
use crate::framework::{DatabaseError, DatabaseProcessor};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Task {
    #[sqlx(rename = "task_id")]
    pub id: TaskId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub completed: bool,
}

/// Data for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
}

impl NewTask {
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            owner_id: self.owner_id,
            name: self.name,
            description: self.description,
            due_date: self.due_date,
            completed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertTask {
    pub task: Task,
}

impl Processor<InsertTask> for DatabaseProcessor {
    type Output = ();
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertTask")]
    async fn process(&self, insert: InsertTask) -> Result<(), DatabaseError> {
        let InsertTask { task } = insert;
        let mut conn = self.acquire().await?;
        sqlx::query(
            r#"
            INSERT INTO tasks
                (task_id, owner_id, name, description, due_date, completed)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(task.id)
        .bind(task.owner_id)
        .bind(task.name)
        .bind(task.description)
        .bind(task.due_date)
        .bind(task.completed)
        .execute(conn.executor()?)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetTaskById {
    pub task_id: TaskId,
}

impl Processor<GetTaskById> for DatabaseProcessor {
    type Output = Option<Task>;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:GetTaskById")]
    async fn process(&self, query: GetTaskById) -> Result<Option<Task>, DatabaseError> {
        let mut conn = self.acquire().await?;
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT task_id, owner_id, name, description, due_date, completed
            FROM tasks
            WHERE task_id = $1
            "#,
        )
        .bind(query.task_id)
        .fetch_optional(conn.executor()?)
        .await?;
        Ok(task)
    }
}

#[derive(Debug, Clone)]
/// Delete a single task. Returns the number of rows deleted.
pub struct DeleteTask {
    pub task_id: TaskId,
}

impl Processor<DeleteTask> for DatabaseProcessor {
    type Output = u64;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteTask")]
    async fn process(&self, cmd: DeleteTask) -> Result<u64, DatabaseError> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = $1")
            .bind(cmd.task_id)
            .execute(conn.executor()?)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Delete every task owned by a user. Returns the number of rows deleted.
pub struct DeleteTasksByOwner {
    pub owner_id: UserId,
}

impl Processor<DeleteTasksByOwner> for DatabaseProcessor {
    type Output = u64;
    type Error = DatabaseError;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteTasksByOwner")]
    async fn process(&self, cmd: DeleteTasksByOwner) -> Result<u64, DatabaseError> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query("DELETE FROM tasks WHERE owner_id = $1")
            .bind(cmd.owner_id)
            .execute(conn.executor()?)
            .await?;
        Ok(result.rows_affected())
    }
}
