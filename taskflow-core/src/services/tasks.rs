use super::outbox_event;
use crate::entities::tasks::{NewTask, Task, TaskId};
use crate::error::{CoreError, DomainError};
use crate::events::{TaskCreated, TaskCreatedEvent, TaskDeleted, TaskDeletedEvent};
use crate::store::{
    OutboxRepository, TaskRepository, UnitOfWork, UnitOfWorkCapable, UnitOfWorkFactory,
    UserRepository,
};
use tracing::info;

pub struct TaskService<F, U, T, O> {
    factory: F,
    users: U,
    tasks: T,
    outbox: O,
}

impl<F, U, T, O> TaskService<F, U, T, O>
where
    F: UnitOfWorkFactory,
    U: UserRepository + UnitOfWorkCapable<F::UnitOfWork>,
    T: TaskRepository + UnitOfWorkCapable<F::UnitOfWork>,
    O: OutboxRepository + UnitOfWorkCapable<F::UnitOfWork>,
{
    pub fn new(factory: F, users: U, tasks: T, outbox: O) -> Self {
        Self {
            factory,
            users,
            tasks,
            outbox,
        }
    }

    /// Fails with `NotFound` if the owner does not exist.
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task, CoreError> {
        let task = new_task.into_task(self.tasks.next_identity());
        let message = outbox_event::<TaskCreated>(
            &self.outbox,
            &TaskCreatedEvent {
                id: task.id,
                owner_id: task.owner_id,
                name: task.name.clone(),
                due_date: task.due_date,
            },
        )?;

        self.factory
            .create_under_scope(|uow| {
                let users = self.users.for_unit_of_work(&uow);
                let tasks = self.tasks.for_unit_of_work(&uow);
                let outbox = self.outbox.for_unit_of_work(&uow);
                let task = task.clone();
                async move {
                    if !users.exists_by_id(task.owner_id).await? {
                        return Err(CoreError::from(DomainError::not_found("Users")));
                    }
                    tasks.add_task(task).await?;
                    outbox.add_outbox_message(message).await?;
                    uow.commit().await
                }
            })
            .await?;

        info!(task_id = %task.id, owner_id = %task.owner_id, "Task created");
        Ok(task)
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), CoreError> {
        self.factory
            .create_under_scope(|uow| {
                let tasks = self.tasks.for_unit_of_work(&uow);
                let outbox = self.outbox.for_unit_of_work(&uow);
                async move {
                    let task = tasks.find_task_by_id(id).await?;
                    tasks.remove_task_by_id(id).await?;
                    let message = outbox_event::<TaskDeleted>(
                        &outbox,
                        &TaskDeletedEvent {
                            id: task.id,
                            owner_id: task.owner_id,
                        },
                    )?;
                    outbox.add_outbox_message(message).await?;
                    uow.commit().await
                }
            })
            .await?;

        info!(task_id = %id, "Task deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::User;
    use crate::store::memory::{
        MemoryOutboxRepository, MemoryStore, MemoryTaskRepository, MemoryUserRepository,
    };
    use time::macros::datetime;
    use uuid::Uuid;

    type Service =
        TaskService<MemoryStore, MemoryUserRepository, MemoryTaskRepository, MemoryOutboxRepository>;

    fn service(store: &MemoryStore) -> Service {
        TaskService::new(
            store.clone(),
            store.user_repository(),
            store.task_repository(),
            store.outbox_repository(),
        )
    }

    async fn owner(store: &MemoryStore) -> User {
        let user = User {
            id: Uuid::now_v7(),
            username: "grace".to_string(),
            email: "grace@example.com".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            password_hash: "hash".to_string(),
        };
        store.user_repository().add_user(user.clone()).await.unwrap();
        user
    }

    #[tokio::test]
    async fn create_then_delete_records_both_events_in_order() {
        let store = MemoryStore::new();
        let owner = owner(&store).await;
        let service = service(&store);

        let task = service
            .create_task(NewTask {
                owner_id: owner.id,
                name: "Compile report".to_string(),
                description: Some("Q3".to_string()),
                due_date: Some(datetime!(2026-12-01 17:00 UTC)),
            })
            .await
            .unwrap();
        assert_eq!(store.tasks(), vec![task.clone()]);

        service.delete_task(task.id).await.unwrap();
        assert!(store.tasks().is_empty());

        let outbox = store.outbox_messages();
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0].operational_channel, "taskCreated");
        assert_eq!(outbox[1].operational_channel, "taskDeleted");
        assert!(outbox.iter().all(|m| m.operational_domain == "tasks"));

        let created: TaskCreatedEvent = serde_json::from_str(&outbox[0].payload).unwrap();
        assert_eq!(created.due_date, task.due_date);
    }

    #[tokio::test]
    async fn create_for_missing_owner_is_not_found() {
        let store = MemoryStore::new();
        let err = service(&store)
            .create_task(NewTask {
                owner_id: Uuid::now_v7(),
                name: "Orphan".to_string(),
                description: None,
                due_date: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Domain(DomainError::NotFound { .. })));
        assert!(store.tasks().is_empty());
        assert!(store.outbox_messages().is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_task_is_not_found() {
        let store = MemoryStore::new();
        let err = service(&store).delete_task(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, CoreError::Domain(DomainError::NotFound { .. })));
    }
}
