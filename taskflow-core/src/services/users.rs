use super::outbox_event;
use crate::entities::users::{NewUser, User, UserId};
use crate::error::{CoreError, DomainError};
use crate::events::{UserDeletedAccount, UserDeletedAccountEvent, UserSignedUp, UserSignedUpEvent};
use crate::store::{
    OutboxRepository, TaskRepository, UnitOfWork, UnitOfWorkCapable, UnitOfWorkFactory,
    UserRepository,
};
use tracing::info;

pub struct UserService<F, U, T, O> {
    factory: F,
    users: U,
    tasks: T,
    outbox: O,
}

impl<F, U, T, O> UserService<F, U, T, O>
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

    /// Create a user and record `userSignedUp` in the same unit of work.
    pub async fn sign_up_user(&self, new_user: NewUser) -> Result<User, CoreError> {
        if self.users.exists_by_username(&new_user.username).await? {
            return Err(DomainError::conflict("Users", "Username is already taken.").into());
        }
        if self.users.exists_by_email(&new_user.email).await? {
            return Err(DomainError::conflict("Users", "Email is already registered.").into());
        }

        let user = new_user.into_user(self.users.next_identity());
        let message = outbox_event::<UserSignedUp>(
            &self.outbox,
            &UserSignedUpEvent {
                id: user.id,
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                email: user.email.clone(),
            },
        )?;

        self.factory
            .create_under_scope(|uow| {
                let users = self.users.for_unit_of_work(&uow);
                let outbox = self.outbox.for_unit_of_work(&uow);
                let user = user.clone();
                async move {
                    users.add_user(user).await?;
                    outbox.add_outbox_message(message).await?;
                    uow.commit().await
                }
            })
            .await?;

        info!(user_id = %user.id, "User signed up");
        Ok(user)
    }

    /// Remove a user and all their tasks, recording `userDeletedAccount`.
    pub async fn delete_user_by_id(&self, id: UserId) -> Result<(), CoreError> {
        let removed_tasks = self
            .factory
            .create_under_scope(|uow| {
                let users = self.users.for_unit_of_work(&uow);
                let tasks = self.tasks.for_unit_of_work(&uow);
                let outbox = self.outbox.for_unit_of_work(&uow);
                async move {
                    let user = users.find_user_by_id(id).await?;
                    let removed_tasks = tasks.remove_tasks_by_owner_id(id).await?;
                    users.remove_user_by_id(id).await?;

                    let message = outbox_event::<UserDeletedAccount>(
                        &outbox,
                        &UserDeletedAccountEvent {
                            id: user.id,
                            first_name: user.first_name,
                            last_name: user.last_name,
                            email: user.email,
                        },
                    )?;
                    outbox.add_outbox_message(message).await?;
                    uow.commit().await?;
                    Ok::<_, CoreError>(removed_tasks)
                }
            })
            .await?;

        info!(user_id = %id, removed_tasks, "User deleted account");
        Ok(())
    }
}
