pub mod outbox;
pub mod tasks;
pub mod users;
