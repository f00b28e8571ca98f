#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod framework;
pub mod handlers;
pub mod processors;
pub mod services;
pub mod store;

pub use error::{CoreError, DomainError};
