//! Delivery-request lifecycle for DashDrop.
//!
//! [`RequestService`] is the entry point: it owns a [`RequestStore`]
//! (remote SQLite-backed or offline single-slot), validates every status
//! change against the [`lifecycle`] table, and hands committed changes to the
//! [`NotificationDispatcher`] as post-commit hooks.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod local;
pub mod notify;
pub mod remote;
pub mod service;
pub mod store;
pub mod surfaces;

pub use config::Config;
pub use error::StoreError;
pub use notify::NotificationDispatcher;
pub use service::RequestService;
pub use store::{Backend, RequestStore};
