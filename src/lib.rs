//! Plumb Dispatch: priority scheduling of plumbing jobs onto technicians.

pub mod api;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod store;

pub use error::{Error, Result};
