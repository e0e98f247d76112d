pub mod api;
pub mod config;
pub mod event;
pub mod humanize;
pub mod ingest;
pub mod ledger;
pub mod observability;
pub mod service;

pub use service::{Service, ServiceError};
