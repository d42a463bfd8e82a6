//! mlhub server: HTTP surface for evaluations plus the event consumers.

pub mod app;
pub mod broker;
pub mod config;
pub mod error;
pub mod handlers;
pub mod provisioning;
pub mod router;
pub mod subscriber;
