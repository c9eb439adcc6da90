//! Rightsizer service: HTTP surface and configuration for the rightsizing engine

pub mod api;
pub mod config;
