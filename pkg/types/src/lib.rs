//! Shared data types: orchestrator resources consumed by the provider and
//! the routing configuration it produces.

pub mod config;
pub mod configuration;
pub mod ingress;
pub mod meta;
pub mod service;
pub mod validate;
