//! Centralized constants for the kubeway project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod annotations;
pub mod network;
pub mod provider;
