//! Infrastructure shared by the feature crates: configuration, errors,
//! OAuth providers, cookie keys and HTTP plumbing.

pub mod config;
pub mod crypto;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod oauth;
pub mod rejection;
pub mod response;
