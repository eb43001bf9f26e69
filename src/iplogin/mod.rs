//! Automatic login by client address.

pub mod access;
pub mod address;
pub mod cache;
pub mod config;
pub mod cookies;
pub mod directory;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod service;
pub mod session;

pub use config::IpLoginConfig;
pub use error::{Error, Result};
pub use service::IpLogin;
