#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]

//! Client-credentials token acquisition for several identity backends.
//!
//! An [`AuthConfig`] describes a client identity and the backend that issues its
//! tokens. [`AuthConfig::token_provider`] returns a [`TokenProvider`] that hands out
//! a currently valid [`AccessToken`], fetching a new one only when the cached token
//! is missing or about to expire.

pub mod cache;
mod client;
mod config;
pub mod error;
mod providers;
mod token;
pub mod transport;

pub use cache::{TokenCache, DEFAULT_EXPIRY_MARGIN};
pub use client::*;
pub use config::*;
pub use error::{AuthenticationError, AuthenticationErrorKind, Error, Result};
pub use providers::*;
pub use token::AccessToken;
