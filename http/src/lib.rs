#![deny(unsafe_code)]

//! HTTPS requester for a bucketed REST API, layered over
//! [`discord_ratelimiting`]'s per-bucket token buckets and global
//! kill-switch.
//!
//! [`Client`] owns the retry-with-backoff loop, the status-code
//! classification taxonomy ([`error`]), and the abort-if-ratelimited mode
//! ([`abort`]). [`route`] is the value object routes are built from;
//! [`request`] assembles the outgoing body; [`multipart`] handles file
//! uploads; [`field`] carries the omitted/null/value distinction request
//! bodies need.

pub mod abort;
pub mod api_error;
pub mod error;
pub mod field;
pub mod multipart;
pub mod request;
pub mod route;

mod client;

pub use self::{
    client::{Client, ClientBuilder, Response},
    error::{Error, ErrorType},
};

/// Discord API version this crate targets.
pub const API_VERSION: u8 = 10;

/// Base URL requests are built against (`spec.md` §6).
pub const BASE_URL: &str = "https://discord.com/api/v10";
