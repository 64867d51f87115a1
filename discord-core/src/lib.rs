#![deny(unsafe_code)]

//! Advertisement crate for the three library crates that make up this
//! ecosystem's concurrency core: rate-limited HTTP, and gateway event
//! dispatch. Depend on `discord-ratelimiting`, `discord-http` and
//! `discord-dispatch` directly; this crate only re-exports them under one
//! name for convenience.

pub use discord_dispatch as dispatch;
pub use discord_http as http;
pub use discord_ratelimiting as ratelimiting;
