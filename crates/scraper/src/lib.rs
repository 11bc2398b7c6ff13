//! Apify-backed [`PostSource`](truthwatch_core::source::PostSource) for Truth
//! Social accounts.

pub mod client;
pub mod payload;

pub use client::{ApifyClient, ApifySettings};
pub use payload::ScraperInput;
