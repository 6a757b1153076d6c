//! Announces free and soon-free storefront games to a Discord webhook.
//!
//! One run fetches the promotions payload, turns it into typed offers, resolves each offer's
//! status against an explicit `now`, and posts the active and upcoming ones.

pub mod config;
pub mod discord;
pub mod epic;
pub mod error;
pub mod handler;
pub mod model;
pub mod pipeline;
pub mod promotions;
pub mod resolver;
pub mod retry;
