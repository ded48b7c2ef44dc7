//! Inbound event routing: classification, rate limiting, persistence,
//! status resolution and outbound delivery.

pub mod engine;
pub mod event;
pub mod outbound;
pub mod rate_limit;
pub mod resolver;
pub mod store;
pub mod telegram;
pub mod tracker;

pub use engine::Engine;
pub use event::InboundEvent;
pub use rate_limit::RateLimiter;
pub use resolver::StatusResolver;
pub use store::Store;
pub use telegram::TelegramClient;
pub use tracker::{Tracker, TrackerClient};

#[cfg(test)]
mod tests;
