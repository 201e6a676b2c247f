//! Core types and shared functionality for storyline.
//!
//! This crate provides:
//! - Story records, cache envelopes and subscription state
//! - SQLite-backed local store, cache tiers and settings
//! - Storage and credential traits shared with the client
//! - Unified error types
//! - Configuration structures

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use auth::{CredentialStore, MemoryCredentials};
pub use cache::{CacheDb, TierEntry};
pub use config::{AppConfig, ConfigError, PushConfig};
pub use error::Error;
pub use model::{CacheEnvelope, Location, PushKeys, PushSubscription, StorageStats, Story, SubscriptionRecord};
pub use store::{StoryStore, SubscriptionLedger, UnavailableStore};
