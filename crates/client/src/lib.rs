//! Client code for storyline.
//!
//! This crate provides the story API client, the request strategy router,
//! story synchronization and the push subscription lifecycle shared by the CLI.

pub mod fetch;
pub mod origin;
pub mod push;
pub mod router;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{FetchConfig, FetchedResponse, Fetcher, HttpFetcher};
pub use origin::{NewStory, Origin, OriginConfig, Photo, StoryApiClient};
pub use push::{
    Permission, Phase, PushMessage, RegistrationHost, SubscribeOutcome, SubscriptionManager, SubscriptionStatus,
    UnsubscribeOutcome,
};
pub use router::{
    InstallReport, InterceptedRequest, Interception, InterceptionHost, ResourceClass, ResponseSource, RoutedResponse,
    StrategyRouter,
};
pub use sync::{CreateOutcome, Provenance, SyncController, Synced};
