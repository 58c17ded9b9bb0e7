//! Rate-limited, circuit-broken HTTP clients for the two upstreams (spec
//! §4.4): Catalog (Spotify-shaped) and Features (RecoBeat-shaped).

pub mod catalog;
pub mod client;
pub mod features;
pub mod rate_limit;

pub use catalog::CatalogClient;
pub use client::{HttpTool, HttpToolConfig, RetryPolicy};
pub use features::FeaturesClient;
