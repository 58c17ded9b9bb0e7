//! Domain types shared across every stage of the recommendation pipeline.

pub mod anchor;
pub mod cache;
pub mod deny_list;
pub mod mood;
pub mod registry;
pub mod track;
pub mod workflow;

pub use anchor::AnchorCandidate;
pub use cache::{CacheEntry, CacheStats};
pub use deny_list::DenyEntry;
pub use mood::{ColorScheme, EnergyLevel, FeatureTarget, MoodAnalysis, PrimaryEmotion, TemporalContext, FEATURE_NAMES};
pub use registry::RegistryEntry;
pub use track::{AnchorType, TrackRecommendation, TrackSource};
pub use workflow::{PlaylistTarget, WorkflowMetadata, WorkflowState, WorkflowStatus};
