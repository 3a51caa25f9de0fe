//! External feed observation: fetchers that turn remote pages into
//! normalized `ObservedItem` values.
//!
//! Items are produced fresh on every poll and never persisted; only their
//! identity keys are checkpointed by the reconciliation engine. Fetch
//! failures are per-cycle (`FetchError`) and never escape a poll tick.

pub mod instagram;
pub mod items;
pub mod normalize;
pub mod showdates;
pub mod tour;

pub use instagram::{InstagramFeed, InstagramFeedConfig, InstagramSource};
pub use items::{InstagramPost, ObservedItem, ShowDate};
pub use normalize::normalize_identity;
pub use tour::{ShowSource, TourFeed, TourFeedConfig};
