// Collector module: primary listings collection and the AI-search fallback.

pub mod fallback;
pub mod primary;

pub use fallback::{FallbackCollector, FallbackSearch, SearchAttemptState};
pub use primary::{MatchPredicate, PrimaryCollector};
