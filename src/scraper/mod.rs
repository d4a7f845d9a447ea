// Scraper module: HTTP layer for the listings site.

pub mod fetcher;
pub mod traits;

pub use fetcher::{PulscenBackend, PulscenScraper};
pub use traits::{ListingPage, ListingsBackend, PageFetcher, PageReader};
