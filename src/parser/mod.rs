// Parser module: Pulscen-specific HTML extraction.

pub mod pulscen_parser;

pub use pulscen_parser::{ListingEntry, ProductPage, PulscenParser};
