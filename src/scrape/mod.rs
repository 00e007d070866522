//! Target scraping
//!
//! Each tick fetches a text exposition from every configured target,
//! parses it and appends the samples to the engine's store.

pub mod exposition;
pub mod scraper;
pub mod source;

pub use exposition::{parse_exposition, parse_line, Exposition, ParseError, ParsedSample};
pub use scraper::{ScrapeSummary, Scraper, TargetReport, INSTANCE_LABEL};
pub use source::{target_url, ExpositionSource, HttpSource, ScrapeError};
