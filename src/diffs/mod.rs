//! Revision diff retrieval: HTTP fetcher, sequential fetch queue and the
//! compare-API response parser.

pub mod fetcher;
pub mod parser;
pub mod queue;

pub use fetcher::{DiffFetcher, HttpDiffFetcher};
pub use parser::{parse_compare, Compare, CompareResult};
pub use queue::{DiffQueue, FetchCallback, FetchJob};
