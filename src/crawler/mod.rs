//! Crawler module for listing pagination and item harvesting
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with politeness delays, retries and rendered fallback
//! - Listing page parsing and duplicate detection
//! - The pagination state machine
//! - Overall harvest coordination

pub mod backoff;
mod coordinator;
mod fetcher;
mod paginator;
mod parser;
mod render;

pub use backoff::{BackoffPolicy, DelayRange, RecordingSleeper, Sleeper, TokioSleeper};
pub use coordinator::{harvest_sources, run_source, Harvester, RunMode, RunOptions};
pub use fetcher::{FetchError, FetchKind, Fetcher, HttpFetcher, RawResponse, RenderPurpose};
pub use paginator::{PaginationLimits, Paginator};
pub use parser::{ItemReference, ListingCard, ListingPage, ListingParser, PageHarvest};
pub use render::{CommandRenderer, Renderer};
