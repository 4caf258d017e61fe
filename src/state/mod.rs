//! State module for tracking listing crawl progress
//!
//! # Components
//!
//! - `PageState`: where the pagination state machine currently stands
//! - `StopReason`: why a crawl ended, as reported in the run summary and ledger

mod page_state;
mod stop_reason;

// Re-export main types
pub use page_state::PageState;
pub use stop_reason::StopReason;
