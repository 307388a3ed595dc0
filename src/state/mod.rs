//! State module for tracking what a run has discovered
//!
//! # Components
//!
//! - `Accumulator`: Source Records and Media References gathered while
//!   articles are fetched, read by the later stages
//! - `MediaState`: Outcome of processing one media reference

mod accumulator;
mod media_state;

pub use accumulator::{Accumulator, SourceRecord};
pub use media_state::MediaState;
