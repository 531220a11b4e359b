//! State module for tracking crawl progress
//!
//! `EntryState` is the lifecycle of a frontier entry. State transitions are
//! linearized by the Frontier's dedup store; this module only defines which
//! transitions are legal.

mod entry_state;

pub use entry_state::EntryState;
