//! Core engine: normalize → classify → filter → rank, driven by the poll loop.

pub mod normalizer;
pub mod classifier;
pub mod filter;
pub mod ranker;
pub mod pipeline;
pub mod monitor;
