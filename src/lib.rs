// src/lib.rs

//! Hackathon Monitor Library
//!
//! Polls hackathon listings, keeps one deduplicated table of everything
//! seen and raises a single notification per run for new events.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
