//! Place Harvester - local business listing collection
//!
//! Harvests business listings from mobile place search results, extracts
//! contact and social metadata from each detail page, stores them in SQLite
//! and annotates every listing with its nearest competitors.

pub mod application;
pub mod domain;
pub mod infrastructure;
