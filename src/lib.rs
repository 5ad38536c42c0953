//! Lead enrichment service.
//!
//! Turns scrape orders into verified email leads: orders are driven one at a
//! time against an external scraping provider, completed artifacts are handed
//! off into enrichment jobs, and each job generates, verifies, and
//! deduplicates email candidates per person.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod workers;
