//! # Broadcast Scrape
//!
//! Scrapes radio program websites and JSON schedule feeds into normalized
//! [`Broadcast`](models::Broadcast) records.
//!
//! A crawl is a graph of jobs: a station expands into time ranges or day
//! pages, those into listed items, items into detail pages, and every leaf
//! yields broadcasts. The [`runner`] walks that graph with bounded
//! concurrency and keeps whatever succeeded.
//!
//! ## Modules
//!
//! - [`window`]: anchor instants of the crawl window
//! - [`extract`]: predicate matching and text extraction over HTML
//! - [`dates`]: relative dates, midnight rollover, year inference
//! - [`assemble`]: broadcast drafts, defaults and validation
//! - [`scrapers`]: the job variants
//! - [`runner`]: the job queue
//! - [`config`]: YAML configuration and the station registry
//! - [`outputs`]: JSON lines and the archive layout

pub mod assemble;
pub mod cli;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod outputs;
pub mod runner;
pub mod scrapers;
pub mod utils;
pub mod window;
