//! Command-line feed reader for an Editorial publishing backend.
//!
//! The pipeline turns a navigation request (page number plus optional
//! category slug) into a rendered page of posts: resolve the slug to a
//! category key, fetch one fixed-size window of published posts, load the
//! author profiles for that window in one batch, and merge everything with
//! the session-cached category catalog. The backend returns cursor flags
//! instead of total counts, so page totals are estimates.

pub mod api;
pub mod app;
pub mod config;
pub mod feed;
