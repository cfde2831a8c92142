//! Access layer for the remote structured-query service: a GraphQL-style
//! collection endpoint for posts and categories, and a keyed REST endpoint
//! for batched profile lookups. All requests carry a bearer credential with
//! an anonymous fallback.

pub mod categories;
mod client;
pub mod posts;
pub mod profiles;
pub mod types;

pub use client::{ApiClient, ApiError};
pub use types::{Category, CursorState, JoinedPage, JoinedPost, Post, PostPage, Profile};
