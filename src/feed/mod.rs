//! Feed assembly: merging post pages with the category catalog and profile
//! batches, and deriving paging controls from cursor flags.

pub mod assemble;
pub mod merge;
pub mod pagination;

pub use merge::{merge_joined, merge_page, CategoryIndex, MergedPost};
pub use pagination::PageControls;

/// Fixed public feed page size.
pub const POSTS_PER_PAGE: u32 = 5;

/// Which relationship strategy the pipeline uses to produce merged records.
///
/// Both paths yield the same merged shape. The choice is fixed configuration
/// (`relationship_queries`), never trial-and-error per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Separate post, catalog, and profile fetches merged client-side.
    #[default]
    Split,
    /// One query with server-embedded category and profile relations.
    Joined,
}

/// A navigation target: 1-based page number plus an optional category slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPageRequest {
    pub page: u32,
    pub category_slug: Option<String>,
}

impl FeedPageRequest {
    pub fn new(page: u32, category_slug: Option<String>) -> Self {
        Self {
            page: page.max(1),
            category_slug,
        }
    }

    /// Window start for the fixed page size.
    pub fn offset(&self) -> u32 {
        (self.page - 1) * POSTS_PER_PAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_derivation() {
        assert_eq!(FeedPageRequest::new(1, None).offset(), 0);
        assert_eq!(FeedPageRequest::new(2, None).offset(), 5);
        assert_eq!(FeedPageRequest::new(7, None).offset(), 30);
    }

    #[test]
    fn test_page_clamped_to_one() {
        assert_eq!(FeedPageRequest::new(0, None).page, 1);
    }
}
