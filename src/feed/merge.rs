use crate::api::{Category, JoinedPost, Post, Profile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Category sentinel for posts with a null or unresolvable category key.
const UNCATEGORIZED: &str = "Uncategorized";

/// Byline sentinel when no profile, display name, or handle is available.
const ANONYMOUS: &str = "Anonymous";

/// Excerpts longer than this are clamped with an ellipsis.
const MAX_EXCERPT_CHARS: usize = 200;

// ============================================================================
// Category Index
// ============================================================================

/// Session-cached id → category lookup built from the full catalog.
///
/// The catalog is small and bounded; it is fetched once per controller
/// session and reused for every page view until explicitly invalidated.
/// Categories are shared via `Arc` — many posts on a page typically point at
/// the same few entries.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    by_id: HashMap<String, Arc<Category>>,
    ordered: Vec<Arc<Category>>,
}

impl CategoryIndex {
    pub fn new(categories: Vec<Category>) -> Self {
        let ordered: Vec<Arc<Category>> = categories.into_iter().map(Arc::new).collect();
        let by_id = ordered
            .iter()
            .map(|cat| (cat.id.clone(), Arc::clone(cat)))
            .collect();
        Self { by_id, ordered }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Category>> {
        self.by_id.get(id).cloned()
    }

    /// Catalog entries in backend order (by name).
    pub fn all(&self) -> &[Arc<Category>] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

// ============================================================================
// Merged Records
// ============================================================================

/// A display-ready feed record: a post joined with its category and author
/// profile. Produced only by [`merge_page`] and [`merge_joined`].
#[derive(Debug, Clone, Serialize)]
pub struct MergedPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    /// Clamped to 200 characters at a char boundary.
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category: Option<Arc<Category>>,
    pub author: Option<Arc<Profile>>,
}

impl MergedPost {
    /// Category display name, or the "Uncategorized" sentinel.
    pub fn category_name(&self) -> &str {
        self.category.as_ref().map_or(UNCATEGORIZED, |c| &c.name)
    }

    /// Author display name: full name, then handle, then "Anonymous".
    pub fn byline(&self) -> &str {
        match self.author.as_ref() {
            Some(profile) => profile
                .full_name
                .as_deref()
                .or(profile.username.as_deref())
                .unwrap_or(ANONYMOUS),
            None => ANONYMOUS,
        }
    }

    /// Publication date for display; null timestamps render as "Recently".
    pub fn published_label(&self) -> String {
        match self.published_at {
            Some(ts) => ts.format("%b %-d, %Y").to_string(),
            None => "Recently".to_string(),
        }
    }
}

fn clamp_excerpt(excerpt: Option<String>) -> Option<String> {
    excerpt.map(|text| {
        if text.chars().count() <= MAX_EXCERPT_CHARS {
            text
        } else {
            let mut clamped: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
            clamped.push_str("...");
            clamped
        }
    })
}

/// Join a raw post page with the category index and profile map.
///
/// Pure: no I/O, no failure path. Input order is preserved — the backend
/// already returns publication-timestamp-descending, nulls last.
pub fn merge_page(
    posts: Vec<Post>,
    index: &CategoryIndex,
    profiles: &HashMap<String, Arc<Profile>>,
) -> Vec<MergedPost> {
    posts
        .into_iter()
        .map(|post| MergedPost {
            category: post.category_id.as_deref().and_then(|id| index.get(id)),
            author: post
                .author_id
                .as_deref()
                .and_then(|id| profiles.get(id).cloned()),
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: clamp_excerpt(post.excerpt),
            cover_image: post.cover_image,
            published_at: post.published_at,
        })
        .collect()
}

/// Convert server-joined post nodes into the same merged shape as
/// [`merge_page`] — both relationship strategies produce identical records.
pub fn merge_joined(posts: Vec<JoinedPost>) -> Vec<MergedPost> {
    posts
        .into_iter()
        .map(|post| MergedPost {
            id: post.id,
            title: post.title,
            slug: post.slug,
            excerpt: clamp_excerpt(post.excerpt),
            cover_image: post.cover_image,
            published_at: post.published_at,
            category: post.categories.map(Arc::new),
            author: post.profiles.map(Arc::new),
        })
        .collect()
}
