use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Types
// ============================================================================

/// A published post as returned by the posts collection.
///
/// `published_at = None` marks an unpublished draft; the backend filter
/// (`is_published = true`) should keep drafts out of the public feed, but the
/// field stays nullable because the ordering is DescNullsLast either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    pub author_id: Option<String>,
}

/// A category from the catalog. Treated as an immutable snapshot for the
/// duration of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An author profile from the batched profile lookup.
///
/// Both `full_name` and `username` are nullable; the merge layer falls back
/// to "Anonymous" when neither is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

// ============================================================================
// Cursor Flags
// ============================================================================

/// Forward/backward cursor flags returned in lieu of a total row count.
///
/// The backend deliberately computes no total (cost tradeoff); everything
/// downstream works from these two booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CursorState {
    pub has_next: bool,
    pub has_previous: bool,
}

// ============================================================================
// Wire Envelopes (GraphQL collection shape)
// ============================================================================

/// `pageInfo` block of a paginated collection.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl From<PageInfo> for CursorState {
    fn from(info: PageInfo) -> Self {
        CursorState {
            has_next: info.has_next_page,
            has_previous: info.has_previous_page,
        }
    }
}

/// Generic `<name>Collection` payload: edges of nodes plus optional pageInfo.
#[derive(Debug, Deserialize)]
pub(crate) struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
    #[serde(rename = "pageInfo")]
    pub page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Edge<T> {
    pub node: T,
}

impl<T> Collection<T> {
    /// Unwrap the edge/node nesting into a plain node list.
    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }
}

// ============================================================================
// Page Results
// ============================================================================

/// One page of raw (unmerged) posts plus its cursor flags.
#[derive(Debug)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub cursor: CursorState,
}

/// A post node with server-embedded relations, returned by the join-capable
/// query path. Carries the same scalar fields as [`Post`].
#[derive(Debug, Clone, Deserialize)]
pub struct JoinedPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub author_id: Option<String>,
    #[serde(default)]
    pub categories: Option<Category>,
    #[serde(default)]
    pub profiles: Option<Profile>,
}

/// One page of join-embedded posts plus its cursor flags.
#[derive(Debug)]
pub struct JoinedPage {
    pub posts: Vec<JoinedPost>,
    pub cursor: CursorState,
}
