//! Feed controller: navigation state machine, generation-tagged event
//! handling, and the session caches (slug resolutions, category catalog,
//! page windows).

use crate::api::{ApiClient, ApiError, CursorState};
use crate::feed::assemble::{self, AssemblyJob, CategoryScope};
use crate::feed::{CategoryIndex, FeedPageRequest, FetchStrategy, MergedPost, PageControls};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Page windows kept for instant back/forward navigation.
const PAGE_CACHE_ENTRIES: usize = 32;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle of one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    ResolvingCategory,
    FetchingPage,
    LoadingProfiles,
    Ready,
    Error,
}

/// Errors surfaced to the reader. Stage-tagged so the message says which
/// part of the pipeline failed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("category lookup failed: {0}")]
    Resolve(#[source] ApiError),
    #[error("page fetch failed: {0}")]
    Fetch(#[source] ApiError),
}

/// Final payload of a successful assembly.
#[derive(Debug)]
pub struct LoadedPage {
    pub posts: Vec<MergedPost>,
    pub cursor: CursorState,
    /// True when the profile batch failed and bylines fell back to the
    /// sentinel.
    pub profiles_degraded: bool,
}

/// Messages from assembly tasks back to the controller.
///
/// Page results carry the generation of the navigation that spawned them;
/// resolution facts and the catalog are navigation-independent and apply
/// regardless.
#[derive(Debug)]
pub enum FeedEvent {
    Phase {
        generation: u64,
        phase: FeedPhase,
    },
    CategoryResolved {
        slug: String,
        category_id: Option<String>,
    },
    IndexLoaded {
        index: Arc<CategoryIndex>,
    },
    PageLoaded {
        generation: u64,
        result: Result<LoadedPage, FeedError>,
    },
}

// ============================================================================
// Controller
// ============================================================================

struct CachedPage {
    posts: Arc<Vec<MergedPost>>,
    cursor: CursorState,
    fetched_at: Instant,
}

/// Scope key plus window offset; pages cached only under resolved scopes.
type PageKey = (Option<String>, u32);

/// Owns the rendered feed state and all session caches.
///
/// Exactly one navigation is current at a time. Each call to [`navigate`]
/// bumps the generation counter and spawns an assembly tagged with it;
/// [`handle_event`] discards page results from superseded generations, so
/// out-of-order completions can never overwrite a newer page.
///
/// [`navigate`]: FeedController::navigate
/// [`handle_event`]: FeedController::handle_event
pub struct FeedController {
    client: ApiClient,
    strategy: FetchStrategy,
    events: mpsc::Sender<FeedEvent>,

    pub phase: FeedPhase,
    pub request: FeedPageRequest,
    pub posts: Arc<Vec<MergedPost>>,
    pub controls: PageControls,
    pub error: Option<String>,
    pub profiles_degraded: bool,

    generation: u64,
    category_index: Option<Arc<CategoryIndex>>,
    /// Slug → resolved key. Misses (`None`) are cached too: a known-bad slug
    /// renders the empty feed without touching the network again.
    slug_cache: HashMap<String, Option<String>>,
    page_cache: LruCache<PageKey, CachedPage>,
    cache_ttl: Duration,
}

impl FeedController {
    pub fn new(
        client: ApiClient,
        strategy: FetchStrategy,
        cache_ttl: Duration,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let capacity = NonZeroUsize::new(PAGE_CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            strategy,
            events,
            phase: FeedPhase::Idle,
            request: FeedPageRequest::new(1, None),
            posts: Arc::new(Vec::new()),
            controls: PageControls::default(),
            error: None,
            profiles_degraded: false,
            generation: 0,
            category_index: None,
            slug_cache: HashMap::new(),
            page_cache: LruCache::new(capacity),
            cache_ttl,
        }
    }

    /// Catalog snapshot from the last successful fetch, if any.
    pub fn catalog(&self) -> Option<Arc<CategoryIndex>> {
        self.category_index.clone()
    }

    /// Drop the cached catalog so the next navigation refetches it.
    pub fn invalidate_catalog(&mut self) {
        self.category_index = None;
    }

    /// Navigate to a page. Supersedes any in-flight assembly.
    ///
    /// A fresh cached window is rendered immediately and refreshed in the
    /// background; a slug already known to be a miss renders the empty feed
    /// synchronously with no network at all.
    pub fn navigate(&mut self, request: FeedPageRequest) {
        self.generation = self.generation.wrapping_add(1);
        self.error = None;
        self.request = request;

        let scope = match self.request.category_slug.as_deref() {
            None => CategoryScope::All,
            Some(slug) => match self.slug_cache.get(slug) {
                Some(Some(id)) => CategoryScope::Resolved(id.clone()),
                Some(None) => {
                    self.posts = Arc::new(Vec::new());
                    self.controls =
                        PageControls::estimate(self.request.page, CursorState::default());
                    self.profiles_degraded = false;
                    self.phase = FeedPhase::Ready;
                    tracing::debug!(slug = slug, "Known slug miss, rendering empty feed");
                    return;
                }
                None => CategoryScope::Unresolved(slug.to_string()),
            },
        };

        let served_from_cache = self.serve_cached(&scope);
        if !served_from_cache {
            self.phase = match scope {
                CategoryScope::Unresolved(_) => FeedPhase::ResolvingCategory,
                _ => FeedPhase::FetchingPage,
            };
        }

        tracing::debug!(
            generation = self.generation,
            page = self.request.page,
            category = self.request.category_slug.as_deref().unwrap_or("all"),
            cached = served_from_cache,
            "Navigating"
        );

        tokio::spawn(assemble::run(AssemblyJob {
            client: self.client.clone(),
            strategy: self.strategy,
            generation: self.generation,
            page: self.request.page,
            scope,
            index: self.category_index.clone(),
            events: self.events.clone(),
        }));
    }

    /// Render a fresh cache entry, if one exists for this scope. The caller
    /// still spawns the refresh; its result replaces the cached view when it
    /// lands.
    fn serve_cached(&mut self, scope: &CategoryScope) -> bool {
        let key = match scope {
            CategoryScope::All => (None, self.request.offset()),
            CategoryScope::Resolved(id) => (Some(id.clone()), self.request.offset()),
            CategoryScope::Unresolved(_) => return false,
        };

        match self.page_cache.get(&key) {
            Some(entry) if entry.fetched_at.elapsed() <= self.cache_ttl => {
                self.posts = Arc::clone(&entry.posts);
                self.controls = PageControls::estimate(self.request.page, entry.cursor);
                self.profiles_degraded = false;
                self.phase = FeedPhase::Ready;
                true
            }
            _ => false,
        }
    }

    fn current_page_key(&self) -> Option<PageKey> {
        match self.request.category_slug.as_deref() {
            None => Some((None, self.request.offset())),
            Some(slug) => match self.slug_cache.get(slug) {
                Some(Some(id)) => Some((Some(id.clone()), self.request.offset())),
                _ => None,
            },
        }
    }

    /// Apply one event from an assembly task.
    pub fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::CategoryResolved { slug, category_id } => {
                // Resolution facts are navigation-independent: cache them
                // even when the navigation that produced them is superseded.
                self.slug_cache.insert(slug, category_id);
            }
            FeedEvent::IndexLoaded { index } => {
                self.category_index = Some(index);
            }
            FeedEvent::Phase { generation, phase } => {
                if generation != self.generation {
                    return;
                }
                // A cache-served view stays Ready while its refresh runs.
                if self.phase != FeedPhase::Ready {
                    self.phase = phase;
                }
            }
            FeedEvent::PageLoaded { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(
                        stale = generation,
                        current = self.generation,
                        "Discarding superseded page result"
                    );
                    return;
                }
                match result {
                    Ok(loaded) => {
                        let posts = Arc::new(loaded.posts);
                        if let Some(key) = self.current_page_key() {
                            self.page_cache.put(
                                key,
                                CachedPage {
                                    posts: Arc::clone(&posts),
                                    cursor: loaded.cursor,
                                    fetched_at: Instant::now(),
                                },
                            );
                        }
                        self.posts = posts;
                        self.controls = PageControls::estimate(self.request.page, loaded.cursor);
                        self.profiles_degraded = loaded.profiles_degraded;
                        self.error = None;
                        self.phase = FeedPhase::Ready;
                    }
                    Err(e) => {
                        // The last rendered page stays visible next to the
                        // error notice.
                        self.error = Some(e.to_string());
                        self.phase = FeedPhase::Error;
                    }
                }
            }
        }
    }
}
