//! Background page assembly.
//!
//! Each navigation spawns one [`run`] task that walks the pipeline stages
//! (resolve slug, fetch page window, load profile batch, merge) and reports
//! progress back over the event channel. The task is fire-and-forget: the
//! controller discards anything tagged with a superseded generation.

use crate::api::{categories, posts, profiles, ApiClient, CursorState};
use crate::app::{FeedError, FeedEvent, FeedPhase, LoadedPage};
use crate::feed::merge::{self, CategoryIndex};
use crate::feed::{FetchStrategy, POSTS_PER_PAGE};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Category scope of one assembly, decided by the controller from its slug
/// cache before spawning.
#[derive(Debug)]
pub(crate) enum CategoryScope {
    /// Unfiltered public feed.
    All,
    /// Slug already resolved to this category key in an earlier navigation.
    Resolved(String),
    /// Slug must be resolved first. A miss yields the empty feed; it never
    /// falls through to the unfiltered query.
    Unresolved(String),
}

pub(crate) struct AssemblyJob {
    pub client: ApiClient,
    pub strategy: FetchStrategy,
    /// Tag for every event this job emits; the controller compares it
    /// against its latest navigation before applying page results.
    pub generation: u64,
    pub page: u32,
    pub scope: CategoryScope,
    /// Catalog from an earlier page view, if one succeeded this session.
    pub index: Option<Arc<CategoryIndex>>,
    pub events: mpsc::Sender<FeedEvent>,
}

async fn send(events: &mpsc::Sender<FeedEvent>, event: FeedEvent) {
    if events.send(event).await.is_err() {
        tracing::warn!("Feed event receiver dropped");
    }
}

/// Run one assembly to completion, reporting stages and the final page (or
/// error) over the channel.
pub(crate) async fn run(job: AssemblyJob) {
    let offset = (job.page - 1) * POSTS_PER_PAGE;

    let category_id = match job.scope {
        CategoryScope::All => None,
        CategoryScope::Resolved(id) => Some(id),
        CategoryScope::Unresolved(slug) => {
            send(
                &job.events,
                FeedEvent::Phase {
                    generation: job.generation,
                    phase: FeedPhase::ResolvingCategory,
                },
            )
            .await;

            match categories::resolve_slug(&job.client, &slug).await {
                Ok(resolved) => {
                    send(
                        &job.events,
                        FeedEvent::CategoryResolved {
                            slug,
                            category_id: resolved.clone(),
                        },
                    )
                    .await;

                    match resolved {
                        Some(id) => Some(id),
                        None => {
                            // Resolution miss: empty feed, no posts query.
                            send(
                                &job.events,
                                FeedEvent::PageLoaded {
                                    generation: job.generation,
                                    result: Ok(LoadedPage {
                                        posts: Vec::new(),
                                        cursor: CursorState::default(),
                                        profiles_degraded: false,
                                    }),
                                },
                            )
                            .await;
                            return;
                        }
                    }
                }
                Err(e) => {
                    send(
                        &job.events,
                        FeedEvent::PageLoaded {
                            generation: job.generation,
                            result: Err(FeedError::Resolve(e)),
                        },
                    )
                    .await;
                    return;
                }
            }
        }
    };

    send(
        &job.events,
        FeedEvent::Phase {
            generation: job.generation,
            phase: FeedPhase::FetchingPage,
        },
    )
    .await;

    let result = match job.strategy {
        FetchStrategy::Joined => {
            assemble_joined(&job.client, offset, category_id.as_deref()).await
        }
        FetchStrategy::Split => {
            assemble_split(
                &job.client,
                &job.events,
                job.generation,
                offset,
                category_id.as_deref(),
                job.index,
            )
            .await
        }
    };

    send(
        &job.events,
        FeedEvent::PageLoaded {
            generation: job.generation,
            result,
        },
    )
    .await;
}

/// Single-query path: relations arrive embedded, nothing else to fetch.
async fn assemble_joined(
    client: &ApiClient,
    offset: u32,
    category_id: Option<&str>,
) -> Result<LoadedPage, FeedError> {
    let page = posts::fetch_page_joined(client, POSTS_PER_PAGE, offset, category_id)
        .await
        .map_err(FeedError::Fetch)?;

    Ok(LoadedPage {
        cursor: page.cursor,
        posts: merge::merge_joined(page.posts),
        profiles_degraded: false,
    })
}

/// Split path: page window and catalog fetch run concurrently, then the
/// profile batch keyed off the page's distinct authors.
async fn assemble_split(
    client: &ApiClient,
    events: &mpsc::Sender<FeedEvent>,
    generation: u64,
    offset: u32,
    category_id: Option<&str>,
    cached_index: Option<Arc<CategoryIndex>>,
) -> Result<LoadedPage, FeedError> {
    let page_fut = posts::fetch_page(client, POSTS_PER_PAGE, offset, category_id);

    let index_fut = async {
        match cached_index {
            Some(index) => Some(index),
            None => match categories::fetch_all(client).await {
                Ok(catalog) => {
                    let index = Arc::new(CategoryIndex::new(catalog));
                    send(
                        events,
                        FeedEvent::IndexLoaded {
                            index: Arc::clone(&index),
                        },
                    )
                    .await;
                    Some(index)
                }
                Err(e) => {
                    // Degrade to "Uncategorized" labels for this page; the
                    // catalog is not cached, so the next navigation retries.
                    tracing::warn!(error = %e, "Category catalog fetch failed");
                    None
                }
            },
        }
    };

    let (page, index) = tokio::join!(page_fut, index_fut);
    let page = page.map_err(FeedError::Fetch)?;
    let index = index.unwrap_or_default();

    send(
        events,
        FeedEvent::Phase {
            generation,
            phase: FeedPhase::LoadingProfiles,
        },
    )
    .await;

    let author_ids = profiles::distinct_author_ids(&page.posts);
    let (profile_map, profiles_degraded) =
        match profiles::load_profiles(client, &author_ids).await {
            Ok(map) => (map, false),
            Err(e) => {
                // Profile failure never takes the page down.
                tracing::warn!(error = %e, "Profile batch failed, rendering bylines degraded");
                (std::collections::HashMap::new(), true)
            }
        };

    Ok(LoadedPage {
        cursor: page.cursor,
        posts: merge::merge_page(page.posts, &index, &profile_map),
        profiles_degraded,
    })
}
