use super::client::{ApiClient, ApiError};
use super::types::{Post, Profile};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Columns requested from the profiles table.
const PROFILE_COLUMNS: &str = "id,full_name,username,avatar_url";

/// Extract the distinct set of non-null author keys from a page of posts.
///
/// Sorted for a deterministic wire request; repeated authors collapse to one
/// key.
pub fn distinct_author_ids(posts: &[Post]) -> Vec<String> {
    posts
        .iter()
        .filter_map(|post| post.author_id.as_deref())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Load the display profiles for a set of author keys in one batched lookup.
///
/// An empty key set returns an empty map without touching the network.
/// Partial results are expected: keys the backend does not know simply have
/// no entry, and the merge layer renders its sentinel for them.
pub async fn load_profiles(
    client: &ApiClient,
    author_ids: &[String],
) -> Result<HashMap<String, Arc<Profile>>, ApiError> {
    if author_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let id_filter = format!("in.({})", author_ids.join(","));
    let profiles: Vec<Profile> = client
        .rest_get(
            "rest/v1/profiles",
            &[("select", PROFILE_COLUMNS), ("id", &id_filter)],
        )
        .await?;

    tracing::debug!(
        requested = author_ids.len(),
        found = profiles.len(),
        "Loaded profile batch"
    );

    Ok(profiles
        .into_iter()
        .map(|profile| (profile.id.clone(), Arc::new(profile)))
        .collect())
}
