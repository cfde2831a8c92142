use super::client::{ApiClient, ApiError};
use super::types::{Category, Collection};

/// Slug lookup used to turn a navigation slug into a category key.
const CATEGORY_BY_SLUG: &str = r#"
query GetCategoryBySlug($slug: String!) {
  categoriesCollection(filter: { slug: { eq: $slug } }, first: 1) {
    edges {
      node {
        id
        name
        slug
      }
    }
  }
}
"#;

/// Full catalog, small and bounded, fetched once per session.
const CATEGORIES: &str = r#"
query GetCategories {
  categoriesCollection(orderBy: { name: AscNullsLast }) {
    edges {
      node {
        id
        name
        slug
        description
      }
    }
  }
}
"#;

/// Resolve a category slug to its key.
///
/// Returns `Ok(None)` when the slug matches no category — a resolution miss,
/// not an error. Callers must render the empty feed for a miss and must not
/// fall through to the unfiltered posts query.
pub async fn resolve_slug(client: &ApiClient, slug: &str) -> Result<Option<String>, ApiError> {
    let collection: Collection<Category> = client
        .query(
            CATEGORY_BY_SLUG,
            serde_json::json!({ "slug": slug }),
            "categoriesCollection",
        )
        .await?;

    let id = collection.into_nodes().into_iter().next().map(|c| c.id);
    tracing::debug!(slug = slug, resolved = id.is_some(), "Resolved category slug");
    Ok(id)
}

/// Fetch the full category catalog, ordered by name.
pub async fn fetch_all(client: &ApiClient) -> Result<Vec<Category>, ApiError> {
    let collection: Collection<Category> = client
        .query(CATEGORIES, serde_json::json!({}), "categoriesCollection")
        .await?;

    let categories = collection.into_nodes();
    tracing::debug!(count = categories.len(), "Fetched category catalog");
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(uri: &str) -> ApiClient {
        ApiClient::new(uri, SecretString::from("anon".to_string()), None).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_slug_hit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("GetCategoryBySlug"))
            .and(body_string_contains("\"slug\":\"design\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "categoriesCollection": {
                        "edges": [{ "node": { "id": "K1", "name": "Design", "slug": "design" } }]
                    }
                }
            })))
            .mount(&server)
            .await;

        let id = resolve_slug(&test_client(&server.uri()), "design")
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("K1"));
    }

    #[tokio::test]
    async fn test_resolve_slug_miss_is_none_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "categoriesCollection": { "edges": [] } }
            })))
            .mount(&server)
            .await;

        let id = resolve_slug(&test_client(&server.uri()), "nonexistent-xyz")
            .await
            .unwrap();
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_returns_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("GetCategories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "categoriesCollection": {
                        "edges": [
                            { "node": { "id": "c1", "name": "Code", "slug": "code", "description": null } },
                            { "node": { "id": "c2", "name": "Design", "slug": "design", "description": "Visual things" } }
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let catalog = fetch_all(&test_client(&server.uri())).await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1].description.as_deref(), Some("Visual things"));
    }
}
