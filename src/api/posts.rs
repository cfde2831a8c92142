use super::client::{ApiClient, ApiError};
use super::types::{Collection, CursorState, JoinedPage, JoinedPost, Post, PostPage};

/// Paginated published posts, ordered newest first with unpublished-null
/// timestamps last. No total count is requested — the backend exposes cursor
/// flags instead.
const PAGINATED_POSTS: &str = r#"
query GetPaginatedPosts($limit: Int!, $offset: Int!) {
  postsCollection(
    first: $limit
    offset: $offset
    orderBy: { published_at: DescNullsLast }
    filter: { is_published: { eq: true } }
  ) {
    edges {
      node {
        id
        title
        slug
        excerpt
        cover_image
        published_at
        category_id
        author_id
      }
    }
    pageInfo {
      hasNextPage
      hasPreviousPage
    }
  }
}
"#;

/// Same page query scoped to a single category key.
const PAGINATED_POSTS_BY_CATEGORY: &str = r#"
query GetPaginatedPostsByCategory($limit: Int!, $offset: Int!, $categoryId: UUID!) {
  postsCollection(
    first: $limit
    offset: $offset
    orderBy: { published_at: DescNullsLast }
    filter: { is_published: { eq: true }, category_id: { eq: $categoryId } }
  ) {
    edges {
      node {
        id
        title
        slug
        excerpt
        cover_image
        published_at
        category_id
        author_id
      }
    }
    pageInfo {
      hasNextPage
      hasPreviousPage
    }
  }
}
"#;

/// Join-capable variant: the backend embeds the category and profile rows in
/// each post node, so no separate catalog/profile fetches are needed.
const PAGINATED_POSTS_JOINED: &str = r#"
query GetPaginatedPostsJoined($limit: Int!, $offset: Int!) {
  postsCollection(
    first: $limit
    offset: $offset
    orderBy: { published_at: DescNullsLast }
    filter: { is_published: { eq: true } }
  ) {
    edges {
      node {
        id
        title
        slug
        excerpt
        cover_image
        published_at
        author_id
        categories {
          id
          name
          slug
          description
        }
        profiles {
          id
          full_name
          username
          avatar_url
        }
      }
    }
    pageInfo {
      hasNextPage
      hasPreviousPage
    }
  }
}
"#;

const PAGINATED_POSTS_JOINED_BY_CATEGORY: &str = r#"
query GetPaginatedPostsJoinedByCategory($limit: Int!, $offset: Int!, $categoryId: UUID!) {
  postsCollection(
    first: $limit
    offset: $offset
    orderBy: { published_at: DescNullsLast }
    filter: { is_published: { eq: true }, category_id: { eq: $categoryId } }
  ) {
    edges {
      node {
        id
        title
        slug
        excerpt
        cover_image
        published_at
        author_id
        categories {
          id
          name
          slug
          description
        }
        profiles {
          id
          full_name
          username
          avatar_url
        }
      }
    }
    pageInfo {
      hasNextPage
      hasPreviousPage
    }
  }
}
"#;

fn page_variables(limit: u32, offset: u32, category_id: Option<&str>) -> serde_json::Value {
    match category_id {
        Some(id) => serde_json::json!({ "limit": limit, "offset": offset, "categoryId": id }),
        None => serde_json::json!({ "limit": limit, "offset": offset }),
    }
}

/// Fetch one window of the public post listing.
///
/// `offset` is `(page - 1) * limit`. When `category_id` is given the window
/// is scoped to that category key; the caller is responsible for having
/// resolved the key first (an unresolved slug must never reach this function,
/// or the request would silently widen to the unfiltered feed).
pub async fn fetch_page(
    client: &ApiClient,
    limit: u32,
    offset: u32,
    category_id: Option<&str>,
) -> Result<PostPage, ApiError> {
    let query = match category_id {
        Some(_) => PAGINATED_POSTS_BY_CATEGORY,
        None => PAGINATED_POSTS,
    };

    let collection: Collection<Post> = client
        .query(
            query,
            page_variables(limit, offset, category_id),
            "postsCollection",
        )
        .await?;

    let cursor = collection
        .page_info
        .map(CursorState::from)
        .unwrap_or_default();

    tracing::debug!(
        offset = offset,
        limit = limit,
        category = category_id.unwrap_or("all"),
        rows = collection.edges.len(),
        has_next = cursor.has_next,
        "Fetched post page"
    );

    Ok(PostPage {
        posts: collection.into_nodes(),
        cursor,
    })
}

/// Fetch one window with server-embedded category and profile relations.
///
/// Fails with [`ApiError::RelationshipUnsupported`] when the backend cannot
/// resolve the embeds — callers must treat that as a capability mismatch,
/// not as an empty page.
pub async fn fetch_page_joined(
    client: &ApiClient,
    limit: u32,
    offset: u32,
    category_id: Option<&str>,
) -> Result<JoinedPage, ApiError> {
    let query = match category_id {
        Some(_) => PAGINATED_POSTS_JOINED_BY_CATEGORY,
        None => PAGINATED_POSTS_JOINED,
    };

    let collection: Collection<JoinedPost> = client
        .query(
            query,
            page_variables(limit, offset, category_id),
            "postsCollection",
        )
        .await?;

    let cursor = collection
        .page_info
        .map(CursorState::from)
        .unwrap_or_default();

    Ok(JoinedPage {
        posts: collection.into_nodes(),
        cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(uri: &str) -> ApiClient {
        ApiClient::new(uri, SecretString::from("anon".to_string()), None).unwrap()
    }

    fn post_node(id: &str, published_at: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "node": {
                "id": id,
                "title": format!("Post {id}"),
                "slug": format!("post-{id}"),
                "excerpt": "An excerpt",
                "cover_image": null,
                "published_at": published_at,
                "category_id": "c1",
                "author_id": "a1"
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_page_parses_posts_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql/v1"))
            .and(body_string_contains("GetPaginatedPosts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "postsCollection": {
                        "edges": [
                            post_node("p1", Some("2025-03-04T00:00:00+00:00")),
                            post_node("p2", Some("2025-03-01T00:00:00+00:00"))
                        ],
                        "pageInfo": { "hasNextPage": true, "hasPreviousPage": false }
                    }
                }
            })))
            .mount(&server)
            .await;

        let page = fetch_page(&test_client(&server.uri()), 5, 0, None)
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].id, "p1");
        assert!(page.cursor.has_next);
        assert!(!page.cursor.has_previous);
    }

    #[tokio::test]
    async fn test_fetch_page_sends_category_variable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("GetPaginatedPostsByCategory"))
            .and(body_string_contains("\"categoryId\":\"c9\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "postsCollection": {
                        "edges": [],
                        "pageInfo": { "hasNextPage": false, "hasPreviousPage": false }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = fetch_page(&test_client(&server.uri()), 5, 0, Some("c9"))
            .await
            .unwrap();
        assert!(page.posts.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_page_offset_for_page_two() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"offset\":5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "postsCollection": {
                        "edges": [],
                        "pageInfo": { "hasNextPage": false, "hasPreviousPage": true }
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = fetch_page(&test_client(&server.uri()), 5, 5, None)
            .await
            .unwrap();
        assert!(page.cursor.has_previous);
    }

    #[tokio::test]
    async fn test_fetch_page_joined_embeds_relations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("GetPaginatedPostsJoined"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "postsCollection": {
                        "edges": [{
                            "node": {
                                "id": "p1",
                                "title": "Joined",
                                "slug": "joined",
                                "excerpt": null,
                                "cover_image": null,
                                "published_at": "2025-03-04T00:00:00+00:00",
                                "author_id": "a1",
                                "categories": { "id": "c1", "name": "Design", "slug": "design", "description": null },
                                "profiles": { "id": "a1", "full_name": "Jane Doe", "username": "jane", "avatar_url": null }
                            }
                        }],
                        "pageInfo": { "hasNextPage": false, "hasPreviousPage": false }
                    }
                }
            })))
            .mount(&server)
            .await;

        let page = fetch_page_joined(&test_client(&server.uri()), 5, 0, None)
            .await
            .unwrap();
        assert_eq!(page.posts.len(), 1);
        let post = &page.posts[0];
        assert_eq!(post.categories.as_ref().unwrap().name, "Design");
        assert_eq!(post.profiles.as_ref().unwrap().username.as_deref(), Some("jane"));
    }

    #[tokio::test]
    async fn test_fetch_page_joined_unsupported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errors": [{ "message": "Unknown field 'profiles' on type 'posts'" }]
            })))
            .mount(&server)
            .await;

        let result = fetch_page_joined(&test_client(&server.uri()), 5, 0, None).await;
        assert!(matches!(result, Err(ApiError::RelationshipUnsupported)));
    }
}
