use super::ApiClient;
use crate::client::models::feed::{normalize_query, SortOrder};
use crate::common::error::ApiError;
use crate::common::models::{Ack, NewPost, Post, PostPage, SearchResults};

impl ApiClient {
    pub async fn list_posts(&self, page: u32, limit: u32, sort: SortOrder) -> Result<PostPage, ApiError> {
        let query = [
            ("page", page.max(1).to_string()),
            ("limit", limit.to_string()),
            ("sort", sort.as_param().to_string()),
        ];
        self.get("posts", &query).await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post, ApiError> {
        self.get(&format!("posts/{}", post_id), &[]).await
    }

    /// Searches posts by free text. The query is trimmed first and an empty
    /// query never reaches the network.
    pub async fn search_posts(&self, raw_query: &str) -> Result<Vec<Post>, ApiError> {
        let query = normalize_query(raw_query)
            .ok_or_else(|| ApiError::BadRequest("Search query cannot be empty".to_string()))?;
        let results: SearchResults = self.get("posts/search", &[("q", query)]).await?;
        Ok(results.posts)
    }

    pub async fn posts_by_user(&self, user_id: &str) -> Result<Vec<Post>, ApiError> {
        self.get(&format!("posts/user/{}", user_id), &[]).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post, ApiError> {
        self.post("posts/create", post).await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<Ack, ApiError> {
        self.delete(&format!("posts/{}", post_id)).await
    }
}
