use super::ApiClient;
use crate::common::error::ApiError;
use crate::common::models::{Ack, Comment, NewComment};

impl ApiClient {
    pub async fn comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.get(&format!("comments/post/{}", post_id), &[]).await
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        self.post("comments/create", comment).await
    }

    pub async fn delete_comment(&self, comment_id: &str) -> Result<Ack, ApiError> {
        self.delete(&format!("comments/{}", comment_id)).await
    }
}
