use super::ApiClient;
use crate::common::error::ApiError;
use crate::common::models::{Ack, ContentType, LikeRequest, LikeStatus, Post, SaveRequest, SaveStatus};

impl ApiClient {
    pub async fn like(&self, content_type: ContentType, content_id: &str) -> Result<Ack, ApiError> {
        let body = LikeRequest {
            content_id: content_id.to_string(),
            content_type,
        };
        self.post("likes/create", &body).await
    }

    pub async fn unlike(&self, content_type: ContentType, content_id: &str) -> Result<Ack, ApiError> {
        self.delete(&format!("likes/{}/{}", content_type, content_id)).await
    }

    pub async fn like_status(&self, content_type: ContentType, content_id: &str) -> Result<LikeStatus, ApiError> {
        self.get(&format!("likes/status/{}/{}", content_type, content_id), &[]).await
    }

    pub async fn save_post(&self, post_id: &str) -> Result<Ack, ApiError> {
        self.post("saves/create", &SaveRequest { post_id: post_id.to_string() }).await
    }

    pub async fn unsave_post(&self, post_id: &str) -> Result<Ack, ApiError> {
        self.delete(&format!("saves/{}", post_id)).await
    }

    pub async fn save_status(&self, post_id: &str) -> Result<SaveStatus, ApiError> {
        self.get(&format!("saves/status/{}", post_id), &[]).await
    }

    pub async fn saved_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.get("saves/user", &[]).await
    }
}
