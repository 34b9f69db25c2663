use super::ApiClient;
use crate::common::error::ApiError;
use crate::common::models::{Ack, NewNotification, Notification};

impl ApiClient {
    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.get("notifications", &[]).await
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<Ack, ApiError> {
        self.put(&format!("notifications/{}/read", notification_id), &serde_json::json!({})).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<Ack, ApiError> {
        self.put("notifications/read-all", &serde_json::json!({})).await
    }

    pub async fn delete_notification(&self, notification_id: &str) -> Result<Ack, ApiError> {
        self.delete(&format!("notifications/{}", notification_id)).await
    }

    pub async fn create_notification(&self, notification: &NewNotification) -> Result<Ack, ApiError> {
        self.post("notifications/create", notification).await
    }
}
