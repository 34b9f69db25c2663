use super::ApiClient;
use crate::common::error::ApiError;
use crate::common::models::{Ack, NewRating, SettingsUpdate, User, UserPage, UserStatusUpdate};

impl ApiClient {
    pub async fn list_users(&self, page: u32, limit: u32) -> Result<UserPage, ApiError> {
        let query = [("page", page.max(1).to_string()), ("limit", limit.to_string())];
        self.get("users", &query).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        self.get(&format!("users/{}", user_id), &[]).await
    }

    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<User, ApiError> {
        self.put(&format!("users/{}/status", user_id), &UserStatusUpdate { is_active }).await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<Ack, ApiError> {
        self.delete(&format!("users/{}", user_id)).await
    }

    pub async fn settings(&self, user_id: &str) -> Result<User, ApiError> {
        self.get(&format!("settings/{}", user_id), &[]).await
    }

    /// Saves profile settings and refreshes the cached identity when the
    /// signed-in user edited their own profile.
    pub async fn update_settings(&self, user_id: &str, update: &SettingsUpdate) -> Result<User, ApiError> {
        let user: User = self.put(&format!("settings/{}", user_id), update).await?;
        if self.session.user_id().as_deref() == Some(user.id.as_str()) {
            if let Err(e) = self.session.update_user(&user) {
                log::warn!("[API] Could not refresh cached profile: {}", e);
            }
        }
        Ok(user)
    }

    pub async fn submit_rating(&self, rating: &NewRating) -> Result<Ack, ApiError> {
        self.post("ratings", rating).await
    }
}
