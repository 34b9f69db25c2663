use crate::client::models::feed::SortOrder;
use crate::client::models::moderation::{DashboardStats, DetailModal};
use crate::client::services::api::ApiClient;
use crate::client::services::query_cache::QueryCache;
use crate::common::error::ApiError;
use crate::common::models::{
    Ack, NewNotification, NotificationType, Report, ReportStatus, ReportUpdate, User, UserPage,
};

/// Users fetched per request when building the dashboard.
const DASHBOARD_USER_LIMIT: u32 = 100;

/// Moderation operations. Every call checks the cached identity first so a
/// non-admin session fails fast with `Forbidden` instead of hitting the API.
#[derive(Clone)]
pub struct AdminService {
    api: ApiClient,
    cache: Option<QueryCache>,
}

impl AdminService {
    pub fn new(api: ApiClient) -> Self {
        Self { api, cache: None }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn ensure_admin(&self) -> Result<(), ApiError> {
        if self.api.session().is_admin() {
            Ok(())
        } else {
            log::warn!("[ADMIN] Rejected admin call for non-admin session");
            Err(ApiError::Forbidden)
        }
    }

    fn invalidate(&self, prefix: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_prefix(prefix);
        }
    }

    pub async fn reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>, ApiError> {
        self.ensure_admin()?;
        self.api.list_reports(status).await
    }

    pub async fn resolve_report(&self, report_id: &str, response: Option<String>) -> Result<Report, ApiError> {
        self.update_report(report_id, ReportStatus::Solved, response).await
    }

    pub async fn reject_report(&self, report_id: &str, response: Option<String>) -> Result<Report, ApiError> {
        self.update_report(report_id, ReportStatus::Rejected, response).await
    }

    async fn update_report(&self, report_id: &str, status: ReportStatus, response: Option<String>) -> Result<Report, ApiError> {
        self.ensure_admin()?;
        let update = ReportUpdate {
            status,
            admin_response: response.filter(|r| !r.trim().is_empty()),
        };
        let report = self.api.update_report(report_id, &update).await?;
        log::info!("[ADMIN] Report {} marked {}", report_id, status.as_str());
        self.invalidate("reports");
        Ok(report)
    }

    pub async fn users(&self, page: u32, limit: u32) -> Result<UserPage, ApiError> {
        self.ensure_admin()?;
        self.api.list_users(page, limit).await
    }

    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<User, ApiError> {
        self.ensure_admin()?;
        let user = self.api.set_user_active(user_id, is_active).await?;
        log::info!("[ADMIN] User {} active={}", user_id, is_active);
        self.invalidate("users");
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<Ack, ApiError> {
        self.ensure_admin()?;
        let ack = self.api.delete_user(user_id).await?;
        self.invalidate("users");
        Ok(ack)
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<Ack, ApiError> {
        self.ensure_admin()?;
        let ack = self.api.delete_post(post_id).await?;
        self.invalidate("posts");
        Ok(ack)
    }

    /// Sends a system notification to every user.
    pub async fn broadcast(&self, content: &str) -> Result<Ack, ApiError> {
        self.ensure_admin()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::BadRequest("Notification content is required".into()));
        }
        let notification = NewNotification {
            user_id: None,
            kind: NotificationType::System,
            content: content.to_string(),
        };
        self.api.create_notification(&notification).await
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.ensure_admin()?;
        let (users, posts, reports, notifications) = tokio::try_join!(
            self.all_users(),
            self.api.list_posts(1, 1, SortOrder::Newest),
            self.api.list_reports(None),
            self.api.notifications(),
        )?;
        Ok(DashboardStats::compute(&users, posts.total_posts, &reports, &notifications))
    }

    /// Walks every page of the user list so the dashboard counters all
    /// describe the same set of users.
    async fn all_users(&self) -> Result<Vec<User>, ApiError> {
        let first = self.api.list_users(1, DASHBOARD_USER_LIMIT).await?;
        let total_pages = first.total_pages;
        let mut users = first.users;
        for page in 2..=total_pages {
            let next = self.api.list_users(page, DASHBOARD_USER_LIMIT).await?;
            if next.users.is_empty() {
                break;
            }
            users.extend(next.users);
        }
        log::debug!("[ADMIN] Loaded {} users over {} page(s)", users.len(), total_pages.max(1));
        Ok(users)
    }

    /// Detail view of a user; falls back to the row the admin clicked.
    pub async fn user_detail(&self, summary: User) -> DetailModal<User> {
        let id = summary.id.clone();
        DetailModal::open(summary, async {
            self.ensure_admin()?;
            self.api.get_user(&id).await
        })
        .await
    }

    pub async fn report_detail(&self, summary: Report) -> DetailModal<Report> {
        let id = summary.id.clone();
        DetailModal::open(summary, async {
            self.ensure_admin()?;
            self.api.get_report(&id).await
        })
        .await
    }
}
