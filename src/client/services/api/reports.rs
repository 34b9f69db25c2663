use super::ApiClient;
use crate::common::error::ApiError;
use crate::common::models::{ContentType, NewReport, Report, ReportStatus, ReportStatusInfo, ReportUpdate};

impl ApiClient {
    pub async fn create_report(&self, report: &NewReport) -> Result<Report, ApiError> {
        self.post("reports/create", report).await
    }

    pub async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>, ApiError> {
        let query: Vec<(&str, String)> = status
            .map(|s| vec![("status", s.as_str().to_string())])
            .unwrap_or_default();
        self.get("reports", &query).await
    }

    pub async fn get_report(&self, report_id: &str) -> Result<Report, ApiError> {
        self.get(&format!("reports/{}", report_id), &[]).await
    }

    pub async fn update_report(&self, report_id: &str, update: &ReportUpdate) -> Result<Report, ApiError> {
        self.put(&format!("reports/{}", report_id), update).await
    }

    /// Whether the signed-in user already reported this content.
    pub async fn report_status(&self, content_type: ContentType, content_id: &str) -> Result<ReportStatusInfo, ApiError> {
        self.get(&format!("reports/status/{}/{}", content_type, content_id), &[]).await
    }
}
