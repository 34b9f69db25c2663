//! State behind the moderation screens: the per-post report menu, admin
//! detail modals and the dashboard counters.

use crate::common::error::ApiError;
use crate::common::models::{Notification, Post, Report, ReportStatus, ReportStatusInfo, User};
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: &'static str,
    pub disabled: bool,
    pub checked: bool,
}

/// The "Report" entry of a post's action menu. A viewer with a pending
/// report on the content sees it disabled and checked.
pub fn report_menu_entry(reports: &[Report], viewer_id: Option<&str>, content_id: &str) -> MenuEntry {
    let already_reported = viewer_id.is_some_and(|viewer| {
        reports.iter().any(|r| {
            r.content_id == content_id && r.reported_by.id() == viewer && r.status == ReportStatus::Pending
        })
    });

    menu_entry(already_reported, viewer_id.is_some())
}

/// Same entry, from the signed-in viewer's own report lookup. `None` means
/// there is no viewer.
pub fn report_menu_entry_for_status(status: Option<&ReportStatusInfo>) -> MenuEntry {
    menu_entry(status.is_some_and(ReportStatusInfo::is_pending), status.is_some())
}

fn menu_entry(already_reported: bool, signed_in: bool) -> MenuEntry {
    if already_reported {
        MenuEntry { label: "Reported", disabled: true, checked: true }
    } else {
        MenuEntry { label: "Report", disabled: !signed_in, checked: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailSource {
    Fetched,
    Summary,
}

/// Content of an admin detail modal.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailModal<T> {
    pub data: T,
    pub source: DetailSource,
}

impl<T> DetailModal<T> {
    /// Uses the fetched detail, or the summary the modal was opened with
    /// when the fetch failed.
    pub fn resolve(fetched: Result<T, ApiError>, summary: T) -> Self {
        match fetched {
            Ok(data) => Self { data, source: DetailSource::Fetched },
            Err(err) => {
                log::warn!("[ADMIN] Detail fetch failed, showing summary: {}", err);
                Self { data: summary, source: DetailSource::Summary }
            }
        }
    }

    pub async fn open<F>(summary: T, fetch: F) -> Self
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        Self::resolve(fetch.await, summary)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == DetailSource::Summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub total_users: u64,
    pub active_users: u64,
    pub admins: u64,
    pub total_posts: u64,
    pub pending_reports: u64,
    pub solved_reports: u64,
    pub rejected_reports: u64,
    pub unread_notifications: u64,
}

impl DashboardStats {
    /// Counts everything from the records passed in. `total_posts` comes
    /// from the paged feed total since posts are not loaded in full.
    pub fn compute(users: &[User], total_posts: u64, reports: &[Report], notifications: &[Notification]) -> Self {
        let count_reports = |status: ReportStatus| reports.iter().filter(|r| r.status == status).count() as u64;
        Self {
            total_users: users.len() as u64,
            active_users: users.iter().filter(|u| u.is_active).count() as u64,
            admins: users.iter().filter(|u| u.is_admin()).count() as u64,
            total_posts,
            pending_reports: count_reports(ReportStatus::Pending),
            solved_reports: count_reports(ReportStatus::Solved),
            rejected_reports: count_reports(ReportStatus::Rejected),
            unread_notifications: notifications.iter().filter(|n| !n.is_read).count() as u64,
        }
    }

    pub fn total_reports(&self) -> u64 {
        self.pending_reports + self.solved_reports + self.rejected_reports
    }
}

/// Posts carrying a report of the given status, for the flagged-posts table.
pub fn flagged_posts(posts: &[Post], status: ReportStatus) -> Vec<&Post> {
    posts
        .iter()
        .filter(|p| p.report_info.as_ref().is_some_and(|info| info.status == status))
        .collect()
}
