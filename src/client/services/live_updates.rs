//! Reducers for pushed events: presence roster, recent like/comment/post
//! updates and unread notifications.

use crate::client::services::message_parser::{EventKind, LikeEvent, PresenceUser, ServerEvent};
use crate::client::services::websocket_client::{ChannelClient, HandlerId};
use crate::common::models::{Comment, Notification, Post};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Buffered updates older than this many seconds are dropped by `prune`.
pub const MAX_UPDATE_AGE_SECS: i64 = 60 * 60;
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct Buffered<T> {
    pub received_at: DateTime<Utc>,
    pub item: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostChange {
    Created(Post),
    Updated(Post),
    Deleted(String),
}

#[derive(Debug, Default)]
struct LiveInner {
    online: Vec<PresenceUser>,
    likes: Vec<Buffered<LikeEvent>>,
    comments: Vec<Buffered<Comment>>,
    posts: Vec<Buffered<PostChange>>,
    notifications: Vec<Notification>,
}

impl LiveInner {
    fn len(&self) -> usize {
        self.likes.len() + self.comments.len() + self.posts.len() + self.notifications.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveState {
    inner: Arc<Mutex<LiveInner>>,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LiveInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn apply(&self, event: &ServerEvent) {
        self.apply_at(event, Utc::now());
    }

    pub fn apply_at(&self, event: &ServerEvent, now: DateTime<Utc>) {
        let mut inner = self.lock();
        match event {
            ServerEvent::UserOnline(user) => match inner.online.iter().position(|u| u.user_id == user.user_id) {
                Some(pos) => inner.online[pos] = user.clone(),
                None => inner.online.push(user.clone()),
            },
            ServerEvent::UserOffline(user) => inner.online.retain(|u| u.user_id != user.user_id),
            ServerEvent::NewLike(like) => inner.likes.push(Buffered { received_at: now, item: like.clone() }),
            ServerEvent::NewComment(comment) => inner.comments.push(Buffered { received_at: now, item: comment.clone() }),
            ServerEvent::NewPost(post) => inner.posts.push(Buffered { received_at: now, item: PostChange::Created(post.clone()) }),
            ServerEvent::PostUpdated(post) => inner.posts.push(Buffered { received_at: now, item: PostChange::Updated(post.clone()) }),
            ServerEvent::PostDeleted(deleted) => inner.posts.push(Buffered {
                received_at: now,
                item: PostChange::Deleted(deleted.post_id.clone()),
            }),
            ServerEvent::NewNotification(n) => {
                if !inner.notifications.iter().any(|existing| existing.id == n.id) {
                    inner.notifications.push(n.clone());
                }
            }
        }
    }

    /// Drops buffered updates older than one hour and notifications already
    /// read. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - ChronoDuration::seconds(MAX_UPDATE_AGE_SECS);
        let mut inner = self.lock();
        let before = inner.len();
        inner.likes.retain(|b| b.received_at >= cutoff);
        inner.comments.retain(|b| b.received_at >= cutoff);
        inner.posts.retain(|b| b.received_at >= cutoff);
        inner.notifications.retain(|n| !n.is_read);
        before - inner.len()
    }

    /// Prunes on a fixed interval until the handle is aborted.
    pub fn spawn_pruner(&self) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = state.prune(Utc::now());
                if removed > 0 {
                    log::debug!("[LIVE] Pruned {} stale updates", removed);
                }
            }
        })
    }

    /// Registers this state as the reducer for every server event.
    pub fn attach(&self, client: &ChannelClient) -> Vec<(EventKind, HandlerId)> {
        EventKind::ALL
            .into_iter()
            .map(|kind| {
                let state = self.clone();
                (kind, client.on(kind, move |event| state.apply(event)))
            })
            .collect()
    }

    pub fn online_users(&self) -> Vec<PresenceUser> {
        self.lock().online.clone()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.lock().online.iter().any(|u| u.user_id == user_id)
    }

    /// Most recent pushed like count for a piece of content.
    pub fn latest_like_count(&self, content_id: &str) -> Option<u64> {
        self.lock()
            .likes
            .iter()
            .rev()
            .find(|b| b.item.content_id == content_id)
            .map(|b| b.item.like_count)
    }

    pub fn comments_for(&self, post_id: &str) -> Vec<Comment> {
        self.lock()
            .comments
            .iter()
            .filter(|b| b.item.post_id == post_id)
            .map(|b| b.item.clone())
            .collect()
    }

    pub fn post_changes(&self) -> Vec<PostChange> {
        self.lock().posts.iter().map(|b| b.item.clone()).collect()
    }

    pub fn buffered_len(&self) -> usize {
        let inner = self.lock();
        inner.likes.len() + inner.comments.len() + inner.posts.len()
    }

    pub fn notification_count(&self) -> usize {
        self.lock().notifications.len()
    }

    pub fn unread_notifications(&self) -> Vec<Notification> {
        self.lock().notifications.iter().filter(|n| !n.is_read).cloned().collect()
    }

    pub fn mark_notification_read(&self, notification_id: &str) {
        if let Some(n) = self.lock().notifications.iter_mut().find(|n| n.id == notification_id) {
            n.is_read = true;
        }
    }
}
