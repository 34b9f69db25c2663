//! Optimistic like/save/report/comment mutations for a single post.
//!
//! Every mutation runs the same steps: patch local state, issue exactly one
//! REST call, then reconcile with what the server returned. A failure
//! applies the inverse patch, except 409 Conflict which means the server
//! already holds the relation, so the status is refetched instead.

use crate::client::services::api::ApiClient;
use crate::client::services::query_cache::{QueryCache, QueryKey};
use crate::common::error::ApiError;
use crate::common::models::{ContentType, NewComment, NewReport};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionState {
    pub is_liked: bool,
    pub like_count: u64,
    pub is_saved: bool,
    pub is_reported: bool,
    pub comment_count: u64,
}

/// Like and Unlike share a guard, as do Save and Unsave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Like,
    Save,
    Report,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Like,
    Unlike,
    Save,
    Unsave,
    Report(NewReport),
    Comment(NewComment),
}

impl Mutation {
    pub fn kind(&self) -> ActionKind {
        match self {
            Mutation::Like | Mutation::Unlike => ActionKind::Like,
            Mutation::Save | Mutation::Unsave => ActionKind::Save,
            Mutation::Report(_) => ActionKind::Report,
            Mutation::Comment(_) => ActionKind::Comment,
        }
    }

    /// True when the state already reflects this mutation.
    pub fn is_redundant(&self, state: &InteractionState) -> bool {
        match self {
            Mutation::Like => state.is_liked,
            Mutation::Unlike => !state.is_liked,
            Mutation::Save => state.is_saved,
            Mutation::Unsave => !state.is_saved,
            Mutation::Report(_) => state.is_reported,
            Mutation::Comment(_) => false,
        }
    }

    pub fn apply(&self, state: &mut InteractionState) {
        match self {
            Mutation::Like => {
                state.is_liked = true;
                state.like_count += 1;
            }
            Mutation::Unlike => {
                state.is_liked = false;
                state.like_count = state.like_count.saturating_sub(1);
            }
            Mutation::Save => state.is_saved = true,
            Mutation::Unsave => state.is_saved = false,
            Mutation::Report(_) => state.is_reported = true,
            Mutation::Comment(_) => state.comment_count += 1,
        }
    }

    pub fn revert(&self, state: &mut InteractionState) {
        match self {
            Mutation::Like => {
                state.is_liked = false;
                state.like_count = state.like_count.saturating_sub(1);
            }
            Mutation::Unlike => {
                state.is_liked = true;
                state.like_count += 1;
            }
            Mutation::Save => state.is_saved = false,
            Mutation::Unsave => state.is_saved = true,
            Mutation::Report(_) => state.is_reported = false,
            Mutation::Comment(_) => state.comment_count = state.comment_count.saturating_sub(1),
        }
    }
}

pub fn like_status_key(post_id: &str) -> QueryKey {
    QueryKey::new(format!("likes/status/{}/{}", ContentType::Post, post_id))
}

pub fn save_status_key(post_id: &str) -> QueryKey {
    QueryKey::new(format!("saves/status/{}", post_id))
}

pub fn report_status_key(post_id: &str) -> QueryKey {
    QueryKey::new(format!("reports/status/{}/{}", ContentType::Post, post_id))
}

pub fn comments_key(post_id: &str) -> QueryKey {
    QueryKey::new(format!("comments/post/{}", post_id))
}

/// Owner of the interaction state of one post.
pub struct PostInteractions {
    post_id: String,
    state: Mutex<InteractionState>,
    in_flight: Mutex<HashSet<ActionKind>>,
}

/// Releases the in-flight slot of an action when dropped.
struct InFlightGuard<'a> {
    owner: &'a PostInteractions,
    kind: ActionKind,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = match self.owner.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.remove(&self.kind);
    }
}

impl PostInteractions {
    pub fn new(post_id: impl Into<String>, initial: InteractionState) -> Self {
        Self {
            post_id: post_id.into(),
            state: Mutex::new(initial),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    fn lock_state(&self) -> MutexGuard<'_, InteractionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> InteractionState {
        *self.lock_state()
    }

    pub fn is_pending(&self, kind: ActionKind) -> bool {
        match self.in_flight.lock() {
            Ok(guard) => guard.contains(&kind),
            Err(poisoned) => poisoned.into_inner().contains(&kind),
        }
    }

    fn begin(&self, kind: ActionKind) -> Option<InFlightGuard<'_>> {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !in_flight.insert(kind) {
            return None;
        }
        Some(InFlightGuard { owner: self, kind })
    }

    /// Loads the canonical state from the server, through the cache when one is given.
    pub async fn load(api: &ApiClient, cache: Option<&QueryCache>, post_id: &str) -> Result<Self, ApiError> {
        let this = Self::new(post_id, InteractionState::default());
        this.refresh(api, cache).await?;
        Ok(this)
    }

    /// Replaces local state with the server's view.
    pub async fn refresh(&self, api: &ApiClient, cache: Option<&QueryCache>) -> Result<InteractionState, ApiError> {
        let id = self.post_id.as_str();
        let like_key = like_status_key(id);
        let save_key = save_status_key(id);
        let report_key = report_status_key(id);
        let comment_list_key = comments_key(id);
        let (like, save, report, comments) = match cache {
            Some(cache) => tokio::try_join!(
                cache.get_or_fetch(&like_key, || {
                    let api = api.clone();
                    let id = id.to_string();
                    async move { api.like_status(ContentType::Post, &id).await }
                }),
                cache.get_or_fetch(&save_key, || {
                    let api = api.clone();
                    let id = id.to_string();
                    async move { api.save_status(&id).await }
                }),
                cache.get_or_fetch(&report_key, || {
                    let api = api.clone();
                    let id = id.to_string();
                    async move { api.report_status(ContentType::Post, &id).await }
                }),
                cache.get_or_fetch(&comment_list_key, || {
                    let api = api.clone();
                    let id = id.to_string();
                    async move { api.comments_for_post(&id).await }
                }),
            )?,
            None => tokio::try_join!(
                api.like_status(ContentType::Post, id),
                api.save_status(id),
                api.report_status(ContentType::Post, id),
                api.comments_for_post(id),
            )?,
        };

        let mut state = self.lock_state();
        *state = InteractionState {
            is_liked: like.liked,
            like_count: like.like_count,
            is_saved: save.saved,
            is_reported: report.is_pending(),
            comment_count: comments.len() as u64,
        };
        Ok(*state)
    }

    /// Runs one optimistic mutation. A second mutation of the same kind
    /// while one is pending is rejected with [`ApiError::Busy`]; a mutation
    /// the state already reflects returns without a network call.
    pub async fn execute(
        &self,
        api: &ApiClient,
        cache: Option<&QueryCache>,
        mutation: Mutation,
    ) -> Result<InteractionState, ApiError> {
        let kind = mutation.kind();
        let _guard = self.begin(kind).ok_or(ApiError::Busy)?;

        {
            let mut state = self.lock_state();
            if mutation.is_redundant(&state) {
                log::debug!("[INTERACT] {:?} on {} already applied", kind, self.post_id);
                return Ok(*state);
            }
            mutation.apply(&mut state);
        }

        match self.send(api, &mutation).await {
            Ok(server_count) => {
                if let Some(count) = server_count {
                    self.lock_state().like_count = count;
                }
                if let Some(cache) = cache {
                    self.invalidate(cache, kind);
                }
                Ok(self.state())
            }
            Err(err) if err.is_conflict() => {
                log::info!("[INTERACT] {:?} on {} conflicted, reconciling", kind, self.post_id);
                if let Some(cache) = cache {
                    self.invalidate(cache, kind);
                }
                match self.reconcile(api, kind).await {
                    Ok(state) => Ok(state),
                    Err(refetch_err) => {
                        log::warn!("[INTERACT] Reconcile of {} failed: {}", self.post_id, refetch_err);
                        Ok(self.state())
                    }
                }
            }
            Err(err) => {
                log::warn!("[INTERACT] {:?} on {} failed, reverting: {}", kind, self.post_id, err);
                mutation.revert(&mut self.lock_state());
                Err(err)
            }
        }
    }

    /// Issues the single REST call for a mutation. Returns the server's
    /// like count when the response carries one.
    async fn send(&self, api: &ApiClient, mutation: &Mutation) -> Result<Option<u64>, ApiError> {
        let id = self.post_id.as_str();
        match mutation {
            Mutation::Like => Ok(api.like(ContentType::Post, id).await?.like_count),
            Mutation::Unlike => Ok(api.unlike(ContentType::Post, id).await?.like_count),
            Mutation::Save => api.save_post(id).await.map(|_| None),
            Mutation::Unsave => api.unsave_post(id).await.map(|_| None),
            Mutation::Report(report) => api.create_report(report).await.map(|_| None),
            Mutation::Comment(comment) => api.create_comment(comment).await.map(|_| None),
        }
    }

    async fn reconcile(&self, api: &ApiClient, kind: ActionKind) -> Result<InteractionState, ApiError> {
        let id = self.post_id.as_str();
        match kind {
            ActionKind::Like => {
                let status = api.like_status(ContentType::Post, id).await?;
                let mut state = self.lock_state();
                state.is_liked = status.liked;
                state.like_count = status.like_count;
                Ok(*state)
            }
            ActionKind::Save => {
                let status = api.save_status(id).await?;
                let mut state = self.lock_state();
                state.is_saved = status.saved;
                Ok(*state)
            }
            ActionKind::Report => {
                let status = api.report_status(ContentType::Post, id).await?;
                let mut state = self.lock_state();
                state.is_reported = status.is_pending();
                Ok(*state)
            }
            ActionKind::Comment => {
                let comments = api.comments_for_post(id).await?;
                let mut state = self.lock_state();
                state.comment_count = comments.len() as u64;
                Ok(*state)
            }
        }
    }

    fn invalidate(&self, cache: &QueryCache, kind: ActionKind) {
        let id = self.post_id.as_str();
        match kind {
            ActionKind::Like => {
                cache.invalidate(&like_status_key(id));
                cache.invalidate_prefix(&format!("posts/{}", id));
            }
            ActionKind::Save => {
                cache.invalidate(&save_status_key(id));
                cache.invalidate_prefix("saves/user");
            }
            ActionKind::Report => {
                cache.invalidate(&report_status_key(id));
                cache.invalidate_prefix("reports");
            }
            ActionKind::Comment => cache.invalidate(&comments_key(id)),
        }
    }

    /// Applies a like count pushed over the real-time channel.
    pub fn apply_remote_like_count(&self, like_count: u64) {
        self.lock_state().like_count = like_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> NewReport {
        NewReport {
            content_type: ContentType::Post,
            content_id: "p1".into(),
            reason: "spam".into(),
            details: None,
        }
    }

    #[test]
    fn revert_undoes_apply() {
        let start = InteractionState { like_count: 4, comment_count: 2, ..Default::default() };
        let mutations = [
            Mutation::Like,
            Mutation::Save,
            Mutation::Report(report()),
            Mutation::Comment(NewComment { post_id: "p1".into(), content: "hi".into() }),
        ];
        for m in mutations {
            let mut state = start;
            m.apply(&mut state);
            assert_ne!(state, start, "{:?} changed nothing", m);
            m.revert(&mut state);
            assert_eq!(state, start, "{:?} did not revert", m);
        }
    }

    #[test]
    fn redundant_mutations_are_detected() {
        let liked = InteractionState { is_liked: true, like_count: 1, ..Default::default() };
        assert!(Mutation::Like.is_redundant(&liked));
        assert!(!Mutation::Unlike.is_redundant(&liked));
        assert!(Mutation::Unsave.is_redundant(&liked));
        assert_eq!(Mutation::Unlike.kind(), Mutation::Like.kind());
    }

    #[test]
    fn unlike_never_underflows() {
        let mut state = InteractionState { is_liked: true, like_count: 0, ..Default::default() };
        Mutation::Unlike.apply(&mut state);
        assert_eq!(state.like_count, 0);
    }

    #[test]
    fn in_flight_guard_blocks_same_kind_only() {
        let post = PostInteractions::new("p1", InteractionState::default());
        let first = post.begin(ActionKind::Like);
        assert!(first.is_some());
        assert!(post.begin(ActionKind::Like).is_none());
        assert!(post.begin(ActionKind::Save).is_some());
        assert!(post.is_pending(ActionKind::Like));
        drop(first);
        assert!(!post.is_pending(ActionKind::Like));
    }
}
