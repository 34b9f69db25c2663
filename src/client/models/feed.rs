//! Feed page state: sorting, pagination, infinite scroll and search.

use crate::client::services::api::ApiClient;
use crate::client::services::message_parser::ServerEvent;
use crate::common::error::ApiError;
use crate::common::models::{Post, PostPage};
use std::collections::HashSet;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Distance from the bottom, in pixels, at which the next page is requested.
pub const SCROLL_THRESHOLD_PX: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    MostLiked,
    MostViewed,
}

impl SortOrder {
    pub fn as_param(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
            SortOrder::MostLiked => "most_liked",
            SortOrder::MostViewed => "most_viewed",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "new" => Ok(SortOrder::Newest),
            "oldest" | "old" => Ok(SortOrder::Oldest),
            "most_liked" | "liked" | "popular" => Ok(SortOrder::MostLiked),
            "most_viewed" | "viewed" => Ok(SortOrder::MostViewed),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Number of pages the pagination bar shows. Always at least one.
pub fn page_count(total_pages: u32) -> u32 {
    total_pages.max(1)
}

/// Page numbers to render around `current`, at most `width` of them.
pub fn page_window(current: u32, total_pages: u32, width: u32) -> Vec<u32> {
    let total = page_count(total_pages);
    let width = width.clamp(1, total);
    let current = current.clamp(1, total);
    let half = width / 2;
    let mut start = current.saturating_sub(half).max(1);
    if start + width - 1 > total {
        start = total + 1 - width;
    }
    (start..start + width).collect()
}

pub fn should_load_more(scroll_top: f64, viewport_height: f64, content_height: f64, threshold_px: f64) -> bool {
    scroll_top + viewport_height >= content_height - threshold_px
}

/// Trimmed search text, or `None` when nothing is left to search for.
pub fn normalize_query(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results(Vec<Post>),
    NoResults,
}

impl SearchOutcome {
    pub fn from_posts(posts: Vec<Post>) -> Self {
        if posts.is_empty() {
            SearchOutcome::NoResults
        } else {
            SearchOutcome::Results(posts)
        }
    }

    pub fn empty_state_message(&self) -> Option<&'static str> {
        match self {
            SearchOutcome::NoResults => Some("No results found"),
            SearchOutcome::Results(_) => None,
        }
    }
}

pub async fn search(api: &ApiClient, raw_query: &str) -> Result<SearchOutcome, ApiError> {
    let posts = api.search_posts(raw_query).await?;
    Ok(SearchOutcome::from_posts(posts))
}

/// Posts accumulated for infinite scroll, de-duplicated by id.
#[derive(Debug, Clone)]
pub struct FeedState {
    posts: Vec<Post>,
    seen: HashSet<String>,
    sort: SortOrder,
    page_size: u32,
    loaded_page: u32,
    total_pages: u32,
    is_loading: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(SortOrder::default(), DEFAULT_PAGE_SIZE)
    }
}

impl FeedState {
    pub fn new(sort: SortOrder, page_size: u32) -> Self {
        Self {
            posts: Vec::new(),
            seen: HashSet::new(),
            sort,
            page_size: page_size.max(1),
            loaded_page: 0,
            total_pages: 1,
            is_loading: false,
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn has_more(&self) -> bool {
        self.loaded_page < page_count(self.total_pages)
    }

    pub fn total_pages(&self) -> u32 {
        page_count(self.total_pages)
    }

    /// Start over with a different sort order.
    pub fn reset(&mut self, sort: SortOrder) {
        *self = Self::new(sort, self.page_size);
    }

    /// Claims the next page to fetch. `None` while a load is running or when
    /// every page is already loaded.
    pub fn begin_next_page(&mut self) -> Option<u32> {
        if self.is_loading || !self.has_more() {
            return None;
        }
        self.is_loading = true;
        Some(self.loaded_page + 1)
    }

    /// Appends a fetched page and returns how many new posts it added.
    pub fn absorb(&mut self, page: PostPage) -> usize {
        self.is_loading = false;
        self.total_pages = page.total_pages;
        self.loaded_page = page.current_page.max(self.loaded_page + 1);
        let mut added = 0;
        for post in page.posts {
            if self.seen.insert(post.id.clone()) {
                self.posts.push(post);
                added += 1;
            }
        }
        added
    }

    pub fn fail(&mut self) {
        self.is_loading = false;
    }

    pub async fn load_next(&mut self, api: &ApiClient) -> Result<usize, ApiError> {
        let Some(page) = self.begin_next_page() else {
            return Ok(0);
        };
        match api.list_posts(page, self.page_size, self.sort).await {
            Ok(result) => Ok(self.absorb(result)),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Folds a live post event into the feed. Returns true if the feed changed.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::NewPost(post) => {
                if !self.seen.insert(post.id.clone()) {
                    return false;
                }
                match self.sort {
                    SortOrder::Newest => self.posts.insert(0, post.clone()),
                    _ => self.posts.push(post.clone()),
                }
                true
            }
            ServerEvent::PostUpdated(post) => match self.posts.iter_mut().find(|p| p.id == post.id) {
                Some(existing) => {
                    *existing = post.clone();
                    true
                }
                None => false,
            },
            ServerEvent::PostDeleted(deleted) => {
                let before = self.posts.len();
                self.posts.retain(|p| p.id != deleted.post_id);
                self.seen.remove(&deleted.post_id);
                before != self.posts.len()
            }
            ServerEvent::NewLike(like) => match self.posts.iter_mut().find(|p| p.id == like.content_id) {
                Some(post) => {
                    post.like_count = like.like_count;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::message_parser::PostDeleted;
    use crate::common::models::AuthorRef;

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            title: format!("title {}", id),
            content: "body".into(),
            user_id: AuthorRef::Id("u1".into()),
            tags: vec![],
            image: None,
            like_count: 0,
            view_count: 0,
            report_info: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn page(ids: &[&str], current: u32, total: u32) -> PostPage {
        PostPage {
            posts: ids.iter().map(|id| post(id)).collect(),
            total_pages: total,
            current_page: current,
            total_posts: ids.len() as u64,
        }
    }

    #[test]
    fn zero_total_pages_still_renders_one_page() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(7), 7);
        assert_eq!(page_window(1, 0, 5), vec![1]);
    }

    #[test]
    fn page_window_stays_in_bounds() {
        assert_eq!(page_window(1, 10, 5), vec![1, 2, 3, 4, 5]);
        assert_eq!(page_window(6, 10, 5), vec![4, 5, 6, 7, 8]);
        assert_eq!(page_window(10, 10, 5), vec![6, 7, 8, 9, 10]);
        assert_eq!(page_window(2, 3, 5), vec![1, 2, 3]);
    }

    #[test]
    fn scroll_threshold() {
        assert!(should_load_more(800.0, 600.0, 1500.0, SCROLL_THRESHOLD_PX));
        assert!(!should_load_more(100.0, 600.0, 1500.0, SCROLL_THRESHOLD_PX));
    }

    #[test]
    fn normalize_query_trims() {
        assert_eq!(normalize_query("  rust  ").as_deref(), Some("rust"));
        assert_eq!(normalize_query("   "), None);
    }

    #[test]
    fn sort_order_parses_cli_names() {
        assert_eq!("popular".parse::<SortOrder>().unwrap(), SortOrder::MostLiked);
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn absorb_deduplicates_across_pages() {
        let mut feed = FeedState::new(SortOrder::Newest, 2);
        assert_eq!(feed.begin_next_page(), Some(1));
        assert_eq!(feed.begin_next_page(), None, "second claim while loading");
        assert_eq!(feed.absorb(page(&["a", "b"], 1, 2)), 2);
        assert!(feed.has_more());

        assert_eq!(feed.begin_next_page(), Some(2));
        assert_eq!(feed.absorb(page(&["b", "c"], 2, 2)), 1);
        assert!(!feed.has_more());
        assert_eq!(feed.begin_next_page(), None);
        let ids: Vec<_> = feed.posts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_feed_has_no_more_pages_after_first_load() {
        let mut feed = FeedState::default();
        feed.begin_next_page();
        feed.absorb(page(&[], 1, 0));
        assert!(!feed.has_more());
        assert_eq!(feed.total_pages(), 1);
    }

    #[test]
    fn live_events_update_the_feed() {
        let mut feed = FeedState::default();
        feed.begin_next_page();
        feed.absorb(page(&["a"], 1, 1));

        assert!(feed.apply_event(&ServerEvent::NewPost(post("z"))));
        assert_eq!(feed.posts()[0].id, "z");
        assert!(!feed.apply_event(&ServerEvent::NewPost(post("z"))));

        assert!(feed.apply_event(&ServerEvent::PostDeleted(PostDeleted { post_id: "a".into() })));
        assert_eq!(feed.posts().len(), 1);
    }

    #[test]
    fn search_outcome_reports_empty_state() {
        let outcome = SearchOutcome::from_posts(vec![]);
        assert_eq!(outcome, SearchOutcome::NoResults);
        assert_eq!(outcome.empty_state_message(), Some("No results found"));
    }
}
