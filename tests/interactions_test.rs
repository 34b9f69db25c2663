mod common;

use common::{signed_in, user};
use empathy_client::client::services::interactions::{InteractionState, Mutation, PostInteractions};
use empathy_client::client::services::query_cache::QueryCache;
use empathy_client::common::error::ApiError;
use empathy_client::common::models::{ContentType, NewReport, Role};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unliked(count: u64) -> PostInteractions {
    PostInteractions::new("p1", InteractionState { like_count: count, ..Default::default() })
}

#[tokio::test]
async fn like_issues_one_request_and_increments_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/likes/create"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({ "content_id": "p1", "content_type": "post" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "message": "Liked" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let post = unliked(4);
    let state = post.execute(&api, None, Mutation::Like).await.unwrap();

    assert!(state.is_liked);
    assert_eq!(state.like_count, 5);
    assert_eq!(post.state(), state);
}

#[tokio::test]
async fn server_count_wins_over_optimistic_guess() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/likes/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "like_count": 12 })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let state = unliked(4).execute(&api, None, Mutation::Like).await.unwrap();
    assert_eq!(state.like_count, 12);
}

#[tokio::test]
async fn failed_like_is_reverted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/likes/create"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "db down" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let post = unliked(4);
    let err = post.execute(&api, None, Mutation::Like).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(post.state(), InteractionState { like_count: 4, ..Default::default() });
}

#[tokio::test]
async fn conflict_reconciles_from_server_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/likes/create"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "message": "Already liked" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/likes/status/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "liked": true, "like_count": 9 })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let post = unliked(4);
    let state = post.execute(&api, None, Mutation::Like).await.unwrap();

    assert!(state.is_liked);
    assert_eq!(state.like_count, 9);
}

#[tokio::test]
async fn second_identical_action_is_rejected_while_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/saves/create"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let post = unliked(0);
    let (first, second) = tokio::join!(
        post.execute(&api, None, Mutation::Save),
        post.execute(&api, None, Mutation::Save),
    );

    assert!(first.unwrap().is_saved);
    assert_eq!(second.unwrap_err(), ApiError::Busy);
}

#[tokio::test]
async fn redundant_mutation_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let state = unliked(3).execute(&api, None, Mutation::Unlike).await.unwrap();
    assert_eq!(state.like_count, 3);
}

async fn mount_status_mocks(server: &MockServer, like_status_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/likes/status/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "liked": false, "like_count": 2 })))
        .expect(like_status_calls)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/saves/status/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "saved": true })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports/status/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reported": false })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/comments/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn status_reads_share_the_cache() {
    let server = MockServer::start().await;
    mount_status_mocks(&server, 1).await;

    let api = signed_in(&server, user("u1", Role::User));
    let cache = QueryCache::new(Duration::from_secs(60));

    let (a, b) = tokio::join!(
        PostInteractions::load(&api, Some(&cache), "p1"),
        PostInteractions::load(&api, Some(&cache), "p1"),
    );
    let a = a.unwrap().state();
    assert_eq!(a, b.unwrap().state());
    assert_eq!(a, InteractionState { like_count: 2, is_saved: true, ..Default::default() });
}

#[tokio::test]
async fn mutation_invalidates_related_cache_entries() {
    let server = MockServer::start().await;
    mount_status_mocks(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/api/likes/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let cache = QueryCache::new(Duration::from_secs(60));

    let post = PostInteractions::load(&api, Some(&cache), "p1").await.unwrap();
    post.execute(&api, Some(&cache), Mutation::Like).await.unwrap();
    // Only the like status is refetched; the other lookups stay cached.
    let refreshed = post.refresh(&api, Some(&cache)).await.unwrap();
    assert_eq!(refreshed.like_count, 2);
}

#[tokio::test]
async fn rejected_report_does_not_block_a_new_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/likes/status/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "liked": false, "like_count": 0 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/saves/status/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "saved": false })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reports/status/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reported": true, "status": "rejected" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/comments/post/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/reports/create"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_id": "r2", "content_type": "post", "content_id": "p1", "reported_by": "u1",
            "reason": "spam", "status": "pending"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = signed_in(&server, user("u1", Role::User));
    let post = PostInteractions::load(&api, None, "p1").await.unwrap();
    assert!(!post.state().is_reported);

    let report = NewReport {
        content_type: ContentType::Post,
        content_id: "p1".into(),
        reason: "spam".into(),
        details: None,
    };
    let state = post.execute(&api, None, Mutation::Report(report)).await.unwrap();
    assert!(state.is_reported);
}
