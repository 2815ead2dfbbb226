//! Feed, follow and post services driven over the in-memory store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::field::{Field, Visit};
use tracing_subscriber::{Layer, layer::Context, prelude::*};

use scribbly::application::{
    auth::{AuthError, AuthService, CreateUserCommand, Viewer},
    feed::FeedError,
    follows::{FollowError, FollowOutcome},
    pagination::PageRequest,
    posts::{
        COMMENT_TEXT_REQUIRED, GROUP_INVALID_CHOICE, IMAGE_INVALID, ImageUpload,
        POST_TEXT_REQUIRED, PostDraft, PostError,
    },
};

use support::TestApp;

fn draft(text: &str) -> PostDraft {
    PostDraft {
        text: text.to_string(),
        ..PostDraft::default()
    }
}

#[tokio::test]
async fn created_post_shows_up_in_every_matching_feed() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    let cats = app.store.seed_group("Cats", "cats").await;

    let post = app
        .state
        .posts
        .create_post(
            &leo,
            PostDraft {
                text: "A cat sat".into(),
                group: cats.id.to_string(),
                image: None,
            },
        )
        .await
        .expect("create post");

    let feed = &app.state.feed;
    let global = feed.global_feed(PageRequest::first()).await.unwrap();
    assert_eq!(global.items[0].id, post.id);

    let profile = feed.profile_feed("leo", PageRequest::first()).await.unwrap();
    assert_eq!(profile.page.items[0].id, post.id);

    let group = feed.group_feed("cats", PageRequest::first()).await.unwrap();
    assert_eq!(group.page.items[0].id, post.id);
    assert_eq!(group.group.title, "Cats");
}

#[tokio::test]
async fn feeds_are_newest_first_and_paginated() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    for n in 1..=7 {
        app.store.seed_post(&leo, &format!("post {n}")).await;
    }

    let feed = &app.state.feed;
    let first = feed.global_feed(PageRequest::first()).await.unwrap();
    assert_eq!(first.items.len(), 5);
    assert_eq!(first.items[0].text, "post 7");
    assert_eq!(first.num_pages, 2);
    assert!(first.has_next());

    let second = feed.global_feed(PageRequest::number(2)).await.unwrap();
    assert_eq!(second.items.len(), 2);
    assert_eq!(second.items[1].text, "post 1");

    // Out-of-range pages clamp to the last page.
    let clamped = feed
        .global_feed(PageRequest::from_query(Some("99")))
        .await
        .unwrap();
    assert_eq!(clamped.number, 2);
    assert_eq!(clamped.items, second.items);
}

#[tokio::test]
async fn unknown_group_and_author_are_not_found() {
    let app = TestApp::new();
    let feed = &app.state.feed;

    assert!(matches!(
        feed.group_feed("nope", PageRequest::first()).await,
        Err(FeedError::NotFound { entity: "group" })
    ));
    assert!(matches!(
        feed.profile_feed("ghost", PageRequest::first()).await,
        Err(FeedError::NotFound { entity: "user" })
    ));
}

#[tokio::test]
async fn post_detail_requires_matching_author() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_user("anna").await;
    let post = app.store.seed_post(&leo, "mine").await;

    let detail = app.state.feed.post_detail("leo", post.id).await.unwrap();
    assert_eq!(detail.post.id, post.id);
    assert!(detail.comments.is_empty());

    assert!(matches!(
        app.state.feed.post_detail("anna", post.id).await,
        Err(FeedError::NotFound { entity: "post" })
    ));
}

#[tokio::test]
async fn follow_is_idempotent_and_self_follow_is_ignored() {
    let app = TestApp::new();
    let reader = app.store.seed_user("reader").await;
    app.store.seed_user("leo").await;
    let follows = &app.state.follows;

    assert_eq!(follows.follow(&reader, "leo").await.unwrap(), FollowOutcome::Created);
    assert_eq!(
        follows.follow(&reader, "leo").await.unwrap(),
        FollowOutcome::AlreadyFollowing
    );
    assert_eq!(app.store.follow_count().await, 1);

    assert_eq!(
        follows.follow(&reader, "reader").await.unwrap(),
        FollowOutcome::SelfFollowIgnored
    );
    assert_eq!(app.store.follow_count().await, 1);

    assert!(matches!(
        follows.follow(&reader, "ghost").await,
        Err(FollowError::UnknownUser(_))
    ));
}

#[tokio::test]
async fn unfollow_removes_posts_from_follow_feed() {
    let app = TestApp::new();
    let reader = app.store.seed_user("reader").await;
    let leo = app.store.seed_user("leo").await;
    let anna = app.store.seed_user("anna").await;
    app.store.seed_post(&leo, "from leo").await;
    app.store.seed_post(&anna, "from anna").await;

    assert!(matches!(
        app.state.follows.unfollow(&reader, "leo").await,
        Err(FollowError::NotFollowing(_))
    ));

    app.state.follows.follow(&reader, "leo").await.unwrap();
    let viewer = Viewer::User(reader.clone());
    let feed = app
        .state
        .feed
        .follow_feed(&viewer, PageRequest::first())
        .await
        .unwrap();
    assert_eq!(feed.items.len(), 1);
    assert_eq!(feed.items[0].author.username, "leo");

    app.state.follows.unfollow(&reader, "leo").await.unwrap();
    let feed = app
        .state
        .feed
        .follow_feed(&viewer, PageRequest::first())
        .await
        .unwrap();
    assert!(feed.items.is_empty());
    assert_eq!(feed.num_pages, 1);

    assert!(matches!(
        app.state
            .feed
            .follow_feed(&Viewer::Anonymous, PageRequest::first())
            .await,
        Err(FeedError::Unauthorized)
    ));
}

#[tokio::test]
async fn invalid_drafts_report_every_field_and_store_nothing() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;

    let err = app
        .state
        .posts
        .create_post(
            &leo,
            PostDraft {
                text: "   ".into(),
                group: "404".into(),
                image: Some(ImageUpload {
                    file_name: "notes.txt".into(),
                    content_type: Some("text/plain".into()),
                    data: Bytes::from_static(b"hello"),
                }),
            },
        )
        .await
        .unwrap_err();

    let PostError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.for_field("text"), vec![POST_TEXT_REQUIRED]);
    assert_eq!(errors.for_field("group"), vec![GROUP_INVALID_CHOICE]);
    assert_eq!(errors.for_field("image"), vec![IMAGE_INVALID]);
    assert_eq!(app.store.post_count().await, 0);
    assert!(app.images.stored.lock().unwrap().is_empty());
}

#[tokio::test]
async fn image_upload_is_stored_and_kept_on_edit() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;

    let post = app
        .state
        .posts
        .create_post(
            &leo,
            PostDraft {
                text: "with a picture".into(),
                group: String::new(),
                image: Some(ImageUpload {
                    file_name: "cat.png".into(),
                    content_type: Some("image/png".into()),
                    data: Bytes::from_static(b"\x89PNG"),
                }),
            },
        )
        .await
        .unwrap();
    let stored = post.image.clone().expect("image path recorded");

    let updated = app
        .state
        .posts
        .update_post(&leo, "leo", post.id, draft("new words"))
        .await
        .unwrap();
    assert_eq!(updated.text, "new words");
    assert_eq!(updated.image.as_deref(), Some(stored.as_str()));
    assert_eq!(updated.pub_date, post.pub_date);
}

#[tokio::test]
async fn only_the_author_may_edit() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    let anna = app.store.seed_user("anna").await;
    let post = app.store.seed_post(&leo, "original").await;

    let err = app
        .state
        .posts
        .update_post(&anna, "leo", post.id, draft("hijacked"))
        .await
        .unwrap_err();
    assert!(matches!(err, PostError::Forbidden { .. }));

    let detail = app.state.feed.post_detail("leo", post.id).await.unwrap();
    assert_eq!(detail.post.text, "original");
}

#[tokio::test]
async fn comments_are_listed_oldest_first() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    let anna = app.store.seed_user("anna").await;
    let post = app.store.seed_post(&leo, "discuss").await;
    let posts = &app.state.posts;

    posts.add_comment(&anna, "leo", post.id, "first").await.unwrap();
    posts.add_comment(&leo, "leo", post.id, "second").await.unwrap();

    let err = posts.add_comment(&anna, "leo", post.id, "  ").await.unwrap_err();
    let PostError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.for_field("text"), vec![COMMENT_TEXT_REQUIRED]);

    let detail = app.state.feed.post_detail("leo", post.id).await.unwrap();
    let texts: Vec<_> = detail.comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(detail.comments[0].author.username, "anna");
}

#[tokio::test]
async fn author_summary_counts_and_follow_state() {
    let app = TestApp::new();
    let reader = app.store.seed_user("reader").await;
    let leo = app.store.seed_user("leo").await;
    app.store.seed_post(&leo, "one").await;
    app.store.seed_post(&leo, "two").await;
    app.state.follows.follow(&reader, "leo").await.unwrap();

    let summary = app
        .state
        .profiles
        .author_summary(&leo, &Viewer::User(reader.clone()))
        .await
        .unwrap();
    assert_eq!(summary.stats.posts, 2);
    assert_eq!(summary.stats.followers, 1);
    assert_eq!(summary.stats.following, 0);
    assert!(summary.can_follow);
    assert!(summary.viewer_follows);

    let own = app
        .state
        .profiles
        .author_summary(&leo, &Viewer::User(leo.clone()))
        .await
        .unwrap();
    assert!(!own.can_follow);

    let anonymous = app
        .state
        .profiles
        .author_summary(&leo, &Viewer::Anonymous)
        .await
        .unwrap();
    assert!(!anonymous.can_follow && !anonymous.viewer_follows);
}

#[tokio::test]
async fn session_lifetime_beyond_calendar_range_fails_login_cleanly() {
    let app = TestApp::new();
    app.store.seed_user("leo").await;
    let repo = Arc::new(app.store.clone());
    let far_future = Duration::from_secs(100_000 * 365 * 24 * 60 * 60);
    let auth = AuthService::new(repo.clone(), repo, far_future);

    let err = auth.login("leo", support::PASSWORD).await.unwrap_err();

    assert!(matches!(err, AuthError::SessionLifetime(ttl) if ttl == far_future));
    let issued = app.state.auth.login("leo", support::PASSWORD).await.unwrap();
    assert_eq!(issued.user.username, "leo");
}

/// Collects the `message` of every event emitted while it is the default.
#[derive(Clone, Default)]
struct Messages(Arc<std::sync::Mutex<Vec<String>>>);

impl<S: tracing::Subscriber> Layer<S> for Messages {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct MessageField(Option<String>);
        impl Visit for MessageField {
            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = Some(format!("{value:?}"));
                }
            }
        }

        let mut visitor = MessageField(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            self.0.lock().unwrap().push(message);
        }
    }
}

#[tokio::test]
async fn account_creation_is_logged_once() {
    let app = TestApp::new();
    let messages = Messages::default();
    let subscriber = tracing_subscriber::registry().with(messages.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let user = app
        .state
        .auth
        .create_user(CreateUserCommand {
            username: "leo".to_string(),
            password: support::PASSWORD.to_string(),
            first_name: "Leo".to_string(),
            last_name: String::new(),
            email: String::new(),
        })
        .await
        .unwrap();

    assert_eq!(user.username, "leo");
    let logged = messages.0.lock().unwrap();
    assert_eq!(
        logged.iter().filter(|message| *message == "Created user").count(),
        1
    );
}
