//! End-to-end requests through the full router.

mod support;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use scribbly::application::pagination::PageRequest;

use support::{PASSWORD, TestApp, body_text, get, location, post_form};

#[tokio::test]
async fn index_renders_global_feed() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_post(&leo, "Hello from Leo").await;

    let response = app.router().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Hello from Leo"));
    assert!(body.contains("Latest posts"));
}

#[tokio::test]
async fn new_post_is_visible_on_cached_index_immediately() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_post(&leo, "first words").await;
    let cookie = app.session_cookie("leo").await;

    let before = app.router().oneshot(get("/", Some(&cookie))).await.unwrap();
    assert!(body_text(before).await.contains("first words"));
    assert_eq!(app.cache_store.len(), 1);

    let created = app
        .router()
        .oneshot(post_form("/new/", Some(&cookie), "text=fresh+news&group="))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::FOUND);
    assert_eq!(location(&created), "/");
    assert!(app.cache_store.is_empty());

    let after = app.router().oneshot(get("/", Some(&cookie))).await.unwrap();
    let body = body_text(after).await;
    assert!(body.contains("fresh news"));
    assert!(body.contains("first words"));
}

#[tokio::test]
async fn edited_post_is_visible_on_cached_index_immediately() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    let post = app.store.seed_post(&leo, "draft wording").await;
    let cookie = app.session_cookie("leo").await;

    let before = app.router().oneshot(get("/", Some(&cookie))).await.unwrap();
    assert!(body_text(before).await.contains("draft wording"));
    assert_eq!(app.cache_store.len(), 1);

    let edited = app
        .router()
        .oneshot(post_form(
            &format!("/leo/{}/edit/", post.id),
            Some(&cookie),
            "text=final+wording&group=",
        ))
        .await
        .unwrap();
    assert_eq!(edited.status(), StatusCode::FOUND);
    assert!(app.cache_store.is_empty());

    let after = app.router().oneshot(get("/", Some(&cookie))).await.unwrap();
    let body = body_text(after).await;
    assert!(body.contains("final wording"));
    assert!(!body.contains("draft wording"));
}

#[tokio::test]
async fn comment_clears_cached_index() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_user("mia").await;
    let post = app.store.seed_post(&leo, "talk to me").await;
    let cookie = app.session_cookie("mia").await;

    let warm = app.router().oneshot(get("/", Some(&cookie))).await.unwrap();
    assert_eq!(warm.status(), StatusCode::OK);
    assert_eq!(app.cache_store.len(), 1);

    let commented = app
        .router()
        .oneshot(post_form(
            &format!("/leo/{}/comment/", post.id),
            Some(&cookie),
            "text=hello+there",
        ))
        .await
        .unwrap();
    assert_eq!(commented.status(), StatusCode::FOUND);
    assert!(app.cache_store.is_empty());
}

#[tokio::test]
async fn anonymous_post_to_new_redirects_to_login() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(post_form("/new/", None, "text=sneaky"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/auth/login/?next=/new/");
    assert_eq!(app.store.post_count().await, 0);

    let response = app.router().oneshot(get("/follow/", None)).await.unwrap();
    assert_eq!(location(&response), "/auth/login/?next=/follow/");
}

#[tokio::test]
async fn empty_post_re_renders_form_with_error() {
    let app = TestApp::new();
    app.store.seed_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app
        .router()
        .oneshot(post_form("/new/", Some(&cookie), "text=+&group="))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Please insert record text"));
    assert_eq!(app.store.post_count().await, 0);
}

#[tokio::test]
async fn multipart_post_with_image_is_stored() {
    let app = TestApp::new();
    app.store.seed_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"text\"\r\n\r\n\
         picture post\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"group\"\r\n\r\n\
         \r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"image\"; filename=\"cat.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         PNGDATA\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/new/")
        .header(header::COOKIE, &cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let page = app.state.feed.global_feed(PageRequest::first()).await.unwrap();
    assert_eq!(page.items[0].text, "picture post");
    assert_eq!(page.items[0].image.as_deref(), Some("posts/1-cat.png"));
    assert_eq!(app.images.stored.lock().unwrap()[0].1.as_ref(), b"PNGDATA");
}

#[tokio::test]
async fn non_author_edit_redirects_and_leaves_post_unchanged() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_user("anna").await;
    let post = app.store.seed_post(&leo, "original text").await;
    let cookie = app.session_cookie("anna").await;
    let edit_path = format!("/leo/{}/edit/", post.id);

    let form = app
        .router()
        .oneshot(get(&edit_path, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(form.status(), StatusCode::FOUND);
    assert_eq!(location(&form), format!("/leo/{}/", post.id));

    let response = app
        .router()
        .oneshot(post_form(&edit_path, Some(&cookie), "text=hijacked"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), format!("/leo/{}/", post.id));

    let detail = app.state.feed.post_detail("leo", post.id).await.unwrap();
    assert_eq!(detail.post.text, "original text");
}

#[tokio::test]
async fn author_edit_updates_post_and_redirects_to_detail() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    let post = app.store.seed_post(&leo, "draft").await;
    let cookie = app.session_cookie("leo").await;
    let edit_path = format!("/leo/{}/edit/", post.id);

    let form = app
        .router()
        .oneshot(get(&edit_path, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(form.status(), StatusCode::OK);
    assert!(body_text(form).await.contains("draft"));

    let response = app
        .router()
        .oneshot(post_form(&edit_path, Some(&cookie), "text=final+version"))
        .await
        .unwrap();
    assert_eq!(location(&response), format!("/leo/{}/", post.id));

    let detail = app
        .router()
        .oneshot(get(&format!("/leo/{}/", post.id), None))
        .await
        .unwrap();
    assert!(body_text(detail).await.contains("final version"));
}

#[tokio::test]
async fn comments_are_added_and_rendered() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_user("anna").await;
    let post = app.store.seed_post(&leo, "talk to me").await;
    let cookie = app.session_cookie("anna").await;

    let response = app
        .router()
        .oneshot(post_form(
            &format!("/leo/{}/comment/", post.id),
            Some(&cookie),
            "text=nice+post",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), format!("/leo/{}/", post.id));

    let detail = app
        .router()
        .oneshot(get(&format!("/leo/{}/", post.id), Some(&cookie)))
        .await
        .unwrap();
    let body = body_text(detail).await;
    assert!(body.contains("nice post"));
    assert!(body.contains("Add a comment"));

    let anonymous = app
        .router()
        .oneshot(get(&format!("/leo/{}/", post.id), None))
        .await
        .unwrap();
    assert!(!body_text(anonymous).await.contains("Add a comment"));
}

#[tokio::test]
async fn bad_post_urls_are_not_found() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_user("anna").await;
    let post = app.store.seed_post(&leo, "hello").await;

    for uri in [
        "/leo/abc/".to_string(),
        format!("/anna/{}/", post.id),
        "/leo/999/".to_string(),
        "/ghost/".to_string(),
        "/group/missing/".to_string(),
    ] {
        let response = app.router().oneshot(get(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(body_text(response).await.contains("Page not found"));
    }
}

#[tokio::test]
async fn follow_and_unfollow_redirect_to_profile() {
    let app = TestApp::new();
    app.store.seed_user("reader").await;
    let leo = app.store.seed_user("leo").await;
    app.store.seed_post(&leo, "worth following").await;
    let cookie = app.session_cookie("reader").await;

    let response = app
        .router()
        .oneshot(get("/leo/follow/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/leo/");
    assert_eq!(app.store.follow_count().await, 1);

    let profile = app
        .router()
        .oneshot(get("/leo/", Some(&cookie)))
        .await
        .unwrap();
    assert!(body_text(profile).await.contains(">Unfollow<"));

    let feed = app
        .router()
        .oneshot(get("/follow/", Some(&cookie)))
        .await
        .unwrap();
    assert!(body_text(feed).await.contains("worth following"));

    let response = app
        .router()
        .oneshot(get("/leo/unfollow/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location(&response), "/leo/");
    assert_eq!(app.store.follow_count().await, 0);

    let anonymous = app.router().oneshot(get("/leo/follow/", None)).await.unwrap();
    assert_eq!(location(&anonymous), "/auth/login/?next=/leo/follow/");
}

#[tokio::test]
async fn login_sets_cookie_and_honours_local_next() {
    let app = TestApp::new();
    app.store.seed_user("leo").await;

    let body = format!("username=leo&password={}&next=/follow/", PASSWORD.replace(' ', "+"));
    let response = app
        .router()
        .oneshot(post_form("/auth/login/", None, &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/follow/");
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("scribbly_session="));
    assert!(cookie.contains("HttpOnly"));

    let session = cookie.split(';').next().unwrap().to_string();
    let feed = app
        .router()
        .oneshot(get("/follow/", Some(&session)))
        .await
        .unwrap();
    assert_eq!(feed.status(), StatusCode::OK);

    let external = format!(
        "username=leo&password={}&next=//evil.example/",
        PASSWORD.replace(' ', "+")
    );
    let response = app
        .router()
        .oneshot(post_form("/auth/login/", None, &external))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn wrong_password_re_renders_login() {
    let app = TestApp::new();
    app.store.seed_user("leo").await;

    let response = app
        .router()
        .oneshot(post_form(
            "/auth/login/",
            None,
            "username=leo&password=wrong-password",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(
        body_text(response)
            .await
            .contains("Please enter a correct username and password")
    );
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = TestApp::new();
    app.store.seed_user("leo").await;
    let cookie = app.session_cookie("leo").await;

    let response = app
        .router()
        .oneshot(get("/auth/logout/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location(&response), "/");

    let response = app
        .router()
        .oneshot(get("/new/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/auth/login/?next=/new/");
}

#[tokio::test]
async fn health_without_database_is_unavailable() {
    let app = TestApp::new();
    let response = app.router().oneshot(get("/_health/db", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn cached_index_expires_after_ttl() {
    let app = TestApp::new();
    let leo = app.store.seed_user("leo").await;
    app.store.seed_post(&leo, "before cache").await;

    let first = app.router().oneshot(get("/", None)).await.unwrap();
    assert!(body_text(first).await.contains("before cache"));

    // Written behind the services' back, so nothing clears the cache.
    app.store.seed_post(&leo, "sneaked in").await;

    tokio::time::advance(Duration::from_secs(10)).await;
    let cached = app.router().oneshot(get("/", None)).await.unwrap();
    assert!(!body_text(cached).await.contains("sneaked in"));

    tokio::time::advance(Duration::from_secs(11)).await;
    let fresh = app.router().oneshot(get("/", None)).await.unwrap();
    assert!(body_text(fresh).await.contains("sneaked in"));
}
