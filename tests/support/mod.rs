//! In-memory repositories and router wiring shared by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use scribbly::{
    application::{
        auth::{AuthService, hash_password},
        feed::FeedService,
        follows::FollowService,
        posts::{ImageStore, ImageStoreError, PostService},
        profile::ProfileService,
        repos::{
            AuthorStats, CommentsRepo, CreateCommentParams, CreateGroupParams, CreatePostParams,
            CreateSessionParams, CreateUserParams, FollowsRepo, GroupsRepo, PostScope, PostsRepo,
            PostsWriteRepo, RepoError, SessionsRepo, UpdatePostParams, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheTrigger, PageCacheState, PageStore},
    config::AuthSettings,
    domain::entities::{
        CommentRecord, FollowRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
    },
    domain::follows::FollowEdge,
    infra::http::{HttpState, build_router},
};

pub const PASSWORD: &str = "correct horse battery";
pub const SESSION_COOKIE: &str = "scribbly_session";

/// Argon2 is slow in debug builds; hash the shared test password once.
pub fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).expect("hash test password"))
        .clone()
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<StoredPost>,
    comments: Vec<StoredComment>,
    follows: Vec<FollowRecord>,
    sessions: Vec<SessionRecord>,
    next_id: i64,
    tick: i64,
}

#[derive(Clone)]
struct StoredPost {
    id: i64,
    text: String,
    pub_date: OffsetDateTime,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Clone)]
struct StoredComment {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: String,
    created: OffsetDateTime,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so ordering is deterministic.
    fn now(&mut self) -> OffsetDateTime {
        self.tick += 1;
        OffsetDateTime::UNIX_EPOCH + time::Duration::days(20_000) + time::Duration::seconds(self.tick)
    }

    fn user(&self, id: i64) -> Result<&UserRecord, RepoError> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .ok_or(RepoError::Integrity {
                message: format!("user {id} missing"),
            })
    }

    fn hydrate(&self, post: &StoredPost) -> Result<PostRecord, RepoError> {
        let group = match post.group_id {
            Some(id) => self
                .groups
                .iter()
                .find(|group| group.id == id)
                .map(GroupRecord::as_ref),
            None => None,
        };
        Ok(PostRecord {
            id: post.id,
            text: post.text.clone(),
            pub_date: post.pub_date,
            author: self.user(post.author_id)?.as_author(),
            group,
            image: post.image.clone(),
        })
    }

    fn in_scope(&self, post: &StoredPost, scope: PostScope) -> bool {
        match scope {
            PostScope::All => true,
            PostScope::Group(id) => post.group_id == Some(id),
            PostScope::Author(id) => post.author_id == id,
            PostScope::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|follow| follow.user_id == user_id && follow.author_id == post.author_id),
        }
    }
}

/// One store behind every repository trait, like the Postgres adapter.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, username: &str) -> UserRecord {
        self.create_user(CreateUserParams {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: format!("{username}@example.com"),
            password_hash: password_hash(),
        })
        .await
        .expect("seed user")
    }

    pub async fn seed_group(&self, title: &str, slug: &str) -> GroupRecord {
        self.create_group(CreateGroupParams {
            title: title.to_string(),
            slug: slug.to_string(),
            description: format!("About {title}"),
        })
        .await
        .expect("seed group")
    }

    pub async fn seed_post(&self, author: &UserRecord, text: &str) -> PostRecord {
        self.create_post(CreatePostParams {
            author_id: author.id,
            text: text.to_string(),
            group_id: None,
            image: None,
        })
        .await
        .expect("seed post")
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    pub async fn follow_count(&self) -> usize {
        self.tables.lock().await.follows.len()
    }
}

#[async_trait]
impl UsersRepo for InMemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let user = UserRecord {
            id: tables.next_id(),
            username: params.username,
            first_name: params.first_name,
            last_name: params.last_name,
            email: params.email,
            password_hash: params.password_hash,
            created_at: tables.now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn author_stats(&self, user_id: i64) -> Result<AuthorStats, RepoError> {
        let tables = self.tables.lock().await;
        Ok(AuthorStats {
            posts: tables.posts.iter().filter(|p| p.author_id == user_id).count() as u64,
            followers: tables.follows.iter().filter(|f| f.author_id == user_id).count() as u64,
            following: tables.follows.iter().filter(|f| f.user_id == user_id).count() as u64,
        })
    }
}

#[async_trait]
impl GroupsRepo for InMemoryStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.groups.iter().find(|g| g.id == id).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut groups = tables.groups.clone();
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.iter().any(|g| g.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "groups_slug_key".to_string(),
            });
        }
        let group = GroupRecord {
            id: tables.next_id(),
            title: params.title,
            slug: params.slug,
            description: params.description,
        };
        tables.groups.push(group.clone());
        Ok(group)
    }
}

#[async_trait]
impl PostsRepo for InMemoryStore {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .count() as u64)
    }

    async fn list_posts(
        &self,
        scope: PostScope,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&StoredPost> = tables
            .posts
            .iter()
            .filter(|post| tables.in_scope(post, scope))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|post| tables.hydrate(post))
            .collect()
    }

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;
        tables
            .posts
            .iter()
            .find(|post| post.id == id)
            .map(|post| tables.hydrate(post))
            .transpose()
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        tables.user(params.author_id)?;
        let post = StoredPost {
            id: tables.next_id(),
            text: params.text,
            pub_date: tables.now(),
            author_id: params.author_id,
            group_id: params.group_id,
            image: params.image,
        };
        tables.posts.push(post.clone());
        tables.hydrate(&post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let stored = tables
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        stored.text = params.text;
        stored.group_id = params.group_id;
        stored.image = params.image;
        let stored = stored.clone();
        tables.hydrate(&stored)
    }
}

#[async_trait]
impl CommentsRepo for InMemoryStore {
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentRecord>, RepoError> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<&StoredComment> = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .collect();
        comments.sort_by_key(|comment| (comment.created, comment.id));
        comments
            .into_iter()
            .map(|comment| {
                Ok(CommentRecord {
                    id: comment.id,
                    post_id: comment.post_id,
                    text: comment.text.clone(),
                    author: tables.user(comment.author_id)?.as_author(),
                    created: comment.created,
                })
            })
            .collect()
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let author = tables.user(params.author_id)?.as_author();
        let comment = StoredComment {
            id: tables.next_id(),
            post_id: params.post_id,
            author_id: params.author_id,
            text: params.text,
            created: tables.now(),
        };
        tables.comments.push(comment.clone());
        Ok(CommentRecord {
            id: comment.id,
            post_id: comment.post_id,
            text: comment.text,
            author,
            created: comment.created,
        })
    }
}

#[async_trait]
impl FollowsRepo for InMemoryStore {
    async fn find_follow(&self, edge: FollowEdge) -> Result<Option<FollowRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .follows
            .iter()
            .find(|f| f.user_id == edge.user_id() && f.author_id == edge.author_id())
            .cloned())
    }

    async fn insert_follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == edge.user_id() && f.author_id == edge.author_id())
        {
            return Ok(false);
        }
        let record = FollowRecord {
            id: tables.next_id(),
            user_id: edge.user_id(),
            author_id: edge.author_id(),
            follow_on_date: tables.now(),
        };
        tables.follows.push(record);
        Ok(true)
    }

    async fn delete_follow(&self, edge: FollowEdge) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.user_id == edge.user_id() && f.author_id == edge.author_id()));
        Ok(tables.follows.len() != before)
    }
}

#[async_trait]
impl SessionsRepo for InMemoryStore {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let session = SessionRecord {
            id: tables.next_id(),
            prefix: params.prefix,
            hashed_secret: params.hashed_secret,
            user_id: params.user_id,
            created_at: OffsetDateTime::now_utc(),
            expires_at: params.expires_at,
        };
        tables.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<SessionRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.prefix == prefix).cloned())
    }

    async fn delete_session(&self, prefix: &str) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.prefix != prefix);
        Ok(tables.sessions.len() != before)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

/// Image store that keeps uploads in memory.
#[derive(Default)]
pub struct MemoryImages {
    pub stored: std::sync::Mutex<Vec<(String, Bytes)>>,
}

#[async_trait]
impl ImageStore for MemoryImages {
    async fn store_image(&self, file_name: &str, data: Bytes) -> Result<String, ImageStoreError> {
        if data.is_empty() {
            return Err(ImageStoreError::Empty);
        }
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| ImageStoreError::Storage("poisoned".into()))?;
        let path = format!("posts/{}-{file_name}", stored.len() + 1);
        stored.push((path.clone(), data));
        Ok(path)
    }
}

/// Services wired over one in-memory store.
pub struct TestApp {
    pub store: InMemoryStore,
    pub images: Arc<MemoryImages>,
    pub cache_store: Arc<PageStore>,
    pub state: HttpState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_cache(CacheConfig::default())
    }

    pub fn with_cache(cache_config: CacheConfig) -> Self {
        let store = InMemoryStore::new();
        let images = Arc::new(MemoryImages::default());
        let cache_store = Arc::new(PageStore::new(&cache_config));
        let trigger = Arc::new(CacheTrigger::new(cache_config.clone(), cache_store.clone()));

        let repo = Arc::new(store.clone());
        let feed = FeedService::new(repo.clone(), repo.clone(), repo.clone(), repo.clone());
        let posts = PostService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
            images.clone(),
        )
        .with_cache_trigger(trigger);
        let follows = FollowService::new(repo.clone(), repo.clone());
        let profiles = ProfileService::new(repo.clone(), follows.clone());
        let auth = AuthService::new(repo.clone(), repo, Duration::from_secs(3600));

        let state = HttpState {
            feed: Arc::new(feed),
            posts: Arc::new(posts),
            follows: Arc::new(follows),
            profiles: Arc::new(profiles),
            auth: Arc::new(auth),
            auth_settings: Arc::new(AuthSettings {
                session_cookie: SESSION_COOKIE.to_string(),
                session_ttl: Duration::from_secs(3600),
                login_path: "/auth/login/".to_string(),
            }),
            cache: Some(PageCacheState {
                config: cache_config,
                store: cache_store.clone(),
            }),
            db: None,
        };

        Self {
            store,
            images,
            cache_store,
            state,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), 1024 * 1024)
    }

    /// Log in through the service and return a `Cookie` header value.
    pub async fn session_cookie(&self, username: &str) -> String {
        let issued = self
            .state
            .auth
            .login(username, PASSWORD)
            .await
            .expect("login");
        format!("{SESSION_COOKIE}={}", issued.token)
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::post(uri).header(
        header::CONTENT_TYPE,
        "application/x-www-form-urlencoded",
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
