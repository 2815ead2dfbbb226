//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;

/// A registered account. The password is only ever held as an argon2 PHC string.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        super::users::display_name(&self.first_name, &self.last_name, &self.username)
    }

    pub fn as_author(&self) -> AuthorRef {
        AuthorRef {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name(),
        }
    }
}

/// The slice of a user that is joined onto posts and comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRef {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl GroupRecord {
    pub fn as_ref(&self) -> GroupRef {
        GroupRef {
            id: self.id,
            slug: self.slug.clone(),
            title: self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRef {
    pub id: i64,
    pub slug: String,
    pub title: String,
}

/// A published record. `pub_date` and `author` are fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: i64,
    pub text: String,
    pub pub_date: OffsetDateTime,
    pub author: AuthorRef,
    pub group: Option<GroupRef>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub text: String,
    pub author: AuthorRef,
    pub created: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FollowRecord {
    pub id: i64,
    pub user_id: i64,
    pub author_id: i64,
    pub follow_on_date: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: i64,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub user_id: i64,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}
