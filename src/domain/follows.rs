//! Follow edges between a reader and an author.

/// A directed subscription `user -> author`. Construction refuses self-follows,
/// so every value of this type satisfies `user_id != author_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowEdge {
    user_id: i64,
    author_id: i64,
}

impl FollowEdge {
    pub fn new(user_id: i64, author_id: i64) -> Option<Self> {
        (user_id != author_id).then_some(Self { user_id, author_id })
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn author_id(&self) -> i64 {
        self.author_id
    }
}
