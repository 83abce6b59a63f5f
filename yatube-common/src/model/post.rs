use crate::model::{
    Id,
    group::{Group, GroupMarker},
    text::Text,
    user::{User, UserMarker},
};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;

pub const POST_LABEL_LEN: usize = 15;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub text: Text,
    pub created_at: UtcDateTime,
    pub author: User,
    pub group: Option<Group>,
    /// Path of the attached image, relative to the media root.
    pub image: Option<String>,
}

/// Everything the post form controls.
///
/// On update an `image` of `None` keeps the stored attachment.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostContent {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<String>,
}

/// Which posts a listing shows.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    FollowedBy(Id<UserMarker>),
}

impl Post {
    #[must_use]
    pub fn is_authored_by(&self, user: Id<UserMarker>) -> bool {
        self.author.id == user
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.text.preview(POST_LABEL_LEN)
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
