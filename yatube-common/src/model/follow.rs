use crate::model::{Id, user::UserMarker};

/// `user` wants posts by `author` in their feed.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Follow {
    pub user: Id<UserMarker>,
    pub author: Id<UserMarker>,
}

impl Follow {
    #[must_use]
    pub fn new(user: Id<UserMarker>, author: Id<UserMarker>) -> Self {
        Self { user, author }
    }

    #[must_use]
    pub fn is_self_follow(self) -> bool {
        self.user == self.author
    }
}
