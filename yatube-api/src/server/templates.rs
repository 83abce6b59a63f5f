//! Page templates and the flat view data they render.

use crate::server::{
    auth::AuthenticatedUser,
    forms::FieldErrors,
    media::media_url,
    routes::{
        posts::{CommentPath, EditPostPath, GroupPostsPath, PostDetailPath},
        users::{FollowPath, ProfilePath, UnfollowPath},
    },
};
use askama::Template;
use time::{UtcDateTime, format_description::BorrowedFormatItem, macros::format_description};
use yatube_common::{
    model::{comment::Comment, group::Group, post::Post, user::User},
    pagination::Page,
};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year] [hour]:[minute]");

fn display_date(date: UtcDateTime) -> String {
    date.format(DATE_FORMAT).unwrap_or_default()
}

fn lines(text: &str) -> Vec<String> {
    text.lines().map(ToOwned::to_owned).collect()
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Layout {
    pub is_authenticated: bool,
    pub viewer: String,
    pub viewer_url: String,
}

impl Layout {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(viewer: Option<&AuthenticatedUser>) -> Self {
        viewer.map_or_else(Self::anonymous, |viewer| Self::for_user(&viewer.user))
    }

    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            is_authenticated: true,
            viewer: user.username.to_string(),
            viewer_url: ProfilePath {
                username: user.username.clone(),
            }
            .to_string(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostCard {
    pub url: String,
    pub edit_url: String,
    pub lines: Vec<String>,
    pub created: String,
    pub author: String,
    pub author_url: String,
    pub has_group: bool,
    pub group_title: String,
    pub group_url: String,
    pub has_image: bool,
    pub image_url: String,
}

impl PostCard {
    #[must_use]
    pub fn new(post: &Post) -> Self {
        Self {
            url: PostDetailPath { id: post.id }.to_string(),
            edit_url: EditPostPath { id: post.id }.to_string(),
            lines: lines(post.text.get()),
            created: display_date(post.created_at),
            author: post.author.username.to_string(),
            author_url: ProfilePath {
                username: post.author.username.clone(),
            }
            .to_string(),
            has_group: post.group.is_some(),
            group_title: post
                .group
                .as_ref()
                .map(|group| group.title.clone())
                .unwrap_or_default(),
            group_url: post
                .group
                .as_ref()
                .map(|group| {
                    GroupPostsPath {
                        slug: group.slug.clone(),
                    }
                    .to_string()
                })
                .unwrap_or_default(),
            has_image: post.image.is_some(),
            image_url: post.image.as_deref().map(media_url).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn list(page: &Page<Post>) -> Vec<Self> {
        page.items.iter().map(Self::new).collect()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PageNav {
    pub number: u64,
    pub num_pages: u64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous: u64,
    pub next: u64,
}

impl PageNav {
    #[must_use]
    pub fn new<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            previous: page.number.saturating_sub(1).max(1),
            next: (page.number + 1).min(page.num_pages),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CommentView {
    pub author: String,
    pub author_url: String,
    pub created: String,
    pub lines: Vec<String>,
}

impl CommentView {
    #[must_use]
    pub fn new(comment: &Comment) -> Self {
        Self {
            author: comment.author.username.to_string(),
            author_url: ProfilePath {
                username: comment.author.username.clone(),
            }
            .to_string(),
            created: display_date(comment.created_at),
            lines: lines(comment.text.get()),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

impl GroupOption {
    /// `selected` is the raw submitted value of the group field.
    #[must_use]
    pub fn list(groups: &[Group], selected: &str) -> Vec<Self> {
        groups
            .iter()
            .map(|group| Self {
                id: group.id.get(),
                title: group.title.clone(),
                selected: group.id.to_string() == selected.trim(),
            })
            .collect()
    }
}

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub layout: Layout,
    pub title: String,
    pub posts: Vec<PostCard>,
    pub page: PageNav,
}

#[derive(Template)]
#[template(path = "posts/group_list.html")]
pub struct GroupListTemplate {
    pub layout: Layout,
    pub title: String,
    pub description: String,
    pub posts: Vec<PostCard>,
    pub page: PageNav,
}

#[derive(Template)]
#[template(path = "posts/profile.html")]
pub struct ProfileTemplate {
    pub layout: Layout,
    pub author: String,
    pub count: u64,
    pub following: bool,
    pub can_follow: bool,
    pub follow_url: String,
    pub unfollow_url: String,
    pub posts: Vec<PostCard>,
    pub page: PageNav,
}

#[derive(Template)]
#[template(path = "posts/post_detail.html")]
pub struct PostDetailTemplate {
    pub layout: Layout,
    pub title: String,
    pub post: PostCard,
    pub count: u64,
    pub can_edit: bool,
    pub comments: Vec<CommentView>,
    pub comment_url: String,
    pub comment_text: String,
    pub comment_errors: Vec<String>,
}

impl PostDetailTemplate {
    #[must_use]
    pub fn new(
        viewer: Option<&AuthenticatedUser>,
        post: &Post,
        count: u64,
        comments: &[Comment],
    ) -> Self {
        Self {
            layout: Layout::new(viewer),
            title: post.label().to_owned(),
            post: PostCard::new(post),
            count,
            can_edit: viewer.is_some_and(|viewer| post.is_authored_by(viewer.user_id())),
            comments: comments.iter().map(CommentView::new).collect(),
            comment_url: CommentPath { id: post.id }.to_string(),
            comment_text: String::new(),
            comment_errors: Vec::new(),
        }
    }

    /// Shows a rejected comment again with its errors.
    #[must_use]
    pub fn with_comment(mut self, text: String, errors: &FieldErrors) -> Self {
        self.comment_text = text;
        self.comment_errors = errors.field("text");
        self
    }
}

#[derive(Template)]
#[template(path = "posts/create_post.html")]
pub struct PostFormTemplate {
    pub layout: Layout,
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub has_image: bool,
    pub image_url: String,
    pub text_errors: Vec<String>,
    pub group_errors: Vec<String>,
    pub image_errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "posts/follow.html")]
pub struct FollowTemplate {
    pub layout: Layout,
    pub following: u64,
    pub posts: Vec<PostCard>,
    pub page: PageNav,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub username: String,
    pub next: String,
    pub errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "auth/signup.html")]
pub struct SignupTemplate {
    pub layout: Layout,
    pub username: String,
    pub username_errors: Vec<String>,
    pub password1_errors: Vec<String>,
    pub password2_errors: Vec<String>,
}

#[derive(Template)]
#[template(path = "core/404.html")]
pub struct NotFoundTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "core/403.html")]
pub struct ForbiddenTemplate {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "core/error.html")]
pub struct ErrorTemplate {
    pub layout: Layout,
    pub status: u16,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use crate::server::templates::{PageNav, PostCard};
    use time::macros::utc_datetime;
    use yatube_common::{
        model::{
            Id,
            group::{Group, GroupSlug},
            post::Post,
            text::Text,
            user::{User, Username},
        },
        pagination::{PageRequest, Paginator},
    };

    #[test]
    fn post_card_links() {
        let post = Post {
            id: Id::new(7),
            text: Text::new("first line\nsecond line").unwrap(),
            created_at: utc_datetime!(2022-08-08 21:38),
            author: User {
                id: Id::new(1),
                username: Username::new("leo.tolstoy".to_owned()).unwrap(),
            },
            group: Some(Group {
                id: Id::new(2),
                title: "Тестовая группа".to_owned(),
                slug: GroupSlug::new("test-slug".to_owned()).unwrap(),
                description: String::new(),
            }),
            image: Some("posts/small.gif".to_owned()),
        };

        let card = PostCard::new(&post);
        assert_eq!(card.url, "/posts/7/");
        assert_eq!(card.edit_url, "/posts/7/edit/");
        assert_eq!(card.author_url, "/profile/leo.tolstoy/");
        assert_eq!(card.group_url, "/group/test-slug/");
        assert_eq!(card.image_url, "/media/posts/small.gif");
        assert_eq!(card.lines, ["first line", "second line"]);
        assert_eq!(card.created, "8 August 2022 21:38");
    }

    #[test]
    fn page_nav_neighbours() {
        let paginator = Paginator::new(25, 10);
        let window = paginator.locate(PageRequest::Number(2));

        let middle = PageNav::new(&paginator.page(window, vec![0u8; 10]));
        assert!(middle.has_previous && middle.has_next);
        assert_eq!((middle.previous, middle.next), (1, 3));

        let empty = Paginator::new(0, 10);
        let window = empty.locate(PageRequest::First);
        let only = PageNav::new(&empty.page(window, Vec::<u8>::new()));
        assert!(!only.has_previous && !only.has_next);
        assert_eq!(only.num_pages, 1);
    }
}
