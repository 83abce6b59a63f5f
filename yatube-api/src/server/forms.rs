//! Binding and validation of submitted forms.
//!
//! Validation never fails the request: problems are collected per field so the form can be
//! shown again with the user's input and the reasons next to it.

use crate::server::{
    ServerError,
    html::Form,
    media::{ImageFormat, MAX_IMAGE_BYTES},
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use yatube_common::model::{
    Id,
    auth::PASSWORD_MIN_LEN,
    group::{Group, GroupMarker},
    text::Text,
    user::Username,
};

const INVALID_GROUP: &str =
    "Select a valid choice. That choice is not one of the available choices.";
const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
const IMAGE_TOO_LARGE: &str = "The image may be at most 5 MiB.";

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn field(&self, field: &str) -> Vec<String> {
        self.0.get(field).cloned().unwrap_or_default()
    }
}

/// The post form exactly as submitted.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostSubmission {
    pub text: String,
    pub group: String,
    pub image: Option<Bytes>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ValidImage {
    pub format: ImageFormat,
    pub bytes: Bytes,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ValidPost {
    pub text: Text,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<ValidImage>,
}

#[derive(Deserialize)]
struct UrlencodedPost {
    #[serde(default)]
    text: String,
    #[serde(default)]
    group: String,
}

impl PostSubmission {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut submission = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(ToOwned::to_owned);
            match name.as_deref() {
                Some("text") => submission.text = field.text().await?,
                Some("group") => submission.group = field.text().await?,
                Some("image") => {
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part when no file was chosen.
                    if !bytes.is_empty() {
                        submission.image = Some(bytes);
                    }
                }
                _ => {}
            }
        }

        Ok(submission)
    }

    /// `groups` are the choices offered by the form.
    pub fn validate(&self, groups: &[Group]) -> Result<ValidPost, FieldErrors> {
        let mut errors = FieldErrors::default();

        let text = Text::new(&self.text)
            .map_err(|err| errors.add("text", err.to_string()))
            .ok();

        let group = match self.group.trim() {
            "" => None,
            raw => {
                let chosen = raw
                    .parse::<i64>()
                    .ok()
                    .map(Id::new)
                    .filter(|id| groups.iter().any(|group| group.id == *id));
                if chosen.is_none() {
                    errors.add("group", INVALID_GROUP);
                }
                chosen
            }
        };

        let image = match &self.image {
            None => None,
            Some(bytes) if bytes.len() > MAX_IMAGE_BYTES => {
                errors.add("image", IMAGE_TOO_LARGE);
                None
            }
            Some(bytes) => match ImageFormat::detect(bytes) {
                Some(format) => Some(ValidImage {
                    format,
                    bytes: bytes.clone(),
                }),
                None => {
                    errors.add("image", INVALID_IMAGE);
                    None
                }
            },
        };

        match text {
            Some(text) if errors.is_empty() => Ok(ValidPost { text, group, image }),
            _ => Err(errors),
        }
    }
}

impl<S> FromRequest<S> for PostSubmission
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state).await?;
            Self::from_multipart(multipart).await
        } else {
            let Form(form) = Form::<UrlencodedPost>::from_request(req, state).await?;
            Ok(Self {
                text: form.text,
                group: form.group,
                image: None,
            })
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<Text, FieldErrors> {
        Text::new(&self.text).map_err(|err| {
            let mut errors = FieldErrors::default();
            errors.add("text", err.to_string());
            errors
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

impl SignupForm {
    /// Checks everything that does not need the database.
    pub fn validate(&self) -> Result<Username, FieldErrors> {
        let mut errors = FieldErrors::default();

        let username = Username::new(self.username.trim().to_owned())
            .map_err(|_| {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, \
                    and @/./+/-/_ characters.",
                );
            })
            .ok();

        if self.password1.chars().count() < PASSWORD_MIN_LEN {
            errors.add(
                "password1",
                format!(
                    "This password is too short. \
                    It must contain at least {PASSWORD_MIN_LEN} characters."
                ),
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        match username {
            Some(username) if errors.is_empty() => Ok(username),
            _ => Err(errors),
        }
    }
}
