use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Body text of a post or comment: trimmed and never empty.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct Text(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("This field is required.")]
pub struct BlankTextError;

impl Text {
    pub fn new(text: &str) -> Result<Self, BlankTextError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Err(BlankTextError)
        } else {
            Ok(Self(trimmed.to_owned()))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The first `chars` characters, used wherever a post or comment needs a short label.
    #[must_use]
    pub fn preview(&self, chars: usize) -> &str {
        match self.0.char_indices().nth(chars) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl Display for Text {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Text::new(&inner).map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"Text"))
    }
}
