//! Storage for uploaded post images.

use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::info;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const POST_IMAGE_DIR: &str = "posts";

/// Image formats accepted for post attachments, recognised by their leading bytes.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ImageFormat {
    Gif,
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', ..] => Some(Self::Png),
            [0xff, 0xd8, 0xff, ..] => Some(Self::Jpeg),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a post image under a fresh random name and returns its path relative to the root.
    pub async fn save_post_image(&self, format: ImageFormat, bytes: &[u8]) -> io::Result<String> {
        let directory = self.root.join(POST_IMAGE_DIR);
        tokio::fs::create_dir_all(&directory).await?;

        let file_name = format!("{:032x}.{}", rand::random::<u128>(), format.extension());
        tokio::fs::write(directory.join(&file_name), bytes).await?;

        let relative = format!("{POST_IMAGE_DIR}/{file_name}");
        info!(path = %relative, size = bytes.len(), "Stored post image");
        Ok(relative)
    }
}

/// Public URL of a stored media file.
#[must_use]
pub fn media_url(relative: &str) -> String {
    format!("/media/{relative}")
}
