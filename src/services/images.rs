use std::path::{Component, Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;
use uuid::Uuid;

const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Subdirectory of the media root holding report images.
const REPORT_DIR: &str = "report";

/// Raw image bytes that are known to decode.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

/// Report images on local disk under `<media_dir>/report/`.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: PathBuf,
    base_url: String,
}

impl ImageStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Accepts plain base64 or a `data:<mime>;base64,` URI. The error is the
    /// message shown to the client for the offending entry.
    pub fn decode(payload: &str) -> Result<DecodedImage, String> {
        let encoded = match payload.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(""),
            None => payload,
        };
        // MIME-style payloads wrap lines; the engine rejects any whitespace.
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|_| INVALID_IMAGE.to_string())?;

        let format = image::guess_format(&bytes).map_err(|_| INVALID_IMAGE.to_string())?;
        image::load_from_memory_with_format(&bytes, format)
            .map_err(|_| INVALID_IMAGE.to_string())?;

        Ok(DecodedImage { bytes, format })
    }

    /// Writes the image under a fresh name and returns its storage path.
    pub async fn store(&self, image: &DecodedImage) -> anyhow::Result<String> {
        let dir = self.root.join(REPORT_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}.{}", Uuid::new_v4(), image.extension());
        tokio::fs::write(dir.join(&filename), &image.bytes).await?;

        Ok(format!("{}/{}", REPORT_DIR, filename))
    }

    /// Best effort: files that are already gone or cannot be removed are logged.
    pub async fn remove(&self, files: &[String]) {
        for file in files {
            let Some(path) = self.resolve(file) else {
                tracing::warn!(file = %file, "Refusing to remove image outside media dir");
                continue;
            };
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(file = %file, "Failed to remove image: {}", e);
            }
        }
    }

    pub fn url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url, file)
    }

    /// Maps a storage path to a file under the media root. Absolute paths and
    /// `..` segments are rejected.
    pub fn resolve(&self, file: &str) -> Option<PathBuf> {
        let relative = Path::new(file);
        if file.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}
