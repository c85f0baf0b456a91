//! Unified document/image reader.
//!
//! Grounded on `original_source/backend/document_reader.py`'s
//! `DocumentAnalyzer`: one entry point that downloads a source if it's a
//! URL, then branches on content type — images get a vision instruction
//! inline in the prompt, everything else goes through
//! [`llm::LlmClient::chat_with_file`] (the long-context file-upload path)
//! so the document's full text never has to be inlined into the prompt.

use crate::error::{IngestError, Result};
use base64::Engine as _;
use llm::{LlmClient, Message};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const VISION_SYSTEM_PROMPT: &str = "You are a visual logic analyst. Deconstruct the image into structured \
Markdown: an object inventory, the spatial/causal/semantic relationships between objects, and a one-paragraph \
summary of the scene's logic. Do not include conversational filler.";

const DEFAULT_DOCUMENT_PROMPT: &str = "Analyze this document to extract information suitable for building \
technical diagrams: key entities and roles, relationships and interactions, and process logic and conditions. \
Ignore purely decorative text.";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Reads a local or remote document/image and returns an LLM-produced
/// Markdown summary suitable for feeding into the Graph Builder.
pub struct DocumentAnalyzer {
    client: Arc<dyn LlmClient>,
}

impl DocumentAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Analyze `file_source` (a local path or an HTTP(S) URL), returning a
    /// Markdown-formatted summary. `prompt` overrides the built-in
    /// instruction; `max_token_limit`, if given, is appended as a strict
    /// length constraint so multi-file runs don't blow their context budget.
    pub async fn analyze(
        &self,
        file_source: &str,
        prompt: Option<&str>,
        max_token_limit: Option<usize>,
    ) -> Result<String> {
        let (local_path, _temp_dir) = self.resolve_source(file_source).await?;

        let limit_instruction = max_token_limit
            .map(|limit| {
                format!(
                    "\n\n[STRICT CONSTRAINT]: Keep the response under {} tokens/words. \
                     Cover only the most critical logic.",
                    limit
                )
            })
            .unwrap_or_default();

        if is_image(&local_path) {
            self.analyze_image(&local_path, prompt, &limit_instruction).await
        } else {
            self.analyze_document(&local_path, prompt, &limit_instruction).await
        }
    }

    async fn analyze_image(&self, path: &Path, prompt: Option<&str>, limit_instruction: &str) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let mime = guess_image_mime(path);
        let data_url = format!("data:{};base64,{}", mime, encoded);

        let instruction = prompt.unwrap_or("Analyze the image structure and logic.");
        let user_query = format!("{}{}", instruction, limit_instruction);

        self.client
            .chat(&[Message::human_with_images(user_query, vec![data_url])], Some(VISION_SYSTEM_PROMPT), false)
            .await
            .map_err(IngestError::from)
    }

    async fn analyze_document(&self, path: &Path, prompt: Option<&str>, limit_instruction: &str) -> Result<String> {
        let final_prompt = format!("{}{}", prompt.unwrap_or(DEFAULT_DOCUMENT_PROMPT), limit_instruction);

        self.client
            .chat_with_file(&[Message::human(final_prompt)], None, path, false)
            .await
            .map_err(IngestError::from)
    }

    /// Download `source` to a temp directory if it's a URL; otherwise
    /// verify the local path exists. Returns the local path and, for a
    /// downloaded file, a guard directory that is removed on drop.
    async fn resolve_source(&self, source: &str) -> Result<(PathBuf, Option<TempDirGuard>)> {
        if let Ok(url) = reqwest::Url::parse(source) {
            if url.scheme() == "http" || url.scheme() == "https" {
                return self.download(url).await.map(|(p, g)| (p, Some(g)));
            }
        }

        let path = PathBuf::from(source);
        if !path.exists() {
            return Err(IngestError::SourceUnreadable(format!("file not found at {}", source)));
        }
        Ok((path, None))
    }

    async fn download(&self, url: reqwest::Url) -> Result<(PathBuf, TempDirGuard)> {
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("downloaded-document")
            .to_string();

        let dir = std::env::temp_dir().join(format!("ingest-download-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        let local_path = dir.join(&file_name);

        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        tokio::fs::write(&local_path, &bytes).await?;

        Ok((local_path, TempDirGuard(dir)))
    }
}

/// Deletes its directory when dropped; cleans up a downloaded source file
/// the same way `document_reader.py`'s `finally` block does.
struct TempDirGuard(PathBuf);

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn guess_image_mime(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_detects_known_extensions() {
        assert!(is_image(Path::new("photo.PNG")));
        assert!(is_image(Path::new("scan.jpeg")));
        assert!(!is_image(Path::new("report.pdf")));
    }

    #[test]
    fn test_guess_image_mime() {
        assert_eq!(guess_image_mime(Path::new("a.png")), "image/png");
        assert_eq!(guess_image_mime(Path::new("a.jpg")), "image/jpeg");
    }
}
