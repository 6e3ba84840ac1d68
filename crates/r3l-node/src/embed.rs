//! Embedding dispatch.
//!
//! Content is classified by MIME type before any model call, and each class
//! has exactly one strategy:
//!
//! - `Image`: the raw bytes go to the embedder
//! - `VideoFrames`: eight frames sampled with ffprobe/ffmpeg, embedded one by
//!   one, averaged and re-normalised
//! - `Text`: decoded (HTML stripped), truncated, embedded as text
//! - `Pdf`: text pulled out with pdftotext, then embedded as text
//! - `Unsupported`: no embedding
//!
//! Model calls go through [`EmbedderPool`], a fixed number of blocking
//! workers in front of a shared [`Embedder`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use lazy_static::lazy_static;
use r3l_core::similarity::normalize;
use r3l_core::{ProvenanceError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::process::{run_bounded, ProcessError};

/// Characters of text sent to the embedder.
pub const MAX_TEXT_CHARS: usize = 1000;

/// Frames sampled per video.
pub const VIDEO_FRAMES: usize = 8;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").expect("invalid regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("invalid regex");
}

/// How a piece of content is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Image,
    VideoFrames,
    Text,
    Pdf,
    Unsupported,
}

impl ContentClass {
    pub fn classify(mime: Option<&str>) -> Self {
        let Some(mime) = mime else {
            return ContentClass::Unsupported;
        };
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            ContentClass::Image
        } else if mime.starts_with("video/") {
            ContentClass::VideoFrames
        } else if mime.starts_with("text/") {
            ContentClass::Text
        } else if mime.starts_with("application/pdf") {
            ContentClass::Pdf
        } else {
            ContentClass::Unsupported
        }
    }
}

/// Tags replaced by spaces, whitespace runs collapsed.
pub fn strip_html(raw: &str) -> String {
    let without_tags = HTML_TAG.replace_all(raw, " ");
    WHITESPACE.replace_all(&without_tags, " ").trim().to_string()
}

/// Text to embed for a `text/*` payload, `None` if nothing is left.
pub fn extract_text(bytes: &[u8], mime: &str) -> Option<String> {
    let raw = String::from_utf8_lossy(bytes);
    let text = if mime.to_ascii_lowercase().starts_with("text/html") {
        strip_html(&raw)
    } else {
        raw.into_owned()
    };
    let truncated: String = text.chars().take(MAX_TEXT_CHARS).collect();
    let trimmed = truncated.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Text to embed from pdftotext output: whitespace collapsed, truncated.
pub fn pdf_text(raw: &[u8]) -> Option<String> {
    let raw = String::from_utf8_lossy(raw);
    let collapsed = WHITESPACE.replace_all(&raw, " ");
    extract_text(collapsed.as_bytes(), "text/plain")
}

/// Evenly spaced sample points, both ends included. Clips under a second
/// yield only the first frame.
pub fn frame_timestamps(duration: f64, frames: usize) -> Vec<f64> {
    if duration < 1.0 || frames < 2 {
        return vec![0.0];
    }
    (0..frames)
        .map(|i| duration * i as f64 / (frames - 1) as f64)
        .collect()
}

/// Mean of `embeddings`, re-normalised. `None` if empty or ragged.
pub fn average(embeddings: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = embeddings.first()?;
    let dim = first.len();
    if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
        return None;
    }
    let mut mean = vec![0.0f32; dim];
    for embedding in embeddings {
        for (acc, v) in mean.iter_mut().zip(embedding) {
            *acc += v;
        }
    }
    let n = embeddings.len() as f32;
    mean.iter_mut().for_each(|v| *v /= n);
    normalize(&mut mean);
    Some(mean)
}

#[derive(Debug, Error)]
pub enum EmbedError {
    /// The model cannot handle this input. Not a failure.
    #[error("unsupported input")]
    Unsupported,

    #[error("embedder request failed: {0}")]
    Request(String),

    #[error("malformed embedder response: {0}")]
    Response(String),
}

/// One model input.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedInput {
    Image(Vec<u8>),
    Text(String),
}

/// A loaded embedding model. Calls block; run them on [`EmbedderPool`].
pub trait Embedder: Send + Sync {
    fn embed(&self, input: &EmbedInput) -> std::result::Result<Vec<f32>, EmbedError>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    modality: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedder served over HTTP: `{"modality", "input"}` in, `{"embeddings"}`
/// out. Images travel base64-encoded.
pub struct HttpEmbedder {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> std::result::Result<Self, EmbedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, input: &EmbedInput) -> std::result::Result<Vec<f32>, EmbedError> {
        let encoded;
        let request = match input {
            EmbedInput::Image(bytes) => {
                encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                EmbedRequest {
                    modality: "image",
                    input: &encoded,
                }
            }
            EmbedInput::Text(text) => EmbedRequest {
                modality: "text",
                input: text,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(EmbedError::Unsupported);
        }
        let response = response
            .error_for_status()
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        let body: EmbedResponse = response
            .json()
            .map_err(|e| EmbedError::Response(e.to_string()))?;
        body.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Response("no embeddings".into()))
    }
}

/// ffprobe/ffmpeg frame sampling, each call bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
    pub frames: usize,
    pub timeout: Duration,
}

impl FrameSampler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ffprobe: "ffprobe".into(),
            ffmpeg: "ffmpeg".into(),
            frames: VIDEO_FRAMES,
            timeout,
        }
    }

    /// PNG frames from `video`. Frames that fail to extract are skipped; a
    /// subprocess that hangs fails the whole sample.
    pub async fn sample(&self, video: &[u8]) -> Result<Vec<Vec<u8>>> {
        let tmp = tempfile::Builder::new()
            .prefix("r3l-video-")
            .suffix(".mp4")
            .tempfile()
            .map_err(|e| ProvenanceError::Internal(format!("temp file: {e}")))?;
        tokio::fs::write(tmp.path(), video)
            .await
            .map_err(|e| ProvenanceError::Internal(format!("temp file: {e}")))?;
        let path = tmp.path().to_string_lossy().into_owned();

        let Some(duration) = self.duration(&path).await? else {
            return Ok(Vec::new());
        };
        if duration <= 0.0 {
            return Ok(Vec::new());
        }

        let mut frames = Vec::new();
        for ts in frame_timestamps(duration, self.frames) {
            if let Some(frame) = self.frame_at(&path, ts).await? {
                frames.push(frame);
            }
        }
        debug!(duration, frames = frames.len(), "sampled video frames");
        Ok(frames)
    }

    async fn duration(&self, path: &str) -> Result<Option<f64>> {
        let mut command = Command::new(&self.ffprobe);
        command.args(["-v", "quiet", "-print_format", "json", "-show_format", path]);
        let Some(output) = tolerate_missing(run_bounded(command, "ffprobe", self.timeout).await)? else {
            return Ok(None);
        };
        if !output.status.success() {
            return Ok(None);
        }
        let probe: serde_json::Value = match serde_json::from_slice(&output.stdout) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        Ok(probe["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok()))
    }

    async fn frame_at(&self, path: &str, ts: f64) -> Result<Option<Vec<u8>>> {
        let seek = format!("{ts:.3}");
        let mut command = Command::new(&self.ffmpeg);
        command.args([
            "-ss",
            seek.as_str(),
            "-i",
            path,
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "png",
            "-",
        ]);
        let Some(output) = tolerate_missing(run_bounded(command, "ffmpeg", self.timeout).await)? else {
            return Ok(None);
        };
        if !output.status.success() || output.stdout.is_empty() {
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }
}

/// PDF text extraction through poppler's `pdftotext`, bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub pdftotext: PathBuf,
    pub timeout: Duration,
}

impl PdfText {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pdftotext: "pdftotext".into(),
            timeout,
        }
    }

    /// Document text, or `None` when the tool is missing or the PDF has none.
    pub async fn extract(&self, pdf: &[u8]) -> Result<Option<String>> {
        let tmp = tempfile::Builder::new()
            .prefix("r3l-doc-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| ProvenanceError::Internal(format!("temp file: {e}")))?;
        tokio::fs::write(tmp.path(), pdf)
            .await
            .map_err(|e| ProvenanceError::Internal(format!("temp file: {e}")))?;
        let path = tmp.path().to_string_lossy().into_owned();

        let mut command = Command::new(&self.pdftotext);
        command.args(["-q", "-enc", "UTF-8", path.as_str(), "-"]);
        let Some(output) = tolerate_missing(run_bounded(command, "pdftotext", self.timeout).await)? else {
            return Ok(None);
        };
        if !output.status.success() {
            debug!(status = %output.status, "pdf text extraction failed");
            return Ok(None);
        }
        Ok(pdf_text(&output.stdout))
    }
}

/// A missing tool means no embedding input, not a failed request.
fn tolerate_missing(
    result: std::result::Result<std::process::Output, ProcessError>,
) -> Result<Option<std::process::Output>> {
    match result {
        Ok(output) => Ok(Some(output)),
        Err(ProcessError::Spawn { program, source }) => {
            warn!(%program, error = %source, "external tool unavailable");
            Ok(None)
        }
        Err(other) => Err(other.into()),
    }
}

/// Fixed-size pool of blocking embedder calls.
#[derive(Clone)]
pub struct EmbedderPool {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    frames: FrameSampler,
    pdf: PdfText,
}

impl EmbedderPool {
    pub fn new(embedder: Arc<dyn Embedder>, workers: usize, frames: FrameSampler) -> Self {
        Self {
            embedder,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            pdf: PdfText::new(frames.timeout),
            frames,
        }
    }

    pub fn with_pdf_text(mut self, pdf: PdfText) -> Self {
        self.pdf = pdf;
        self
    }

    /// Unit-normalised embedding of `bytes`, or `None` when the content class
    /// has no embedding or the model declines it.
    pub async fn embed(&self, bytes: &[u8], mime: Option<&str>) -> Result<Option<Vec<f32>>> {
        match ContentClass::classify(mime) {
            ContentClass::Image => self.run(EmbedInput::Image(bytes.to_vec())).await,
            ContentClass::Text => {
                let Some(text) = extract_text(bytes, mime.unwrap_or("text/plain")) else {
                    return Ok(None);
                };
                self.run(EmbedInput::Text(text)).await
            }
            ContentClass::VideoFrames => {
                let mut embeddings = Vec::new();
                for frame in self.frames.sample(bytes).await? {
                    if let Some(embedding) = self.run(EmbedInput::Image(frame)).await? {
                        embeddings.push(embedding);
                    }
                }
                Ok(average(&embeddings))
            }
            ContentClass::Pdf => match self.pdf.extract(bytes).await? {
                Some(text) => self.run(EmbedInput::Text(text)).await,
                None => Ok(None),
            },
            ContentClass::Unsupported => Ok(None),
        }
    }

    async fn run(&self, input: EmbedInput) -> Result<Option<Vec<f32>>> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProvenanceError::Internal("embedder pool closed".into()))?;

        let embedder = self.embedder.clone();
        let result = tokio::task::spawn_blocking(move || embedder.embed(&input))
            .await
            .map_err(|e| ProvenanceError::Internal(format!("embedder worker: {e}")))?;

        match result {
            Ok(mut embedding) => {
                normalize(&mut embedding);
                Ok(Some(embedding))
            }
            Err(EmbedError::Unsupported) => Ok(None),
            Err(e) => {
                // Similarity is best effort; attestation goes ahead without it.
                warn!(error = %e, "embedding failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as its length and images as their first byte.
    struct FakeEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for FakeEmbedder {
        fn embed(&self, input: &EmbedInput) -> std::result::Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match input {
                EmbedInput::Text(text) if text == "decline" => Err(EmbedError::Unsupported),
                EmbedInput::Text(text) => Ok(vec![text.len() as f32, 0.0]),
                EmbedInput::Image(bytes) => Ok(vec![0.0, f32::from(bytes[0])]),
            }
        }
    }

    fn pool() -> (EmbedderPool, Arc<FakeEmbedder>) {
        let fake = Arc::new(FakeEmbedder {
            calls: AtomicUsize::new(0),
        });
        let pool = EmbedderPool::new(fake.clone(), 2, FrameSampler::new(Duration::from_secs(1)));
        (pool, fake)
    }

    #[test]
    fn test_classify() {
        assert_eq!(ContentClass::classify(Some("image/png")), ContentClass::Image);
        assert_eq!(ContentClass::classify(Some("Video/MP4")), ContentClass::VideoFrames);
        assert_eq!(ContentClass::classify(Some("text/html; charset=utf-8")), ContentClass::Text);
        assert_eq!(ContentClass::classify(Some("application/pdf")), ContentClass::Pdf);
        assert_eq!(ContentClass::classify(Some("audio/wav")), ContentClass::Unsupported);
        assert_eq!(ContentClass::classify(None), ContentClass::Unsupported);
    }

    #[test]
    fn test_strip_html() {
        let html = "<html><body>\n  <h1>Title</h1>\n<p>Some   <b>bold</b> text</p></body></html>";
        assert_eq!(strip_html(html), "Title Some bold text");
    }

    #[test]
    fn test_extract_text_truncates() {
        let long = "a".repeat(MAX_TEXT_CHARS + 50);
        assert_eq!(extract_text(long.as_bytes(), "text/plain").unwrap().len(), MAX_TEXT_CHARS);
        assert_eq!(extract_text(b"   \n ", "text/plain"), None);
        assert_eq!(extract_text(b"<p></p>", "text/html"), None);
    }

    #[test]
    fn test_frame_timestamps() {
        assert_eq!(frame_timestamps(0.5, 8), vec![0.0]);
        let ts = frame_timestamps(7.0, 8);
        assert_eq!(ts, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_average_renormalises() {
        let avg = average(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((avg[0] - expected).abs() < 1e-6);
        assert!((avg[1] - expected).abs() < 1e-6);
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[vec![1.0], vec![1.0, 2.0]]), None);
    }

    #[tokio::test]
    async fn test_text_dispatch_normalises() {
        let (pool, fake) = pool();
        let embedding = pool.embed(b"hello", Some("text/plain")).await.unwrap().unwrap();
        assert_eq!(embedding, vec![1.0, 0.0]);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_dispatch() {
        let (pool, _) = pool();
        let embedding = pool.embed(&[9, 1, 2], Some("image/png")).await.unwrap().unwrap();
        assert_eq!(embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_unsupported_skips_model() {
        let (pool, fake) = pool();
        assert_eq!(pool.embed(b"RIFF", Some("audio/wav")).await.unwrap(), None);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pdf_text_collapses_pages() {
        let raw = b"Quarterly  report\n\nRevenue up\x0c\nPage two\n";
        assert_eq!(pdf_text(raw).unwrap(), "Quarterly report Revenue up Page two");
        assert_eq!(pdf_text(b"\x0c\n \x0c"), None);
    }

    #[tokio::test]
    async fn test_pdf_without_pdftotext_has_no_embedding() {
        let (pool, fake) = pool();
        let pool = pool.with_pdf_text(PdfText {
            pdftotext: "/nonexistent/pdftotext".into(),
            timeout: Duration::from_secs(1),
        });
        assert_eq!(pool.embed(b"%PDF-1.7", Some("application/pdf")).await.unwrap(), None);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_declined_input_is_none() {
        let (pool, _) = pool();
        assert_eq!(pool.embed(b"decline", Some("text/plain")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_video_without_ffprobe_has_no_embedding() {
        let fake = Arc::new(FakeEmbedder {
            calls: AtomicUsize::new(0),
        });
        let mut frames = FrameSampler::new(Duration::from_secs(1));
        frames.ffprobe = "/nonexistent/ffprobe".into();
        let pool = EmbedderPool::new(fake.clone(), 1, frames);
        assert_eq!(pool.embed(b"not a video", Some("video/mp4")).await.unwrap(), None);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }
}
