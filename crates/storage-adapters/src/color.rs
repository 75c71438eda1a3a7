//! Dominant colour extraction.
//!
//! Fetches the media (remote over HTTP or from the local media store),
//! decodes it off the async runtime, downsamples and picks the most common
//! colour after quantising each channel to 4 bits. Every failure degrades
//! to `FALLBACK_DOMINANT_COLOR`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use image::GenericImageView;
use tokio::fs;
use tracing::{debug, warn};

use domains::{ColorExtractor, FALLBACK_DOMINANT_COLOR};

use crate::media::LocalMediaStore;

/// Larger downloads are not worth decoding for a background colour.
const MAX_FETCH_BYTES: usize = 10 * 1024 * 1024;
const SAMPLE_SIZE: u32 = 100;

pub struct DominantColorExtractor {
    http: reqwest::Client,
    local: Option<Arc<LocalMediaStore>>,
}

impl DominantColorExtractor {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("moments-archive/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, local: None })
    }

    /// Resolve `/media/...` URLs straight from disk instead of over HTTP.
    pub fn with_local_store(mut self, store: Arc<LocalMediaStore>) -> Self {
        self.local = Some(store);
        self
    }

    async fn load(&self, media_url: &str) -> Option<Bytes> {
        if let Some(path) = self.local.as_ref().and_then(|s| s.local_path(media_url)) {
            return match fs::read(&path).await {
                Ok(data) => Some(Bytes::from(data)),
                Err(err) => {
                    warn!(url = media_url, error = %err, "failed to read local media");
                    None
                }
            };
        }

        if !(media_url.starts_with("http://") || media_url.starts_with("https://")) {
            debug!(url = media_url, "unsupported media url");
            return None;
        }

        let response = match self.http.get(media_url).send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(err) => {
                warn!(url = media_url, error = %err, "failed to fetch media");
                return None;
            }
        };
        let is_video = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("video/"));
        if is_video || response.content_length().unwrap_or(0) > MAX_FETCH_BYTES as u64 {
            return None;
        }

        match read_capped(response.bytes_stream(), MAX_FETCH_BYTES).await {
            Ok(Some(body)) => Some(body),
            Ok(None) => {
                debug!(url = media_url, "media body exceeds fetch limit");
                None
            }
            Err(err) => {
                warn!(url = media_url, error = %err, "failed to read media body");
                None
            }
        }
    }
}

/// Collects a streamed body, giving up with `None` as soon as it grows past
/// `limit` bytes.
async fn read_capped<S, E>(body: S, limit: usize) -> Result<Option<Bytes>, E>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let mut body = std::pin::pin!(body);
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if buffer.len() + chunk.len() > limit {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Some(buffer.freeze()))
}

fn looks_like_video(media_url: &str) -> bool {
    let path = media_url.split(['?', '#']).next().unwrap_or(media_url);
    mime_guess::from_path(path)
        .first()
        .is_some_and(|m| m.type_() == mime::VIDEO)
}

/// Most frequent 4-bit-per-channel bucket, reported as the average of the
/// pixels that fell into it. Mostly transparent pixels are ignored.
pub fn dominant_color(data: &[u8]) -> Option<String> {
    let img = image::load_from_memory(data).ok()?;
    let sample = if img.width() > SAMPLE_SIZE || img.height() > SAMPLE_SIZE {
        img.thumbnail(SAMPLE_SIZE, SAMPLE_SIZE)
    } else {
        img
    };

    let mut buckets: HashMap<(u8, u8, u8), (u64, u64, u64, u64)> = HashMap::new();
    for (_, _, pixel) in sample.pixels() {
        let [r, g, b, a] = pixel.0;
        if a < 128 {
            continue;
        }
        let entry = buckets.entry((r >> 4, g >> 4, b >> 4)).or_default();
        entry.0 += 1;
        entry.1 += u64::from(r);
        entry.2 += u64::from(g);
        entry.3 += u64::from(b);
    }

    let (count, r, g, b) = buckets
        .into_iter()
        .max_by(|(ka, a), (kb, b)| a.0.cmp(&b.0).then_with(|| kb.cmp(ka)))
        .map(|(_, totals)| totals)?;
    Some(format!("#{:02x}{:02x}{:02x}", r / count, g / count, b / count))
}

#[async_trait]
impl ColorExtractor for DominantColorExtractor {
    async fn extract(&self, media_url: &str) -> String {
        if looks_like_video(media_url) {
            return FALLBACK_DOMINANT_COLOR.to_string();
        }
        let Some(data) = self.load(media_url).await else {
            return FALLBACK_DOMINANT_COLOR.to_string();
        };

        match tokio::task::spawn_blocking(move || dominant_color(&data)).await {
            Ok(Some(hex)) => hex,
            Ok(None) => {
                debug!(url = media_url, "media could not be decoded as an image");
                FALLBACK_DOMINANT_COLOR.to_string()
            }
            Err(err) => {
                warn!(url = media_url, error = %err, "colour extraction task failed");
                FALLBACK_DOMINANT_COLOR.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, paint: impl Fn(u32, u32) -> Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, paint);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn majority_colour_wins() {
        let data = png(10, 10, |x, _| {
            if x < 7 {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([10, 10, 200, 255])
            }
        });
        assert_eq!(dominant_color(&data).as_deref(), Some("#c81e1e"));
    }

    #[test]
    fn transparent_pixels_are_ignored() {
        let data = png(4, 4, |x, _| {
            if x == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        assert_eq!(dominant_color(&data).as_deref(), Some("#ffffff"));
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert_eq!(dominant_color(b"definitely not a png"), None);
    }

    #[tokio::test]
    async fn capped_read_collects_small_bodies() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);
        let body = read_capped(chunks, 6).await.unwrap();
        assert_eq!(body.as_deref(), Some(&b"abcdef"[..]));
    }

    #[tokio::test]
    async fn capped_read_stops_once_the_limit_is_passed() {
        // the trailing error is never polled
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from(vec![0u8; 6])),
            Ok(Bytes::from(vec![0u8; 6])),
            Err(std::io::Error::other("connection reset")),
        ]);
        assert!(read_capped(chunks, 10).await.unwrap().is_none());

        let failing = futures::stream::iter(vec![Err::<Bytes, _>(std::io::Error::other("reset"))]);
        assert!(read_capped(failing, 10).await.is_err());
    }

    #[test]
    fn video_urls_are_detected_by_extension() {
        assert!(looks_like_video("https://cdn.example.com/clip.mp4?v=2"));
        assert!(looks_like_video("/media/ab/cd/abcd.webm"));
        assert!(!looks_like_video("https://cdn.example.com/still.jpg"));
    }

    #[tokio::test]
    async fn local_files_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalMediaStore::new(dir.path(), "/media"));
        let url = domains::MediaStore::upload(
            store.as_ref(),
            Bytes::from(png(2, 2, |_, _| Rgba([0, 128, 0, 255]))),
            &mime::IMAGE_PNG,
        )
        .await
        .unwrap();

        let extractor = DominantColorExtractor::new(Duration::from_secs(1))
            .unwrap()
            .with_local_store(store);
        assert_eq!(extractor.extract(&url).await, "#008000");
    }

    #[tokio::test]
    async fn unusable_sources_fall_back() {
        let extractor = DominantColorExtractor::new(Duration::from_secs(1)).unwrap();
        assert_eq!(extractor.extract("ftp://example.com/a.png").await, FALLBACK_DOMINANT_COLOR);
        assert_eq!(extractor.extract("https://example.com/a.mp4").await, FALLBACK_DOMINANT_COLOR);
    }
}
