//! Thumbnail generation and the on-demand lazy-fetch path.
//!
//! Thumbnails live in a flat, separate object-store namespace keyed by
//! content hash rather than file path, so two files with identical bytes
//! share one thumbnail and a rename never invalidates it. Generation never
//! upscales past the source's longest side. Storage path is always
//! `<chash>_<size>.webp` regardless of what's actually inside it: an
//! animated GIF is stored under that same `.webp`-suffixed path, its bytes
//! are just GIF-encoded rather than WebP-encoded, so the animation survives
//! a round trip through a fixed-extension cache.
//!
//! PDF page rasterization is an external boundary, not a missing feature:
//! nothing in this crate's own dependency stack turns PDF bytes into
//! pixels, so actual decoding is delegated to an injected [`PdfRenderer`].
//! Without one wired in, a PDF thumbnail request fails with
//! `ThumbnailUnavailable`, same as any other decode failure.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, Frame, RgbaImage};
use webp::Encoder;

use crate::cache::Cache;
use crate::config::Configuration;
use crate::error::{CoreError, CoreResult};
use crate::mediatype;
use crate::object_store::{BoxedReader, ObjectStore};

/// Separate from any namespace in the metadata tree -- see the module doc.
pub const THUMBS_NS: &str = "thumbs";

fn thumb_path(chash: &str, size: u32) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{}/{}/{}/{}_{}.webp", &chash[0..2], &chash[2..4], &chash[4..6], chash, size))
}

fn lock_key(chash: &str, size: u32) -> String {
    format!("thumbnail-lock:{chash}:{size}")
}

/// WebP encode quality; larger targets trade a little quality for faster
/// encode since there are more pixels to push through libwebp.
fn quality_for(size: u32) -> f32 {
    if size >= 1920 {
        65.0
    } else {
        80.0
    }
}

/// The seam for turning a PDF's bytes into a pixel buffer. This crate
/// doesn't carry a PDF rendering library itself (see the module doc); a
/// host binary that wants PDF thumbnails wires one in via
/// [`ThumbnailService::with_pdf_renderer`].
pub trait PdfRenderer: Send + Sync {
    /// Render page 0 of `pdf_bytes`, downscaled so its longest side is at
    /// most `max_size`. Never upscales a page smaller than `max_size`.
    fn render_page_zero(&self, pdf_bytes: &[u8], max_size: u32) -> CoreResult<RgbaImage>;
}

pub struct ThumbnailService {
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn Cache>,
    config: Configuration,
    pdf_renderer: Option<Arc<dyn PdfRenderer>>,
}

impl ThumbnailService {
    pub fn new(store: Arc<dyn ObjectStore>, cache: Arc<dyn Cache>, config: Configuration) -> Self {
        ThumbnailService { store, cache, config, pdf_renderer: None }
    }

    pub fn with_pdf_renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.pdf_renderer = Some(renderer);
        self
    }

    pub fn is_supported(media_type: &str) -> bool {
        matches!(
            media_type,
            mediatype::IMAGE_JPEG
                | mediatype::IMAGE_PNG
                | mediatype::IMAGE_GIF
                | mediatype::IMAGE_BMP
                | mediatype::IMAGE_TIFF
                | mediatype::IMAGE_WEBP
                | mediatype::APPLICATION_PDF
        )
    }

    /// Eagerly render every configured size for `source` and store each
    /// under its content-hash path. A no-op for unsupported media types or
    /// an empty (folder) `chash`.
    pub async fn generate_thumbnails(&self, source: Vec<u8>, media_type: &str, chash: &str) -> CoreResult<()> {
        if chash.is_empty() || !Self::is_supported(media_type) {
            return Ok(());
        }
        let sizes = self.config.thumbnail_sizes.clone();
        let media_type = media_type.to_string();
        let pdf_renderer = self.pdf_renderer.clone();
        let rendered = tokio::task::spawn_blocking(move || render_all(&source, &media_type, &sizes, pdf_renderer.as_deref()))
            .await
            .map_err(|e| CoreError::Internal(anyhow::Error::new(e)))??;

        for (size, bytes) in rendered {
            let path = thumb_path(chash, size);
            let reader: BoxedReader = Box::pin(std::io::Cursor::new(bytes));
            self.store.save(THUMBS_NS, &path, reader).await?;
        }
        Ok(())
    }

    /// Fetch a thumbnail, generating it on demand (behind a per-
    /// `(chash, size)` lock so concurrent requesters don't all render the
    /// same image at once) if it isn't already stored. `source` is only
    /// invoked on a cache/store miss.
    pub async fn thumbnail<F, Fut>(&self, chash: &str, size: u32, media_type: &str, source: F) -> CoreResult<BoxedReader>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CoreResult<(Vec<u8>, String)>>,
    {
        if chash.is_empty() || !Self::is_supported(media_type) {
            return Err(CoreError::ThumbnailUnavailable { path: chash.into() });
        }
        let path = thumb_path(chash, size);
        if let Ok(reader) = self.store.download(THUMBS_NS, &path).await {
            return Ok(reader);
        }

        let key = lock_key(chash, size);
        let ttl = Duration::from_secs(self.config.thumbnail_lock_expire_secs);
        if !self.cache.acquire_lock(&key, ttl).await {
            // Another task is generating this one; the spec's resource
            // model has no cross-task wait primitive here, so the caller
            // gets a miss and is expected to retry shortly.
            return Err(CoreError::ThumbnailUnavailable { path: chash.into() });
        }

        let (bytes, actual_media_type) = source().await?;
        self.generate_thumbnails(bytes, &actual_media_type, chash).await?;
        self.store.download(THUMBS_NS, &path).await
    }
}

fn render_all(source: &[u8], media_type: &str, sizes: &[u32], pdf_renderer: Option<&dyn PdfRenderer>) -> CoreResult<Vec<(u32, Vec<u8>)>> {
    if media_type == mediatype::APPLICATION_PDF {
        return render_pdf(source, sizes, pdf_renderer);
    }

    if media_type == mediatype::IMAGE_GIF {
        if let Ok(frames) = decode_gif_frames(source) {
            if frames.len() > 1 {
                let mut out = Vec::with_capacity(sizes.len());
                for &size in sizes {
                    out.push((size, render_animated_gif(source, &frames, size)?));
                }
                return Ok(out);
            }
        }
    }

    render_static(source, sizes)
}

fn render_static(source: &[u8], sizes: &[u32]) -> CoreResult<Vec<(u32, Vec<u8>)>> {
    let img = image::load_from_memory(source).map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
    let longest = img.width().max(img.height());

    let mut out = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let resized = if size >= longest { img.clone() } else { img.resize(size, size, FilterType::Lanczos3) };
        let rgba = resized.to_rgba8();
        let encoder = Encoder::from_rgba(&rgba, resized.width(), resized.height());
        let encoded = encoder.encode(quality_for(size));
        out.push((size, encoded.to_vec()));
    }
    Ok(out)
}

fn render_pdf(source: &[u8], sizes: &[u32], pdf_renderer: Option<&dyn PdfRenderer>) -> CoreResult<Vec<(u32, Vec<u8>)>> {
    let renderer = pdf_renderer.ok_or_else(|| CoreError::ThumbnailUnavailable { path: Utf8PathBuf::from("<pdf>") })?;
    let mut out = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let page = renderer.render_page_zero(source, size)?;
        let encoder = Encoder::from_rgba(&page, page.width(), page.height());
        out.push((size, encoder.encode(quality_for(size)).to_vec()));
    }
    Ok(out)
}

fn decode_gif_frames(source: &[u8]) -> image::ImageResult<Vec<Frame>> {
    let decoder = GifDecoder::new(std::io::Cursor::new(source))?;
    decoder.into_frames().collect_frames()
}

/// Resize every frame of an animated GIF to fit within `size` (preserving
/// aspect ratio, never upscaling) and re-encode as an animated GIF. If the
/// source already fits, the original bytes are returned untouched so the
/// stored thumbnail is bit-identical to the upload.
fn render_animated_gif(source: &[u8], frames: &[Frame], size: u32) -> CoreResult<Vec<u8>> {
    let (width, height) = frames[0].buffer().dimensions();
    if width < size && height < size {
        return Ok(source.to_vec());
    }

    let mut resized = Vec::with_capacity(frames.len());
    for frame in frames {
        let delay = frame.delay();
        let rgba = DynamicImage::ImageRgba8(frame.buffer().clone()).resize(size, size, FilterType::Lanczos3).to_rgba8();
        resized.push(Frame::from_parts(rgba, 0, 0, delay));
    }

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder.set_repeat(Repeat::Infinite).map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
        encoder.encode_frames(resized).map_err(|e| CoreError::Internal(anyhow::Error::new(e)))?;
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, image::Rgba([1, 2, 3, 255])));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn gif_bytes(frames: usize, w: u32, h: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let mut encoder = GifEncoder::new(&mut out);
        let images: Vec<Frame> = (0..frames)
            .map(|i| Frame::new(RgbaImage::from_pixel(w, h, image::Rgba([i as u8, 0, 0, 255]))))
            .collect();
        encoder.encode_frames(images).unwrap();
        out
    }

    #[test]
    fn never_upscales_past_the_source() {
        let rendered = render_static(&png_bytes(10, 10), &[1024]).unwrap();
        assert_eq!(rendered.len(), 1);
    }

    #[test]
    fn animated_gif_keeps_all_frames() {
        let bytes = gif_bytes(3, 40, 40);
        let rendered = render_all(&bytes, mediatype::IMAGE_GIF, &[20], None).unwrap();
        assert_eq!(rendered.len(), 1);
        let frames = decode_gif_frames(&rendered[0].1).unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn animated_gif_smaller_than_target_is_returned_unchanged() {
        let bytes = gif_bytes(2, 10, 10);
        let rendered = render_all(&bytes, mediatype::IMAGE_GIF, &[1024], None).unwrap();
        assert_eq!(rendered[0].1, bytes);
    }

    #[test]
    fn single_frame_gif_goes_through_the_static_webp_path() {
        let bytes = gif_bytes(1, 40, 40);
        let rendered = render_all(&bytes, mediatype::IMAGE_GIF, &[20], None).unwrap();
        // WebP output, not a re-encoded GIF.
        assert!(decode_gif_frames(&rendered[0].1).is_err());
    }

    #[test]
    fn pdf_without_a_renderer_is_unavailable() {
        let err = render_all(b"%PDF-1.4", mediatype::APPLICATION_PDF, &[256], None).unwrap_err();
        assert!(matches!(err, CoreError::ThumbnailUnavailable { .. }));
    }

    struct FixedRenderer;
    impl PdfRenderer for FixedRenderer {
        fn render_page_zero(&self, _pdf_bytes: &[u8], max_size: u32) -> CoreResult<RgbaImage> {
            let side = max_size.min(200);
            Ok(RgbaImage::from_pixel(side, side, image::Rgba([9, 9, 9, 255])))
        }
    }

    #[test]
    fn pdf_with_a_renderer_produces_a_webp_thumbnail() {
        let renderer = FixedRenderer;
        let rendered = render_all(b"%PDF-1.4", mediatype::APPLICATION_PDF, &[256], Some(&renderer)).unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(crate::mediatype::guess(&rendered[0].1, None), mediatype::IMAGE_WEBP);
    }
}
