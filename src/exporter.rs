//! HTML → image export via an external renderer process.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, instrument};

use crate::models::{Dimensions, ExportMetadata, ImageExportOptions, ImageExportResponse};
use crate::utils::generate_short_uuid;

#[async_trait]
pub trait ImageRenderer: Send + Sync {
    /// Render `html_path` into `out_path` using `options`.
    async fn render(
        &self,
        html_path: &Path,
        out_path: &Path,
        options: &ImageExportOptions,
    ) -> anyhow::Result<()>;
}

/// Drives `wkhtmltoimage` (or a binary accepting the same flags).
#[derive(Debug, Clone)]
pub struct WkHtmlToImage {
    binary: String,
    default_width: u32,
}

impl WkHtmlToImage {
    pub fn new(binary: impl Into<String>, default_width: u32) -> Self {
        Self {
            binary: binary.into(),
            default_width,
        }
    }

    pub async fn ensure_available(&self) -> anyhow::Result<()> {
        let status = Command::new(&self.binary)
            .arg("--version")
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => Err(anyhow!("{} not available (exit status {})", self.binary, s)),
            Err(e) => Err(anyhow!("{} not available: {}", self.binary, e)),
        }
    }

    fn args(&self, html_path: &Path, out_path: &Path, options: &ImageExportOptions) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--format".to_string(),
            options.format.extension().to_string(),
            "--quality".to_string(),
            options.quality.to_string(),
            "--width".to_string(),
            options.width.unwrap_or(i64::from(self.default_width)).to_string(),
        ];
        if let Some(height) = options.height {
            args.push("--height".into());
            args.push(height.to_string());
        }
        if let Some(scale) = options.scale {
            args.push("--zoom".into());
            args.push(scale.to_string());
        }
        args.push(html_path.to_string_lossy().to_string());
        args.push(out_path.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl ImageRenderer for WkHtmlToImage {
    async fn render(
        &self,
        html_path: &Path,
        out_path: &Path,
        options: &ImageExportOptions,
    ) -> anyhow::Result<()> {
        let status = Command::new(&self.binary)
            .args(self.args(html_path, out_path, options))
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to spawn {}", self.binary))?;
        if !status.success() {
            return Err(anyhow!(
                "{} exited with status {} for {}",
                self.binary,
                status,
                html_path.display()
            ));
        }
        Ok(())
    }
}

const MAX_DIMENSION: i64 = 16_384;

pub fn validate_options(options: &ImageExportOptions) -> Result<(), String> {
    if !(1..=100).contains(&options.quality) {
        return Err("quality must be between 1 and 100".into());
    }
    let in_range = |v: Option<i64>| v.map_or(true, |v| (1..=MAX_DIMENSION).contains(&v));
    if !in_range(options.width) || !in_range(options.height) {
        return Err(format!("width and height must be between 1 and {}", MAX_DIMENSION));
    }
    if let Some(scale) = options.scale {
        if !(scale.is_finite() && scale > 0.0) {
            return Err("scale must be positive".into());
        }
    }
    Ok(())
}

/// Read width/height from a PNG IHDR chunk or a JPEG SOFn marker.
pub fn sniff_dimensions(bytes: &[u8]) -> Option<Dimensions> {
    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.len() >= 24 && bytes.starts_with(PNG_SIGNATURE) && &bytes[12..16] == b"IHDR" {
        let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        return Some(Dimensions { width, height });
    }

    if bytes.len() >= 4 && bytes[0] == 0xFF && bytes[1] == 0xD8 {
        let mut i = 2;
        while i + 9 < bytes.len() {
            if bytes[i] != 0xFF {
                return None;
            }
            let marker = bytes[i + 1];
            let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
            // SOF0..SOF15 except DHT (C4), JPG (C8) and DAC (CC)
            if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
                let height = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]) as u32;
                let width = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]) as u32;
                return Some(Dimensions { width, height });
            }
            i += 2 + len;
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub path: PathBuf,
    pub url: String,
    pub metadata: ExportMetadata,
}

#[instrument(skip(renderer, html), fields(bytes = html.len()))]
pub async fn render_to_file(
    renderer: &dyn ImageRenderer,
    html: &str,
    options: &ImageExportOptions,
    exports_dir: &Path,
    default_width: u32,
) -> anyhow::Result<ExportedImage> {
    tokio::fs::create_dir_all(exports_dir)
        .await
        .with_context(|| format!("failed to create exports dir: {}", exports_dir.display()))?;

    let id = generate_short_uuid();
    let ext = options.format.extension();
    let html_path = exports_dir.join(format!("{}.html", id));
    let out_path = exports_dir.join(format!("{}.{}", id, ext));
    tokio::fs::write(&html_path, html).await?;

    let rendered = renderer.render(&html_path, &out_path, options).await;
    let _ = tokio::fs::remove_file(&html_path).await;
    rendered?;

    let bytes = tokio::fs::read(&out_path)
        .await
        .with_context(|| format!("renderer produced no file at {}", out_path.display()))?;
    let requested = |v: Option<i64>, fallback: u32| {
        let scale = options.scale.unwrap_or(1.0);
        (v.map_or(fallback as f32, |v| v as f32) * scale).round() as u32
    };
    let dimensions = sniff_dimensions(&bytes).unwrap_or(Dimensions {
        width: requested(options.width, default_width),
        height: requested(options.height, 0),
    });

    info!(%id, size = bytes.len(), "image exported");
    Ok(ExportedImage {
        url: format!("/exports/{}.{}", id, ext),
        path: out_path,
        metadata: ExportMetadata {
            file_size: bytes.len() as u64,
            dimensions,
        },
    })
}

/// `POST /export/image`. Failures come back as `success: false`.
pub async fn export_image(
    renderer: &dyn ImageRenderer,
    html: &str,
    options: &ImageExportOptions,
    exports_dir: &Path,
    default_width: u32,
) -> ImageExportResponse {
    if html.trim().is_empty() {
        return ImageExportResponse::failure("htmlContent must not be empty");
    }
    if let Err(msg) = validate_options(options) {
        return ImageExportResponse::failure(msg);
    }
    match render_to_file(renderer, html, options, exports_dir, default_width).await {
        Ok(img) => ImageExportResponse {
            success: true,
            image_url: Some(img.url),
            error: None,
            metadata: Some(img.metadata),
        },
        Err(err) => {
            error!(?err, "image export failed");
            ImageExportResponse::failure(format!("image export failed: {}", err))
        }
    }
}

pub fn content_type_for(file: &str) -> Option<&'static str> {
    let ext = Path::new(file).extension()?.to_str()?;
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageFormat;
    use tempfile::tempdir;

    fn tiny_png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    struct PngRenderer;

    #[async_trait]
    impl ImageRenderer for PngRenderer {
        async fn render(&self, _html: &Path, out: &Path, _o: &ImageExportOptions) -> anyhow::Result<()> {
            tokio::fs::write(out, tiny_png(640, 480)).await?;
            Ok(())
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl ImageRenderer for BrokenRenderer {
        async fn render(&self, _html: &Path, _out: &Path, _o: &ImageExportOptions) -> anyhow::Result<()> {
            Err(anyhow!("renderer crashed"))
        }
    }

    #[test]
    fn sniff_png() {
        assert_eq!(
            sniff_dimensions(&tiny_png(800, 600)),
            Some(Dimensions { width: 800, height: 600 })
        );
    }

    #[test]
    fn sniff_jpeg_sof0() {
        let bytes = [
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, // APP0, len 4
            0xFF, 0xC0, 0x00, 0x11, 0x08, 0x01, 0x2C, 0x01, 0x90, 0x03, 0x00, 0x00,
        ];
        assert_eq!(
            sniff_dimensions(&bytes),
            Some(Dimensions { width: 400, height: 300 })
        );
    }

    #[test]
    fn sniff_garbage() {
        assert_eq!(sniff_dimensions(b"hello"), None);
    }

    #[test]
    fn option_validation() {
        let ok = ImageExportOptions::default();
        assert!(validate_options(&ok).is_ok());
        assert!(validate_options(&ImageExportOptions { quality: 0, ..ok }).is_err());
        assert!(validate_options(&ImageExportOptions { width: Some(0), ..ok }).is_err());
        assert!(validate_options(&ImageExportOptions { quality: 300, ..ok }).is_err());
        assert!(validate_options(&ImageExportOptions { width: Some(-1), ..ok }).is_err());
        assert!(validate_options(&ImageExportOptions { height: Some(100_000), ..ok }).is_err());
        assert!(validate_options(&ImageExportOptions { scale: Some(-1.0), ..ok }).is_err());
    }

    #[test]
    fn renderer_args() {
        let r = WkHtmlToImage::new("wkhtmltoimage", 800);
        let opts = ImageExportOptions {
            format: ImageFormat::Jpeg,
            quality: 80,
            width: None,
            height: Some(1200),
            scale: Some(2.0),
        };
        let args = r.args(Path::new("in.html"), Path::new("out.jpg"), &opts);
        assert_eq!(
            args,
            vec![
                "--quiet", "--format", "jpg", "--quality", "80", "--width", "800", "--height",
                "1200", "--zoom", "2", "in.html", "out.jpg"
            ]
        );
    }

    #[tokio::test]
    async fn export_writes_image_and_reports_metadata() {
        let dir = tempdir().unwrap();
        let resp = export_image(&PngRenderer, "<p>x</p>", &ImageExportOptions::default(), dir.path(), 800).await;
        assert!(resp.success);
        let url = resp.image_url.unwrap();
        assert!(url.starts_with("/exports/") && url.ends_with(".png"));
        let meta = resp.metadata.unwrap();
        assert_eq!(meta.dimensions, Dimensions { width: 640, height: 480 });
        assert_eq!(meta.file_size, tiny_png(640, 480).len() as u64);
        // the intermediate HTML is removed
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |x| x == "html"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn export_failures_are_failure_shaped() {
        let dir = tempdir().unwrap();
        let resp = export_image(&PngRenderer, "   ", &ImageExportOptions::default(), dir.path(), 800).await;
        assert!(!resp.success);
        let resp = export_image(&BrokenRenderer, "<p/>", &ImageExportOptions::default(), dir.path(), 800).await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("renderer crashed"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.png"), Some("image/png"));
        assert_eq!(content_type_for("a.jpg"), Some("image/jpeg"));
        assert_eq!(content_type_for("a.html"), None);
    }
}
