//! Video access for the sampler: seek to a time, then rasterize the frame
//! shown there.
//!
//! Decoding real containers is left to whatever sits behind [`VideoSource`];
//! the bundled [`FrameDirectorySource`] plays back a directory of
//! pre-extracted stills at a fixed frame rate.

use image::imageops::FilterType;
use image::RgbImage;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::VideoError;

/// One rasterized frame handed to the pose detector.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    /// Presentation time of the frame the source settled on.
    pub timestamp_ms: u64,
    pub image: RgbImage,
}

impl RasterFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A seekable video.
pub trait VideoSource: Send {
    fn duration_secs(&self) -> f64;

    /// Native frame size; `None` when the container does not report it.
    fn native_size(&self) -> Option<(u32, u32)>;

    /// Resolves once the frame at `t_secs` is ready to be drawn.
    fn seek(&mut self, t_secs: f64) -> impl Future<Output = Result<(), VideoError>> + Send;

    /// Draw the current frame onto a `width × height` canvas.
    fn rasterize(
        &mut self,
        width: u32,
        height: u32,
    ) -> impl Future<Output = Result<RasterFrame, VideoError>> + Send;
}

// ─── Frame directory ─────────────────────────────────────────────────────────

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Plays back `dir/*.{jpg,jpeg,png}` in file-name order at `fps`.
pub struct FrameDirectorySource {
    frames: Vec<PathBuf>,
    fps: f64,
    native: Option<(u32, u32)>,
    current: Option<(usize, u64)>,
}

impl FrameDirectorySource {
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self, VideoError> {
        let dir = dir.as_ref();
        if fps <= 0.0 {
            return Err(VideoError::Rasterize(format!("invalid frame rate {}", fps)));
        }
        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();

        let native = match frames.first() {
            Some(first) => Some(image::image_dimensions(first)?),
            None => None,
        };
        debug!(
            "Frame directory {}: {} frames at {} fps, native {:?}",
            dir.display(),
            frames.len(),
            fps,
            native
        );

        Ok(Self {
            frames,
            fps,
            native,
            current: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl VideoSource for FrameDirectorySource {
    fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.fps
    }

    fn native_size(&self) -> Option<(u32, u32)> {
        self.native
    }

    async fn seek(&mut self, t_secs: f64) -> Result<(), VideoError> {
        // small epsilon so t = k / fps lands on frame k despite rounding
        let idx = (t_secs * self.fps + 1e-6).floor();
        if t_secs < 0.0 || idx as usize >= self.frames.len() {
            return Err(VideoError::Seek {
                at_secs: t_secs,
                reason: format!("outside 0..{:.3}s", self.duration_secs()),
            });
        }
        self.current = Some((idx as usize, (t_secs * 1000.0).round() as u64));
        Ok(())
    }

    async fn rasterize(&mut self, width: u32, height: u32) -> Result<RasterFrame, VideoError> {
        let (idx, timestamp_ms) = self
            .current
            .ok_or_else(|| VideoError::Rasterize("rasterize called before seek".into()))?;
        let path = self.frames[idx].clone();

        let image = tokio::task::spawn_blocking(move || -> Result<RgbImage, VideoError> {
            let rgb = image::open(&path)?.to_rgb8();
            if rgb.width() == width && rgb.height() == height {
                Ok(rgb)
            } else {
                Ok(image::imageops::resize(&rgb, width, height, FilterType::Triangle))
            }
        })
        .await
        .map_err(|e| VideoError::Rasterize(e.to_string()))??;

        Ok(RasterFrame {
            timestamp_ms,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(dir: &Path, n: usize, w: u32, h: u32) {
        for i in 0..n {
            let img = RgbImage::from_pixel(w, h, image::Rgb([i as u8 * 10, 0, 0]));
            img.save(dir.join(format!("frame_{:04}.png", i))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    #[tokio::test]
    async fn test_directory_playback() {
        let tmp = tempfile::tempdir().unwrap();
        write_frames(tmp.path(), 10, 32, 18);
        let mut src = FrameDirectorySource::open(tmp.path(), 5.0).unwrap();
        assert_eq!(src.frame_count(), 10);
        assert_eq!(src.duration_secs(), 2.0);
        assert_eq!(src.native_size(), Some((32, 18)));

        src.seek(0.6).await.unwrap();
        let f = src.rasterize(32, 18).await.unwrap();
        assert_eq!(f.timestamp_ms, 600);
        assert_eq!(f.image.get_pixel(0, 0).0[0], 30);

        let scaled = src.rasterize(16, 9).await.unwrap();
        assert_eq!((scaled.width(), scaled.height()), (16, 9));
    }

    #[tokio::test]
    async fn test_seek_out_of_range() {
        let tmp = tempfile::tempdir().unwrap();
        write_frames(tmp.path(), 2, 8, 8);
        let mut src = FrameDirectorySource::open(tmp.path(), 5.0).unwrap();
        assert!(matches!(src.seek(0.4).await, Err(VideoError::Seek { .. })));
        assert!(src.rasterize(8, 8).await.is_err());
    }

    #[test]
    fn test_empty_directory_has_zero_duration() {
        let tmp = tempfile::tempdir().unwrap();
        let src = FrameDirectorySource::open(tmp.path(), 5.0).unwrap();
        assert_eq!(src.duration_secs(), 0.0);
        assert_eq!(src.native_size(), None);
    }
}
