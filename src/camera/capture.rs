use crate::camera::frame::{CapturedFrame, Zoom};
use crate::common::{JarvisError, Result};
use image::DynamicImage;

/// A live video feed. `grab` samples whatever frame is current and never
/// waits for the next one.
pub trait FrameSource: Send {
    /// Acquire the device. Permission or device failures map to
    /// [`JarvisError::CameraDenied`].
    fn open(&mut self) -> Result<()>;

    /// Latest decoded frame, or `None` before the first one arrives.
    fn grab(&mut self) -> Result<Option<DynamicImage>>;

    /// Release the device. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Camera ownership for one screen: start, stop and zoomed stills.
pub struct CameraCapture {
    source: Box<dyn FrameSource>,
    active: bool,
}

impl CameraCapture {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self { source, active: false }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        self.source.open().map_err(|e| match e {
            JarvisError::CameraDenied(msg) => JarvisError::CameraDenied(msg),
            other => JarvisError::CameraDenied(other.to_string()),
        })?;
        self.active = true;
        tracing::info!("Camera started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.source.close();
        self.active = false;
        tracing::info!("Camera stopped");
    }

    pub fn has_active_feed(&self) -> bool {
        self.active
    }

    /// Still from the current feed with the zoom window applied. `None`
    /// while the camera is off or no frame has arrived yet.
    pub fn capture_frame(&mut self, zoom: Zoom) -> Result<Option<CapturedFrame>> {
        match self.latest_image()? {
            Some(image) => Ok(Some(CapturedFrame::from_image(&image, zoom)?)),
            None => Ok(None),
        }
    }

    /// Raw current frame, used for previews.
    pub fn latest_image(&mut self) -> Result<Option<DynamicImage>> {
        if !self.active {
            return Ok(None);
        }
        self.source.grab()
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Frame source backed by a fixed image.
    pub(crate) struct StaticSource {
        pub image: Option<DynamicImage>,
        pub deny: bool,
        pub opens: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl StaticSource {
        pub(crate) fn new(width: u32, height: u32) -> Self {
            Self {
                image: Some(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([90, 90, 90])))),
                deny: false,
                opens: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FrameSource for StaticSource {
        fn open(&mut self) -> Result<()> {
            if self.deny {
                return Err(JarvisError::Camera("Permission denied".into()));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn grab(&mut self) -> Result<Option<DynamicImage>> {
            Ok(self.image.clone())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn capture_requires_active_feed() {
        let mut camera = CameraCapture::new(Box::new(StaticSource::new(64, 48)));
        assert!(camera.capture_frame(Zoom::NONE).unwrap().is_none());
        camera.start().unwrap();
        assert!(camera.has_active_feed());
        assert!(camera.capture_frame(Zoom::NONE).unwrap().is_some());
    }

    #[test]
    fn no_frame_yet_returns_none() {
        let mut source = StaticSource::new(64, 48);
        source.image = None;
        let mut camera = CameraCapture::new(Box::new(source));
        camera.start().unwrap();
        assert!(camera.capture_frame(Zoom::default()).unwrap().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let source = StaticSource::new(64, 48);
        let closes = source.closes.clone();
        let mut camera = CameraCapture::new(Box::new(source));
        camera.start().unwrap();
        camera.stop();
        camera.stop();
        drop(camera);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn open_failure_is_camera_denied() {
        let mut source = StaticSource::new(64, 48);
        source.deny = true;
        let mut camera = CameraCapture::new(Box::new(source));
        assert!(matches!(camera.start(), Err(JarvisError::CameraDenied(_))));
        assert!(!camera.has_active_feed());
    }
}
