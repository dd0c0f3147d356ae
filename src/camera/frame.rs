use crate::common::{JarvisError, Result, ZOOM_LEVELS};
use base64ct::{Base64, Encoding};
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use std::io::Cursor;

const JPEG_QUALITY: u8 = 85;

/// Digital zoom factor, restricted to the levels the auth screen offers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom(f32);

impl Zoom {
    pub const NONE: Zoom = Zoom(1.0);

    pub fn new(factor: f32) -> Result<Self> {
        if ZOOM_LEVELS.contains(&factor) {
            Ok(Self(factor))
        } else {
            Err(JarvisError::Config(format!(
                "Unsupported zoom {}x (expected one of {:?})", factor, ZOOM_LEVELS
            )))
        }
    }

    pub fn factor(&self) -> f32 {
        self.0
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self(1.4)
    }
}

impl std::fmt::Display for Zoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Region of the native frame that a capture was sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropWindow {
    /// Center window of `1/zoom` the frame size in each axis.
    pub fn centered(frame_width: u32, frame_height: u32, zoom: Zoom) -> Self {
        if zoom.factor() <= 1.0 || frame_width == 0 || frame_height == 0 {
            return Self { x: 0, y: 0, width: frame_width, height: frame_height };
        }
        let width = ((frame_width as f32 / zoom.factor()).round() as u32).clamp(1, frame_width.max(1));
        let height = ((frame_height as f32 / zoom.factor()).round() as u32).clamp(1, frame_height.max(1));
        Self {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        }
    }

    pub fn is_full_frame(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == frame_width && self.height == frame_height
    }
}

/// Encoded still taken from the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// `data:image/jpeg;base64,...` payload as the backend expects it.
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub crop: CropWindow,
}

impl CapturedFrame {
    /// Crop to the zoom window, scale back up to native size and encode.
    pub fn from_image(image: &DynamicImage, zoom: Zoom) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(JarvisError::Camera("Empty frame".into()));
        }

        let crop = CropWindow::centered(width, height, zoom);
        let sampled = if crop.is_full_frame(width, height) {
            image.to_rgb8()
        } else {
            image
                .crop_imm(crop.x, crop.y, crop.width, crop.height)
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8()
        };

        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(sampled)
            .write_to(&mut Cursor::new(&mut jpeg), ImageOutputFormat::Jpeg(JPEG_QUALITY))?;

        Ok(Self {
            data_url: format!("data:image/jpeg;base64,{}", Base64::encode_string(&jpeg)),
            width,
            height,
            crop,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.data_url
    }

    /// Decode the payload back into pixels.
    pub fn decode(&self) -> Result<DynamicImage> {
        let encoded = self
            .data_url
            .split_once(',')
            .map(|(_, b64)| b64)
            .unwrap_or(&self.data_url);
        let bytes = Base64::decode_vec(encoded)
            .map_err(|e| JarvisError::Camera(format!("Corrupt frame payload: {}", e)))?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn zoom_accepts_only_offered_levels() {
        assert!(Zoom::new(1.0).is_ok());
        assert!(Zoom::new(1.4).is_ok());
        assert!(Zoom::new(1.8).is_ok());
        assert!(Zoom::new(2.0).is_err());
        assert_eq!(Zoom::default().factor(), 1.4);
    }

    #[test]
    fn zoom_1_4_crop_is_centered_and_scaled() {
        let crop = CropWindow::centered(640, 480, Zoom::new(1.4).unwrap());
        assert!((crop.width as f32 - 640.0 / 1.4).abs() <= 1.0);
        assert!((crop.height as f32 - 480.0 / 1.4).abs() <= 1.0);

        // Equal margins on both sides, up to integer rounding.
        let right = 640 - (crop.x + crop.width);
        let bottom = 480 - (crop.y + crop.height);
        assert!(right.abs_diff(crop.x) <= 1);
        assert!(bottom.abs_diff(crop.y) <= 1);
    }

    #[test]
    fn no_zoom_uses_full_frame() {
        let crop = CropWindow::centered(640, 480, Zoom::NONE);
        assert_eq!(crop, CropWindow { x: 0, y: 0, width: 640, height: 480 });
    }

    #[test]
    fn captured_frame_keeps_native_dimensions() {
        let frame = CapturedFrame::from_image(&gradient(320, 240), Zoom::new(1.8).unwrap()).unwrap();
        assert!(frame.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!((frame.width, frame.height), (320, 240));
        assert_eq!(frame.crop, CropWindow::centered(320, 240, Zoom::new(1.8).unwrap()));

        let decoded = frame.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }
}
