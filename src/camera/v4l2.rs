use crate::camera::capture::FrameSource;
use crate::common::config::CameraConfig;
use crate::common::{JarvisError, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// V4L2 webcam. A worker thread keeps the stream running and publishes
/// the most recent decoded frame.
pub struct V4l2Source {
    config: CameraConfig,
    latest: Arc<Mutex<Option<DynamicImage>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl V4l2Source {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl FrameSource for V4l2Source {
    fn open(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let config = self.config.clone();
        let latest = self.latest.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let worker = std::thread::Builder::new()
            .name("v4l2-capture".into())
            .spawn(move || stream_frames(config, latest, running, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                self.running.store(false, Ordering::SeqCst);
                Err(JarvisError::CameraDenied("Capture thread exited before the stream started".into()))
            }
        }
    }

    fn grab(&mut self) -> Result<Option<DynamicImage>> {
        let latest = self
            .latest
            .lock()
            .map_err(|_| JarvisError::Camera("Frame buffer poisoned".into()))?;
        Ok(latest.clone())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_device(config: &CameraConfig) -> Result<(Device, v4l::Format)> {
    let index = config.device_index;
    tracing::info!("Opening camera device {}...", index);

    let device = Device::new(index as usize)
        .map_err(|e| JarvisError::CameraDenied(format!("Failed to open camera {}: {}", index, e)))?;

    let mut fmt = device
        .format()
        .map_err(|e| JarvisError::Camera(format!("Failed to get format: {}", e)))?;

    fmt.width = config.width;
    fmt.height = config.height;
    if fmt.fourcc != FourCC::new(b"GREY") {
        fmt.fourcc = FourCC::new(b"MJPG");
    }

    if let Err(e) = device.set_format(&fmt) {
        tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
    }

    let actual = device
        .format()
        .map_err(|e| JarvisError::Camera(format!("Failed to get final format: {}", e)))?;

    if actual.width != config.width || actual.height != config.height {
        tracing::warn!(
            "Camera resolution {}x{} differs from requested {}x{}",
            actual.width, actual.height, config.width, config.height
        );
    }
    tracing::debug!("Camera format: {}x{} {}", actual.width, actual.height, actual.fourcc);

    Ok((device, actual))
}

fn stream_frames(
    config: CameraConfig,
    latest: Arc<Mutex<Option<DynamicImage>>>,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<()>>,
) {
    let (mut device, fmt) = match open_device(&config) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut stream = match v4l::io::mmap::Stream::with_buffers(&mut device, Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(JarvisError::CameraDenied(format!("Failed to create stream: {}", e))));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut seen = 0u32;
    while running.load(Ordering::SeqCst) {
        let buf = match stream.next() {
            Ok((buf, _meta)) => buf,
            Err(e) => {
                tracing::warn!("Camera stream ended: {}", e);
                break;
            }
        };

        seen += 1;
        if seen <= config.warmup_frames {
            std::thread::sleep(std::time::Duration::from_millis(config.warmup_delay_ms));
            continue;
        }

        match decode_frame(buf, &fmt) {
            Ok(image) => {
                if let Ok(mut slot) = latest.lock() {
                    *slot = Some(image);
                }
            }
            Err(e) => tracing::debug!("Dropping undecodable frame: {}", e),
        }
    }
}

fn decode_frame(data: &[u8], fmt: &v4l::Format) -> Result<DynamicImage> {
    match &fmt.fourcc.repr {
        b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?),
        b"YUYV" => yuyv_to_image(data, fmt.width, fmt.height),
        b"GREY" => grey_to_image(data, fmt.width, fmt.height),
        other => Err(JarvisError::Camera(format!(
            "Unsupported format {}", String::from_utf8_lossy(other)
        ))),
    }
}

fn grey_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let pixels = (width * height) as usize;
    let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.get(..pixels).unwrap_or(data).to_vec())
        .ok_or_else(|| JarvisError::Camera("Failed to create grayscale image buffer".into()))?;
    Ok(DynamicImage::ImageLuma8(buffer))
}

fn yuyv_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(JarvisError::Camera(format!(
            "Short YUYV frame: {} bytes, expected {}", data.len(), expected
        )));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .ok_or_else(|| JarvisError::Camera("Failed to create RGB image buffer".into()))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

// BT.601 limited range.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_neutral_chroma_is_grey() {
        // Two pixels per 4-byte group; 4x1 image -> 8 bytes.
        let data = [128u8, 128, 128, 128, 128, 128, 128, 128];
        let image = yuyv_to_image(&data, 4, 1).unwrap().to_rgb8();
        for pixel in image.pixels() {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(yuyv_to_image(&[0u8; 6], 4, 1).is_err());
    }

    #[test]
    fn grey_frame_decodes() {
        let image = grey_to_image(&[10u8; 12], 4, 3).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn yuv_black_and_white_extremes() {
        assert_eq!(yuv_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128), [255, 255, 255]);
    }
}
