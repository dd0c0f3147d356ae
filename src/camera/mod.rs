pub mod capture;
pub mod frame;
pub mod v4l2;

pub use capture::{CameraCapture, FrameSource};
pub use frame::{CapturedFrame, CropWindow, Zoom};
pub use v4l2::V4l2Source;
