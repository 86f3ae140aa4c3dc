pub mod transform;

#[cfg(feature = "desktop")]
pub mod capture;

#[cfg(feature = "desktop")]
pub use capture::{FrameSource, OpenCvCamera};
pub use transform::{center_crop_window, rotated_size, CropWindow, FrameTransform};
