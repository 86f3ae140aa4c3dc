pub mod overlay;
pub mod skeleton;

#[cfg(feature = "desktop")]
pub use overlay::Overlay;
pub use overlay::{countdown_origin, countdown_text, line_origin, measurement_lines};
pub use skeleton::SKELETON_CONNECTIONS;
