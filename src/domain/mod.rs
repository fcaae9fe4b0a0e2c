//! Domain layer: camera identity and alert payload records.
//!
//! Persistence of camera and alert records happens elsewhere; this module
//! only holds the shapes that travel over the real-time channel.

pub mod alert;
pub mod camera_id;

pub use alert::{AlertNotice, CameraStatsNotice};
pub use camera_id::CameraId;
