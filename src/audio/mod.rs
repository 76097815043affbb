//! Audio capture, sample codecs, and voice activity detection.

pub mod capture;
pub mod codec;
pub mod device;
pub mod vad;

pub use capture::{CaptureStream, Frame};
pub use device::{AudioOptions, list_input_devices, resolve_input_device};
pub use vad::{VadConfig, VadEvent, VadHandle, VoiceActivityDetector};
