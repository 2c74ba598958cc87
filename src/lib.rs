//! Serial driver for the Scribbler and Scribbler 2 robots with a Fluke
//! dongle: framing, timed exchanges, the identification handshake, motion
//! mixing and camera capture.

pub mod color;
pub mod driver;
pub mod error;
pub mod image;
pub mod info;
pub mod motion;
pub mod port;
pub mod protocol;

pub use driver::{
    AngleUnit, DriverConfig, DriverState, EmergencyStop, Field, MoveMode, Note, Reading,
    ScribblerDriver, Setting, WHOLE_NOTE,
};
pub use color::{rgb_to_yuv, yuv_to_rgb, yuyv_to_rgb};
pub use error::{DriverError, EncodingError, ProtocolError, Result};
pub use image::Image;
pub use info::{ConnectionInfo, FirmwareVersion, Resolution};
pub use motion::{MotionState, WheelPower};
