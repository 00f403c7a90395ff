use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{DebugControlRef, EventHandler};

/// Static metadata about a core.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: String,
    /// Pipe-delimited list of content file extensions.
    pub valid_extensions: Option<String>,
    /// Whether content must be supplied as a path rather than a buffer.
    pub need_fullpath: bool,
}

impl SystemInfo {
    pub fn new(library_name: impl Into<String>, library_version: impl Into<String>) -> Self {
        Self {
            library_name: library_name.into(),
            library_version: library_version.into(),
            valid_extensions: None,
            need_fullpath: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GameGeometry {
    pub base_width: u32,
    pub base_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub aspect_ratio: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct SystemTiming {
    pub fps: f64,
    pub sample_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AvInfo {
    pub geometry: GameGeometry,
    pub timing: SystemTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Xrgb8888,
    Rgb565,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDevice {
    Joypad,
    Analog,
}

/// Joypad button ids used by [`Host::input_state`].
pub mod joypad {
    pub const B: u32 = 0;
    pub const Y: u32 = 1;
    pub const SELECT: u32 = 2;
    pub const START: u32 = 3;
    pub const UP: u32 = 4;
    pub const DOWN: u32 = 5;
    pub const LEFT: u32 = 6;
    pub const RIGHT: u32 = 7;
    pub const A: u32 = 8;
    pub const X: u32 = 9;
    pub const L: u32 = 10;
    pub const R: u32 = 11;
    pub const L2: u32 = 12;
    pub const R2: u32 = 13;
    pub const L3: u32 = 14;
    pub const R3: u32 = 15;
    /// Pseudo-id: returns the OR of all sixteen buttons as a bitmask.
    pub const MASK: u32 = 256;
}

/// Controller device classes, as carried in [`ControllerType::id`].
pub mod device {
    pub const NONE: u32 = 0;
    pub const JOYPAD: u32 = 1;
    pub const ANALOG: u32 = 5;
    /// Low byte selects the base class; high bits are subclass specifics.
    pub const TYPE_MASK: u32 = 0xFF;
}

/// Controller type advertised by the core for one port.
#[derive(Debug, Clone)]
pub struct ControllerType {
    pub description: String,
    pub id: u32,
}

/// Host side of the emulator ABI, implemented by the frontend/backend and
/// handed to [`Core::run_frame`].
pub trait Host {
    // Environment.

    /// Only [`PixelFormat::Xrgb8888`] is accepted by this backend.
    fn set_pixel_format(&mut self, format: PixelFormat) -> bool;
    fn system_directory(&self) -> PathBuf;
    fn save_directory(&self) -> PathBuf;
    /// Core reports a geometry change mid-session.
    fn set_geometry(&mut self, width: u32, height: u32);
    /// Variable definitions as `(key, "Description; value1|value2")` pairs.
    fn set_variables(&mut self, definitions: &[(String, String)]);
    fn variable(&mut self, key: &str) -> Option<String>;
    /// True once after the frontend changed a variable.
    fn variables_updated(&mut self) -> bool;
    fn set_controller_info(&mut self, port: u32, types: &[ControllerType]);
    fn input_bitmasks_supported(&self) -> bool {
        true
    }
    fn log(&mut self, level: LogLevel, message: &str);

    // Video.

    /// `pixels` is `width * height` XRGB8888 values, already unpadded.
    fn video_refresh(&mut self, pixels: &[u32], width: u32, height: u32);

    // Audio. Samples are interleaved stereo at the core's native rate.

    fn audio_sample(&mut self, left: i16, right: i16);
    fn audio_batch(&mut self, frames: &[i16]) -> usize;

    // Input.

    fn input_poll(&mut self);
    fn input_state(&mut self, port: u32, device: InputDevice, index: u32, id: u32) -> i16;
}

/// The emulator core collaborator.
///
/// Dynamic loading of a shared object is out of scope here; a frontend links
/// or constructs a `Core` implementation and hands it to the runtime.
pub trait Core: Send {
    fn system_info(&self) -> SystemInfo;
    fn av_info(&self) -> AvInfo;

    fn load_content(&mut self, path: &Path) -> Result<(), LoadContentError>;
    fn unload_content(&mut self);

    /// Renders one frame and produces the matching audio, calling back into
    /// `host` for video, audio, input, and environment services.
    fn run_frame(&mut self, host: &mut dyn Host);

    /// Soft reset of the emulated hardware.
    fn reset(&mut self);

    /// Bytes needed by [`serialize`](Core::serialize); zero means save
    /// states are unsupported.
    fn serialize_size(&self) -> usize {
        0
    }

    fn serialize(&mut self, _dst: &mut [u8]) -> Result<usize, SerializeError> {
        Err(SerializeError::Unsupported)
    }

    fn unserialize(&mut self, _src: &[u8]) -> Result<(), SerializeError> {
        Err(SerializeError::Unsupported)
    }

    /// Debug handshake. A debug-capable core records `handler` and returns
    /// its [`DebugControl`](crate::DebugControl) interface; others return
    /// `None` and the frontend degrades to running without debug verbs.
    fn set_debugger(&mut self, _handler: Arc<dyn EventHandler>) -> Option<DebugControlRef> {
        None
    }
}

#[derive(Debug)]
pub enum LoadContentError {
    MissingContent,
    Unsupported(String),
    Message(String),
}

impl fmt::Display for LoadContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadContentError::MissingContent => write!(f, "missing content data"),
            LoadContentError::Unsupported(msg) => write!(f, "unsupported content: {msg}"),
            LoadContentError::Message(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for LoadContentError {}

#[derive(Debug)]
pub enum SerializeError {
    BufferTooSmall { required: usize },
    Unsupported,
    Message(String),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializeError::BufferTooSmall { required } => {
                write!(f, "buffer too small (requires {required} bytes)")
            }
            SerializeError::Unsupported => write!(f, "serialization is not supported"),
            SerializeError::Message(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for SerializeError {}
