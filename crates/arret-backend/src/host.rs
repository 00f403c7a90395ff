//! Host side of the emulator ABI: environment queries, the private frame
//! buffer, the downsampled audio ring, and the input fix layer.
//!
//! The audio path is single-producer (core thread, via its host callback) /
//! single-consumer (frontend audio thread) over a lock-free ring; samples
//! are decimated from the core's native rate down to 48 kHz and dropped on
//! overflow rather than overwritten.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

use arret_abi::{ControllerType, Host, InputDevice, LogLevel, PixelFormat, joypad};

pub const MAX_WIDTH: usize = 256;
pub const MAX_HEIGHT: usize = 224;

pub const CORE_AUDIO_RATE: u32 = 384_000;
pub const OUTPUT_AUDIO_RATE: u32 = 48_000;
const DOWNSAMPLE_RATIO: u32 = CORE_AUDIO_RATE / OUTPUT_AUDIO_RATE;
/// ~1 second of stereo output.
const AUDIO_RING_SAMPLES: usize = (OUTPUT_AUDIO_RATE as usize) * 2;

pub(crate) struct VideoState {
    pub frame: Vec<u32>,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
pub(crate) struct InputState {
    pub buttons: [i16; 16],
    pub fixed: [Option<i16>; 16],
    /// [lx, ly, rx, ry]
    pub analog: [i16; 4],
    pub analog_fixed: [Option<i16>; 4],
    pub manual: bool,
}

#[derive(Default)]
pub(crate) struct EnvState {
    pub system_dir: PathBuf,
    pub save_dir: PathBuf,
    /// (key, current value, raw description).
    pub variables: Vec<(String, String, String)>,
    pub variables_updated: bool,
    pub controller_types: Vec<ControllerType>,
}

/// Shared host-callback state. Sub-states carry their own locks so nothing
/// is held across a whole frame; the UI thread can read the frame buffer
/// while the core thread sits blocked inside an event handler.
pub struct HostShared {
    pub(crate) video: Mutex<VideoState>,
    pub(crate) input: Mutex<InputState>,
    pub(crate) env: Mutex<EnvState>,
    audio_producer: Mutex<HeapProd<i16>>,
    downsample_count: AtomicU32,
    mute: AtomicBool,
}

impl HostShared {
    pub(crate) fn new(mute: bool, system_dir: PathBuf) -> (Arc<Self>, AudioReader) {
        let ring = HeapRb::<i16>::new(AUDIO_RING_SAMPLES);
        let (producer, consumer) = ring.split();

        let shared = Arc::new(Self {
            video: Mutex::new(VideoState {
                frame: vec![0; MAX_WIDTH * MAX_HEIGHT],
                width: 160,
                height: 144,
            }),
            input: Mutex::new(InputState::default()),
            env: Mutex::new(EnvState {
                system_dir,
                save_dir: PathBuf::from("."),
                ..EnvState::default()
            }),
            audio_producer: Mutex::new(producer),
            downsample_count: AtomicU32::new(0),
            mute: AtomicBool::new(mute),
        });
        (shared, AudioReader { consumer })
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Relaxed);
    }

    pub fn muted(&self) -> bool {
        self.mute.load(Ordering::Relaxed)
    }

    fn push_sample(&self, left: i16, right: i16) {
        if self.muted() {
            return;
        }
        let count = self.downsample_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count < DOWNSAMPLE_RATIO {
            return;
        }
        self.downsample_count.store(0, Ordering::Relaxed);

        let mut producer = self.audio_producer.lock();
        // Drop the whole frame when the ring is full; half-pushed frames
        // would tear the stereo interleave.
        if producer.vacant_len() >= 2 {
            let _ = producer.try_push(left);
            let _ = producer.try_push(right);
        }
    }
}

/// Consumer handle for the downsampled audio stream.
///
/// The frontend's audio callback reads `min(max_frames, available)` frames
/// per call and zero-fills the rest of its buffer.
pub struct AudioReader {
    consumer: HeapCons<i16>,
}

impl AudioReader {
    /// Reads up to `max_frames` stereo frames (2 × i16 each) into `out`.
    /// Returns the number of frames read.
    pub fn read(&mut self, out: &mut [i16], max_frames: usize) -> usize {
        let max_frames = max_frames.min(out.len() / 2);
        let mut frames = 0;
        while frames < max_frames {
            let Some(left) = self.consumer.try_pop() else {
                break;
            };
            let right = self.consumer.try_pop().unwrap_or(0);
            out[frames * 2] = left;
            out[frames * 2 + 1] = right;
            frames += 1;
        }
        frames
    }
}

/// Per-frame [`Host`] facade handed to the core; locks each sub-state only
/// for the duration of the call.
pub(crate) struct HostFacade<'a> {
    pub shared: &'a HostShared,
}

impl Host for HostFacade<'_> {
    fn set_pixel_format(&mut self, format: PixelFormat) -> bool {
        format == PixelFormat::Xrgb8888
    }

    fn system_directory(&self) -> PathBuf {
        self.shared.env.lock().system_dir.clone()
    }

    fn save_directory(&self) -> PathBuf {
        self.shared.env.lock().save_dir.clone()
    }

    fn set_geometry(&mut self, width: u32, height: u32) {
        let mut video = self.shared.video.lock();
        video.width = width.min(MAX_WIDTH as u32);
        video.height = height.min(MAX_HEIGHT as u32);
    }

    fn set_variables(&mut self, definitions: &[(String, String)]) {
        let mut env = self.shared.env.lock();
        env.variables.clear();
        for (key, description) in definitions {
            // "Description; value1|value2": the first listed value is the
            // default.
            let value = description
                .split_once(';')
                .map(|(_, values)| values.trim_start())
                .map(|values| values.split('|').next().unwrap_or("").to_string())
                .unwrap_or_default();
            env.variables
                .push((key.clone(), value, description.clone()));
        }
    }

    fn variable(&mut self, key: &str) -> Option<String> {
        self.shared
            .env
            .lock()
            .variables
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, value, _)| value.clone())
    }

    fn variables_updated(&mut self) -> bool {
        let mut env = self.shared.env.lock();
        std::mem::take(&mut env.variables_updated)
    }

    fn set_controller_info(&mut self, port: u32, types: &[ControllerType]) {
        if port == 0 {
            self.shared.env.lock().controller_types = types.to_vec();
        }
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "core", "{message}"),
            LogLevel::Info => tracing::info!(target: "core", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "core", "{message}"),
            LogLevel::Error => tracing::error!(target: "core", "{message}"),
        }
    }

    fn video_refresh(&mut self, pixels: &[u32], width: u32, height: u32) {
        let mut video = self.shared.video.lock();
        let capped_w = (width as usize).min(MAX_WIDTH);
        let capped_h = (height as usize).min(MAX_HEIGHT);
        video.width = capped_w as u32;
        video.height = capped_h as u32;
        for y in 0..capped_h {
            let src = &pixels[y * width as usize..y * width as usize + capped_w];
            video.frame[y * capped_w..(y + 1) * capped_w].copy_from_slice(src);
        }
    }

    fn audio_sample(&mut self, left: i16, right: i16) {
        self.shared.push_sample(left, right);
    }

    fn audio_batch(&mut self, frames: &[i16]) -> usize {
        for frame in frames.chunks_exact(2) {
            self.shared.push_sample(frame[0], frame[1]);
        }
        frames.len() / 2
    }

    fn input_poll(&mut self) {}

    fn input_state(&mut self, port: u32, device: InputDevice, index: u32, id: u32) -> i16 {
        if port != 0 {
            return 0;
        }
        let input = self.shared.input.lock();
        match device {
            InputDevice::Joypad => {
                if id == joypad::MASK {
                    let mut mask = 0i16;
                    for bit in 0..16 {
                        let value = input.fixed[bit].unwrap_or(input.buttons[bit]);
                        if value != 0 {
                            mask |= 1 << bit;
                        }
                    }
                    mask
                } else if (id as usize) < 16 {
                    input.fixed[id as usize].unwrap_or(input.buttons[id as usize])
                } else {
                    0
                }
            }
            InputDevice::Analog => {
                if index <= 1 && id <= 1 {
                    let axis = (index * 2 + id) as usize;
                    input.analog_fixed[axis].unwrap_or(input.analog[axis])
                } else {
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_downsamples_by_ratio() {
        let (shared, mut reader) = HostShared::new(false, PathBuf::from("."));
        let mut facade = HostFacade {
            shared: shared.as_ref(),
        };

        // 16 input frames at the core rate decimate to 2 output frames.
        let frames: Vec<i16> = (0..16i16).flat_map(|i| [i, -i]).collect();
        assert_eq!(facade.audio_batch(&frames), 16);

        let mut out = [0i16; 8];
        let read = reader.read(&mut out, 4);
        assert_eq!(read, 2);
        // Every 8th sample survives.
        assert_eq!(&out[..4], &[7, -7, 15, -15]);
    }

    #[test]
    fn audio_mute_drops_at_input() {
        let (shared, mut reader) = HostShared::new(true, PathBuf::from("."));
        let mut facade = HostFacade {
            shared: shared.as_ref(),
        };
        let frames: Vec<i16> = vec![1; 64];
        facade.audio_batch(&frames);
        let mut out = [0i16; 8];
        assert_eq!(reader.read(&mut out, 4), 0);
    }

    #[test]
    fn audio_ring_drops_on_full() {
        let (shared, mut reader) = HostShared::new(false, PathBuf::from("."));
        let mut facade = HostFacade {
            shared: shared.as_ref(),
        };

        // Push far more than the ring holds.
        let chunk: Vec<i16> = vec![3; 2 * 1024];
        for _ in 0..1000 {
            facade.audio_batch(&chunk);
        }

        // The ring holds at most a second of output audio.
        let mut out = vec![0i16; AUDIO_RING_SAMPLES + 16];
        let frames = reader.read(&mut out, AUDIO_RING_SAMPLES);
        assert!(frames <= AUDIO_RING_SAMPLES / 2);
        assert!(frames > 0);
    }

    #[test]
    fn input_fix_overrides_state() {
        let (shared, _reader) = HostShared::new(false, PathBuf::from("."));
        let mut facade = HostFacade {
            shared: shared.as_ref(),
        };

        shared.input.lock().buttons[joypad::A as usize] = 1;
        assert_eq!(
            facade.input_state(0, InputDevice::Joypad, 0, joypad::A),
            1
        );

        shared.input.lock().fixed[joypad::A as usize] = Some(0);
        assert_eq!(
            facade.input_state(0, InputDevice::Joypad, 0, joypad::A),
            0
        );

        shared.input.lock().fixed[joypad::B as usize] = Some(1);
        let mask = facade.input_state(0, InputDevice::Joypad, 0, joypad::MASK);
        assert_eq!(mask, 1 << joypad::B);
    }

    #[test]
    fn video_refresh_caps_dimensions() {
        let (shared, _reader) = HostShared::new(false, PathBuf::from("."));
        let mut facade = HostFacade {
            shared: shared.as_ref(),
        };
        let pixels = vec![0xFFFF_FFFFu32; 512 * 512];
        facade.video_refresh(&pixels, 512, 512);
        let video = shared.video.lock();
        assert_eq!(video.width, MAX_WIDTH as u32);
        assert_eq!(video.height, MAX_HEIGHT as u32);
    }

    #[test]
    fn variables_parse_default_value() {
        let (shared, _reader) = HostShared::new(false, PathBuf::from("."));
        let mut facade = HostFacade {
            shared: shared.as_ref(),
        };
        facade.set_variables(&[(
            "demo_region".to_string(),
            "Region; NTSC|PAL".to_string(),
        )]);
        assert_eq!(facade.variable("demo_region"), Some("NTSC".to_string()));
        assert_eq!(facade.variable("missing"), None);
    }
}
