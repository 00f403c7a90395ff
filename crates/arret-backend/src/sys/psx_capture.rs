//! PSX GPU event capture.
//!
//! Core-thread capture of GPU commands with rectangular VRAM diff metadata
//! and compressed VRAM snapshots. Every VRAM-modifying command stores either
//! a keyframe (full 1 MiB VRAM, every `KEYFRAME_INTERVAL` events) or an XOR
//! delta against the shadow buffer. CPU→VRAM uploads fire the hook before
//! the transfer lands, so their diff is deferred to the next event or frame
//! boundary. Frontends read finished captures under the capture lock.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use parking_lot::{Mutex, MutexGuard};

use arret_abi::psx::{GpuPost, VRAM_BYTES, VRAM_HEIGHT, VRAM_WIDTH};
use arret_abi::{
    DebugControl, Event, EventKind, Memory, MemoryRef, Subscription, SubscriptionId, System,
};

use super::psx::sign11;
use crate::memmap;

const KEYFRAME_INTERVAL: usize = 128;

/// Compresses with the frontend-compatible container: 4-byte big-endian
/// uncompressed length followed by a zlib stream.
fn compress_block(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len() / 4);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn decompress_block(src: &[u8], out: &mut [u8]) -> bool {
    if src.len() < 4 {
        return false;
    }
    let expected = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if expected != out.len() {
        return false;
    }
    let mut decoder = ZlibDecoder::new(&src[4..]);
    decoder.read_exact(out).is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEventKind {
    Command,
    FrameBoundary,
}

/// Bounding rectangle in halfword VRAM coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

pub struct CaptureEvent {
    pub kind: CaptureEventKind,
    /// 0 = GP0, 1 = GP1.
    pub port: u8,
    /// 0 = CPU, 2 = DMA channel 2.
    pub source: u8,
    pub word_count: usize,
    pub words: [u32; 16],
    pub pc: u32,
    pub is_keyframe: bool,
    /// Compressed VRAM data: a keyframe or an XOR delta. Empty for
    /// non-modifying commands and frame boundaries.
    pub diff: Vec<u8>,
    /// Affected rectangle; `None` = full-VRAM fallback.
    pub rect: Option<DiffRect>,
    /// Valid for frame boundaries.
    pub frame_number: u32,
}

impl CaptureEvent {
    fn empty(kind: CaptureEventKind) -> Self {
        Self {
            kind,
            port: 0,
            source: 0,
            word_count: 0,
            words: [0; 16],
            pc: 0,
            is_keyframe: false,
            diff: Vec::new(),
            rect: None,
            frame_number: 0,
        }
    }
}

/// GPU drawing state tracked from config commands 0xE3/0xE4/0xE5.
struct DrawState {
    off_x: i32,
    off_y: i32,
    area_x1: i32,
    area_y1: i32,
    area_x2: i32,
    area_y2: i32,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            off_x: 0,
            off_y: 0,
            area_x1: 0,
            area_y1: 0,
            area_x2: VRAM_WIDTH as i32 - 1,
            area_y2: VRAM_HEIGHT as i32 - 1,
        }
    }
}

/// Computes the VRAM rectangle a GP0 command touches. `None` means the
/// bounds cannot be determined and the caller diffs full VRAM.
fn command_rect(words: &[u32], draw: &DrawState) -> Option<DiffRect> {
    let &first = words.first()?;
    let op = (first >> 24) as u8;

    let (mut x0, mut y0, mut x1, mut y1);

    match op {
        0x02 if words.len() >= 3 => {
            // FillRect: absolute coords, x masked to 16-halfword steps and
            // width rounded up to 16 (mednafen semantics).
            let x = (words[1] & 0x3F0) as i32;
            let y = ((words[1] >> 16) & 0x3FF) as i32;
            let w = (((words[2] & 0x3FF) + 0xF) & !0xF) as i32;
            let h = ((words[2] >> 16) & 0x1FF) as i32;
            if w == 0 || h == 0 {
                return None;
            }
            x0 = x;
            y0 = y;
            x1 = x + w - 1;
            y1 = y + h - 1;
            if x1 >= VRAM_WIDTH as i32 || y1 >= VRAM_HEIGHT as i32 {
                return None;
            }
        }
        0x20..=0x3F => {
            // Polygon. The post hook fires per-triangle, so quads arrive as
            // two 3-vertex calls; use only the vertices present.
            let tex = op & 0x04 != 0;
            let shade = op & 0x10 != 0;
            let stride = 1 + usize::from(shade) + usize::from(tex);
            x0 = i32::MAX;
            y0 = i32::MAX;
            x1 = i32::MIN;
            y1 = i32::MIN;
            for v in 0..3 {
                let idx = if v == 0 { 1 } else { 1 + v * stride };
                let word = *words.get(idx)?;
                let vx = sign11(word & 0x7FF) + draw.off_x;
                let vy = sign11((word >> 16) & 0x7FF) + draw.off_y;
                x0 = x0.min(vx);
                x1 = x1.max(vx);
                y0 = y0.min(vy);
                y1 = y1.max(vy);
            }
            x0 = x0.max(draw.area_x1);
            y0 = y0.max(draw.area_y1);
            x1 = x1.min(draw.area_x2);
            y1 = y1.min(draw.area_y2);
        }
        0x40..=0x5F => {
            // Line; polylines have an unknown vertex count.
            if op & 0x08 != 0 {
                return None;
            }
            let shade = op & 0x10 != 0;
            let v1_idx = if shade { 3 } else { 2 };
            if words.len() < 2 {
                return None;
            }
            let w0 = words[1];
            let w1 = *words.get(v1_idx)?;
            let vx0 = sign11(w0 & 0x7FF) + draw.off_x;
            let vy0 = sign11((w0 >> 16) & 0x7FF) + draw.off_y;
            let vx1 = sign11(w1 & 0x7FF) + draw.off_x;
            let vy1 = sign11((w1 >> 16) & 0x7FF) + draw.off_y;
            x0 = vx0.min(vx1).max(draw.area_x1);
            y0 = vy0.min(vy1).max(draw.area_y1);
            x1 = vx0.max(vx1).min(draw.area_x2);
            y1 = vy0.max(vy1).min(draw.area_y2);
        }
        0x60..=0x7F => {
            // Rectangle.
            let tex = op & 0x04 != 0;
            let size = (op >> 3) & 0x03;
            if words.len() < 2 {
                return None;
            }
            let vx = sign11(words[1] & 0x7FF) + draw.off_x;
            let vy = sign11((words[1] >> 16) & 0x7FF) + draw.off_y;
            let (w, h) = match size {
                1 => (1, 1),
                2 => (8, 8),
                3 => (16, 16),
                _ => {
                    let idx = if tex { 3 } else { 2 };
                    let word = *words.get(idx)?;
                    ((word & 0x3FF) as i32, ((word >> 16) & 0x1FF) as i32)
                }
            };
            x0 = vx.max(draw.area_x1);
            y0 = vy.max(draw.area_y1);
            x1 = (vx + w - 1).min(draw.area_x2);
            y1 = (vy + h - 1).min(draw.area_y2);
        }
        0x80..=0x9F if words.len() >= 4 => {
            // VRAM-to-VRAM copy: the destination changes.
            let dx = (words[2] & 0x3FF) as i32;
            let dy = ((words[2] >> 16) & 0x3FF) as i32;
            let mut w = (words[3] & 0x3FF) as i32;
            let mut h = ((words[3] >> 16) & 0x1FF) as i32;
            if w == 0 {
                w = 0x400;
            }
            if h == 0 {
                h = 0x200;
            }
            x0 = dx;
            y0 = dy;
            x1 = dx + w - 1;
            y1 = dy + h - 1;
            if x1 >= VRAM_WIDTH as i32 || y1 >= VRAM_HEIGHT as i32 {
                return None;
            }
        }
        0xA0..=0xBF if words.len() >= 3 => {
            // CPU-to-VRAM upload.
            let x = (words[1] & 0x3FF) as i32;
            let y = ((words[1] >> 16) & 0x3FF) as i32;
            let mut w = (words[2] & 0x3FF) as i32;
            let mut h = ((words[2] >> 16) & 0x1FF) as i32;
            if w == 0 {
                w = 0x400;
            }
            if h == 0 {
                h = 0x200;
            }
            x0 = x;
            y0 = y;
            x1 = x + w - 1;
            y1 = y + h - 1;
            if x1 >= VRAM_WIDTH as i32 || y1 >= VRAM_HEIGHT as i32 {
                return None;
            }
        }
        _ => return None,
    }

    // 1-halfword margin, clamped to VRAM.
    x0 = (x0 - 1).max(0);
    y0 = (y0 - 1).max(0);
    x1 = (x1 + 1).min(VRAM_WIDTH as i32 - 1);
    y1 = (y1 + 1).min(VRAM_HEIGHT as i32 - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }

    Some(DiffRect {
        x: x0 as u16,
        y: y0 as u16,
        w: (x1 - x0 + 1) as u16,
        h: (y1 - y0 + 1) as u16,
    })
}

pub struct CaptureInner {
    events: Vec<CaptureEvent>,
    /// 1 MiB VRAM shadow, state as of the last stored diff.
    shadow: Vec<u8>,
    vram: Option<MemoryRef>,
    frame_counter: u32,
    compressed_bytes: usize,
    /// Index of a CPU→VRAM event whose diff is still pending.
    deferred: Option<usize>,
    draw: DrawState,
}

pub struct GpuCapture {
    inner: Mutex<CaptureInner>,
    active: AtomicBool,
    sub: Mutex<Option<SubscriptionId>>,
}

impl GpuCapture {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CaptureInner {
                events: Vec::new(),
                shadow: Vec::new(),
                vram: None,
                frame_counter: 0,
                compressed_bytes: 0,
                deferred: None,
                draw: DrawState::default(),
            }),
            active: AtomicBool::new(false),
            sub: Mutex::new(None),
        }
    }

    /// Subscribes to the system's "GP0" misc breakpoint and starts
    /// recording. Fails when the system exposes no GP0 hook or no "vram"
    /// region.
    pub fn start(&self, control: &dyn DebugControl, system: &dyn System) -> bool {
        if self.active.load(Ordering::Acquire) {
            return false;
        }

        let Some(gp0) = system
            .misc_breakpoints()
            .iter()
            .find(|bp| bp.description == "GP0")
            .cloned()
        else {
            return false;
        };
        let Some(vram) = memmap::find_memory_by_id(system, "vram") else {
            return false;
        };

        let sub_id = control.subscribe(&Subscription::Misc { breakpoint: gp0 });
        if sub_id < 0 {
            return false;
        }

        {
            let mut inner = self.inner.lock();
            inner.events.clear();
            inner.compressed_bytes = 0;
            inner.frame_counter = 1;
            inner.deferred = None;
            inner.draw = DrawState::default();

            // Initial keyframe so every reconstruction has an anchor.
            inner.shadow = vec![0u8; VRAM_BYTES];
            vram.peek_range(0, &mut inner.shadow);
            let mut event = CaptureEvent::empty(CaptureEventKind::Command);
            event.is_keyframe = true;
            event.diff = compress_block(&inner.shadow);
            inner.compressed_bytes += event.diff.len();
            inner.events.push(event);
            inner.vram = Some(vram);
        }

        *self.sub.lock() = Some(sub_id);
        self.active.store(true, Ordering::Release);
        true
    }

    pub fn stop(&self, control: &dyn DebugControl) {
        self.active.store(false, Ordering::Release);
        if let Some(sub_id) = self.sub.lock().take() {
            control.unsubscribe(sub_id);
        }
        let mut inner = self.inner.lock();
        inner.shadow = Vec::new();
        inner.vram = None;
    }

    pub fn active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn owns(&self, sub_id: SubscriptionId) -> bool {
        self.active() && *self.sub.lock() == Some(sub_id)
    }

    /// Captured events, for reading under the capture lock.
    pub fn events(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn compressed_bytes(&self) -> usize {
        self.inner.lock().compressed_bytes
    }

    /// Records one GP0 misc event. Runs on the core thread; never halts.
    pub fn on_event(&self, event: &Event) {
        if !self.active() {
            return;
        }
        let EventKind::Misc { data, .. } = &event.kind else {
            return;
        };
        let Some(post) = data.as_ref().and_then(|d| GpuPost::from_bytes(d)) else {
            return;
        };

        let words = post.words();
        let mut inner = self.inner.lock();

        // Track drawing state from config commands.
        if post.port == 0
            && let Some(&first) = words.first()
        {
            match (first >> 24) as u8 {
                0xE3 => {
                    inner.draw.area_x1 = (first & 0x3FF) as i32;
                    inner.draw.area_y1 = ((first >> 10) & 0x1FF) as i32;
                }
                0xE4 => {
                    inner.draw.area_x2 = (first & 0x3FF) as i32;
                    inner.draw.area_y2 = ((first >> 10) & 0x1FF) as i32;
                }
                0xE5 => {
                    inner.draw.off_x = sign11(first & 0x7FF);
                    inner.draw.off_y = sign11((first >> 11) & 0x7FF);
                }
                _ => {}
            }
        }

        // A pending CPU→VRAM diff is complete by the time the next command
        // arrives.
        complete_deferred(&mut inner);

        let mut record = CaptureEvent::empty(CaptureEventKind::Command);
        record.port = post.port;
        record.source = post.source;
        record.pc = post.pc;
        record.word_count = words.len();
        record.words[..words.len()].copy_from_slice(words);

        let (modifies_vram, is_cpu_to_vram) = match (post.port, words.first()) {
            (0, Some(&first)) => {
                let op = (first >> 24) as u8;
                (
                    op == 0x02 || (0x20..=0xBF).contains(&op),
                    (0xA0..=0xBF).contains(&op),
                )
            }
            _ => (false, false),
        };

        if modifies_vram && inner.vram.is_some() {
            record.rect = command_rect(words, &inner.draw);

            let index = inner.events.len();
            if is_cpu_to_vram {
                // The destination has not been written yet at hook time;
                // diff on the next event or frame boundary.
                inner.events.push(record);
                inner.deferred = Some(index);
                return;
            }

            store_diff(&mut inner, &mut record, index);
        }

        inner.events.push(record);
    }

    /// Inserts a frame boundary; called on VSync.
    pub fn frame_boundary(&self) {
        if !self.active() {
            return;
        }
        let mut inner = self.inner.lock();
        complete_deferred(&mut inner);

        let mut event = CaptureEvent::empty(CaptureEventKind::FrameBoundary);
        event.frame_number = inner.frame_counter;
        inner.frame_counter += 1;
        inner.events.push(event);
    }

    /// Reconstructs the full VRAM contents as of event `index` into `out`
    /// (1 MiB). Walks back to the nearest keyframe and XORs deltas forward.
    pub fn reconstruct(&self, index: usize, out: &mut [u8]) -> bool {
        if out.len() != VRAM_BYTES {
            return false;
        }
        let inner = self.inner.lock();
        if index >= inner.events.len() {
            return false;
        }

        // Nearest event at or before `index` with VRAM data.
        let mut target = index;
        while target > 0 && inner.events[target].diff.is_empty() {
            target -= 1;
        }
        if inner.events[target].diff.is_empty() {
            return false;
        }

        // Nearest keyframe at or before `target`.
        let mut keyframe = target;
        while keyframe > 0 && !inner.events[keyframe].is_keyframe {
            keyframe -= 1;
        }
        if !inner.events[keyframe].is_keyframe {
            return false;
        }

        if !decompress_block(&inner.events[keyframe].diff, out) {
            return false;
        }

        let mut delta = vec![0u8; VRAM_BYTES];
        for event in &inner.events[keyframe + 1..=target] {
            if event.diff.is_empty() || event.is_keyframe {
                continue;
            }
            if !decompress_block(&event.diff, &mut delta) {
                continue;
            }
            for (dst, src) in out.iter_mut().zip(&delta) {
                *dst ^= src;
            }
        }
        true
    }
}

impl Default for GpuCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads current VRAM and stores `record`'s diff: a keyframe on the
/// interval, an XOR delta against the shadow otherwise. Updates the shadow.
fn store_diff(inner: &mut CaptureInner, record: &mut CaptureEvent, index: usize) {
    let Some(vram) = inner.vram.clone() else {
        return;
    };
    let mut current = vec![0u8; VRAM_BYTES];
    vram.peek_range(0, &mut current);

    if index % KEYFRAME_INTERVAL == 0 {
        record.is_keyframe = true;
        record.diff = compress_block(&current);
    } else {
        let delta: Vec<u8> = current
            .iter()
            .zip(&inner.shadow)
            .map(|(cur, prev)| cur ^ prev)
            .collect();
        record.is_keyframe = false;
        record.diff = compress_block(&delta);
    }
    inner.compressed_bytes += record.diff.len();
    inner.shadow = current;
}

fn complete_deferred(inner: &mut CaptureInner) {
    let Some(index) = inner.deferred.take() else {
        return;
    };
    let mut record = std::mem::replace(
        &mut inner.events[index],
        CaptureEvent::empty(CaptureEventKind::Command),
    );
    store_diff(inner, &mut record, index);
    inner.events[index] = record;
}

impl CaptureInner {
    pub fn events(&self) -> &[CaptureEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MappedRegion, StaticSystem};
    use arret_abi::{DebugControlRef, MiscBreakpoint, SystemRef};
    use std::sync::Arc;
    use std::sync::atomic::AtomicI64;

    struct FakeControl {
        system: SystemRef,
        next: AtomicI64,
    }

    impl DebugControl for FakeControl {
        fn system(&self) -> SystemRef {
            self.system.clone()
        }
        fn subscribe(&self, _subscription: &Subscription) -> SubscriptionId {
            self.next.fetch_add(1, Ordering::Relaxed)
        }
        fn unsubscribe(&self, _id: SubscriptionId) {}
    }

    fn fixture() -> (Arc<MappedRegion>, SystemRef, DebugControlRef) {
        let vram = MappedRegion::new("vram", 0, VRAM_BYTES as u64);
        let system: SystemRef = Arc::new(StaticSystem::new(
            "psx",
            Vec::new(),
            vec![vram.clone() as MemoryRef],
            vec![MiscBreakpoint::new("GP0"), MiscBreakpoint::new("GP1")],
        ));
        let control: DebugControlRef = Arc::new(FakeControl {
            system: system.clone(),
            next: AtomicI64::new(1),
        });
        (vram, system, control)
    }

    fn gp0_event(system: &SystemRef, words: &[u32], source: u8) -> Event {
        let bp = system.misc_breakpoints()[0].clone();
        let mut post = GpuPost {
            port: 0,
            source,
            word_count: words.len() as u16,
            pc: 0x8001_0000,
            words: [0; 16],
        };
        post.words[..words.len()].copy_from_slice(words);
        Event::new(
            EventKind::Misc {
                breakpoint: bp,
                args: [0; 4],
                data: Some(Arc::from(post.to_bytes().into_boxed_slice())),
            },
            true,
        )
    }

    #[test]
    fn compress_round_trips() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let packed = compress_block(&data);
        assert!(packed.len() < data.len());
        let mut out = vec![0u8; data.len()];
        assert!(decompress_block(&packed, &mut out));
        assert_eq!(out, data);
        // Wrong output size is rejected.
        let mut short = vec![0u8; data.len() - 1];
        assert!(!decompress_block(&packed, &mut short));
    }

    #[test]
    fn fill_rect_bounds() {
        let draw = DrawState::default();
        // FillRect at (32,16), 64x8, plus the 1-halfword margin.
        let rect = command_rect(&[0x0200_0000, 0x0010_0020, 0x0008_0040], &draw).unwrap();
        assert_eq!(rect, DiffRect { x: 31, y: 15, w: 66, h: 10 });
    }

    #[test]
    fn polygon_bounds_clip_to_draw_area() {
        let mut draw = DrawState::default();
        draw.area_x1 = 0;
        draw.area_y1 = 0;
        draw.area_x2 = 100;
        draw.area_y2 = 100;
        // Flat triangle with a vertex far outside the drawing area.
        let words = [
            0x2000_0000,
            0x0000_0000,             // v0 (0,0)
            0x0000_0150,             // v1 (336,0)
            (200u32 << 16) | 0x0010, // v2 (16,200)
        ];
        let rect = command_rect(&words, &draw).unwrap();
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        // Clipped at 100 plus the margin.
        assert_eq!(rect.x + rect.w - 1, 101);
        assert_eq!(rect.y + rect.h - 1, 101);
    }

    #[test]
    fn polyline_falls_back_to_full_vram() {
        let draw = DrawState::default();
        assert!(command_rect(&[0x4800_0000, 0, 0], &draw).is_none());
    }

    #[test]
    fn capture_records_and_reconstructs() {
        let (vram, system, control) = fixture();
        let capture = GpuCapture::new();
        assert!(capture.start(control.as_ref(), system.as_ref()));
        // Initial keyframe.
        assert_eq!(capture.event_count(), 1);

        // Draw something into VRAM, then feed the matching FillRect event.
        vram.fill(0, &[0xAA; 64]);
        capture.on_event(&gp0_event(
            &system,
            &[0x0200_0000, 0x0000_0000, 0x0001_0010],
            0,
        ));
        assert_eq!(capture.event_count(), 2);

        let mut out = vec![0u8; VRAM_BYTES];
        assert!(capture.reconstruct(1, &mut out));
        assert_eq!(&out[..64], &[0xAA; 64]);

        // Reconstructing the initial keyframe shows pristine VRAM.
        assert!(capture.reconstruct(0, &mut out));
        assert_eq!(&out[..64], &[0u8; 64]);

        capture.stop(control.as_ref());
        assert!(!capture.active());
    }

    #[test]
    fn cpu_to_vram_diff_is_deferred() {
        let (vram, system, control) = fixture();
        let capture = GpuCapture::new();
        assert!(capture.start(control.as_ref(), system.as_ref()));

        // CPU>VRAM upload event arrives before the data lands.
        capture.on_event(&gp0_event(
            &system,
            &[0xA000_0000, 0x0000_0000, 0x0001_0010],
            0,
        ));
        {
            let inner = capture.events();
            assert!(inner.events()[1].diff.is_empty());
        }

        // Now the transfer completes, then the frame boundary flushes it.
        vram.fill(0, &[0x55; 32]);
        capture.frame_boundary();
        {
            let inner = capture.events();
            assert!(!inner.events()[1].diff.is_empty());
            assert_eq!(inner.events()[2].kind, CaptureEventKind::FrameBoundary);
            assert_eq!(inner.events()[2].frame_number, 1);
        }

        let mut out = vec![0u8; VRAM_BYTES];
        assert!(capture.reconstruct(1, &mut out));
        assert_eq!(&out[..32], &[0x55; 32]);
    }

    #[test]
    fn draw_offset_shifts_rectangles() {
        let (_vram, system, control) = fixture();
        let capture = GpuCapture::new();
        assert!(capture.start(control.as_ref(), system.as_ref()));

        // Set draw offset (64, 32), then draw a 1x1 rect at (0,0).
        let offset = (32u32 << 11) | 64;
        capture.on_event(&gp0_event(&system, &[0xE500_0000 | offset], 0));
        capture.on_event(&gp0_event(&system, &[0x6800_0000, 0x0000_0000], 0));

        let inner = capture.events();
        let rect = inner.events().last().unwrap().rect.unwrap();
        assert_eq!((rect.x, rect.y), (63, 31));
        assert_eq!((rect.w, rect.h), (3, 3));
    }

    #[test]
    fn start_requires_gp0_and_vram() {
        let system: SystemRef = Arc::new(StaticSystem::new(
            "psx",
            Vec::new(),
            Vec::new(),
            vec![MiscBreakpoint::new("GP1")],
        ));
        let control = FakeControl {
            system: system.clone(),
            next: AtomicI64::new(1),
        };
        let capture = GpuCapture::new();
        assert!(!capture.start(&control, system.as_ref()));
    }
}
