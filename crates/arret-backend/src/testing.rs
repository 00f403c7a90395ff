//! Scripted core and system doubles.
//!
//! [`DemoCore`] is a tiny LR35902-flavoured machine with a real debug-ABI
//! implementation: subscriptions, execution and memory events, the
//! `can_halt` protocol, and save states. It backs the crate's tests and the
//! CLI's demonstration mode, where no real emulator core is linked in.
//! [`MappedRegion`] and [`StaticSystem`] are building blocks for tests that
//! need bespoke topologies (memory-map graphs, misc breakpoints).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;

use arret_abi::{
    AvInfo, Core, Cpu, CpuRef, CpuType, DebugControl, DebugControlRef, Event, EventHandler,
    EventKind, GameGeometry, Host, InputDevice, LoadContentError, Memory, MemoryMapEntry,
    MemoryOp, MemoryRef, MiscBreakpoint, PixelFormat, SerializeError, StepKind, Subscription,
    SubscriptionId, System, SystemInfo, SystemRef, SystemTiming, joypad, lr35902,
};

type BankHook = Box<dyn Fn(u64, i64) -> Option<MemoryMapEntry> + Send + Sync>;

/// Byte-array memory region with an optional memory map and bank hook.
pub struct MappedRegion {
    id: String,
    description: String,
    base: u64,
    bytes: Mutex<Vec<u8>>,
    map: Mutex<Option<Vec<MemoryMapEntry>>>,
    bank_hook: Mutex<Option<BankHook>>,
}

impl MappedRegion {
    pub fn new(id: impl Into<String>, base: u64, size: u64) -> Arc<Self> {
        let id = id.into();
        Arc::new(Self {
            description: format!("{id} region"),
            id,
            base,
            bytes: Mutex::new(vec![0; size as usize]),
            map: Mutex::new(None),
            bank_hook: Mutex::new(None),
        })
    }

    pub fn set_map(&self, entries: Vec<MemoryMapEntry>) {
        *self.map.lock() = Some(entries);
    }

    pub fn set_bank_hook(
        &self,
        hook: impl Fn(u64, i64) -> Option<MemoryMapEntry> + Send + Sync + 'static,
    ) {
        *self.bank_hook.lock() = Some(Box::new(hook));
    }

    pub fn fill(&self, addr: u64, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        let off = addr.wrapping_sub(self.base) as usize;
        for (i, b) in data.iter().enumerate() {
            if let Some(slot) = bytes.get_mut(off + i) {
                *slot = *b;
            }
        }
    }
}

impl Memory for MappedRegion {
    fn id(&self) -> &str {
        &self.id
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn base_address(&self) -> u64 {
        self.base
    }
    fn size(&self) -> u64 {
        self.bytes.lock().len() as u64
    }
    fn peek(&self, address: u64, _side_effects: bool) -> u8 {
        let off = address.wrapping_sub(self.base) as usize;
        self.bytes.lock().get(off).copied().unwrap_or(0)
    }
    fn poke(&self, address: u64, value: u8) -> bool {
        let off = address.wrapping_sub(self.base) as usize;
        let mut bytes = self.bytes.lock();
        match bytes.get_mut(off) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
    fn memory_map(&self) -> Option<Vec<MemoryMapEntry>> {
        self.map.lock().clone()
    }
    fn bank_address(&self, address: u64, bank: i64) -> Option<MemoryMapEntry> {
        self.bank_hook.lock().as_ref().and_then(|h| h(address, bank))
    }
}

/// Fixed system topology for tests.
pub struct StaticSystem {
    description: String,
    cpus: Vec<CpuRef>,
    regions: Vec<MemoryRef>,
    miscs: Vec<Arc<MiscBreakpoint>>,
}

impl StaticSystem {
    pub fn new(
        description: impl Into<String>,
        cpus: Vec<CpuRef>,
        regions: Vec<MemoryRef>,
        miscs: Vec<Arc<MiscBreakpoint>>,
    ) -> Self {
        Self {
            description: description.into(),
            cpus,
            regions,
            miscs,
        }
    }

    pub fn with_regions(regions: Vec<Arc<MappedRegion>>) -> Self {
        Self::new(
            "test",
            Vec::new(),
            regions.into_iter().map(|r| r as MemoryRef).collect(),
            Vec::new(),
        )
    }
}

impl System for StaticSystem {
    fn description(&self) -> &str {
        &self.description
    }
    fn cpus(&self) -> &[CpuRef] {
        &self.cpus
    }
    fn memory_regions(&self) -> &[MemoryRef] {
        &self.regions
    }
    fn misc_breakpoints(&self) -> &[Arc<MiscBreakpoint>] {
        &self.miscs
    }
}

// ---------------------------------------------------------------------------
// Demo machine
// ---------------------------------------------------------------------------

const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 144;
const INSTRUCTIONS_PER_FRAME: usize = 256;
const PROGRAM_BASE: u64 = 0x0100;

#[derive(Clone, Copy, Default)]
struct RegFile {
    a: u8,
    f: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,
    sp: u16,
    pc: u16,
    ime: bool,
}

struct DemoCpu {
    regs: Mutex<RegFile>,
    mem: MemoryRef,
}

impl Cpu for DemoCpu {
    fn id(&self) -> &str {
        "sm83"
    }
    fn description(&self) -> &str {
        "Sharp SM83"
    }
    fn cpu_type(&self) -> CpuType {
        CpuType::LR35902
    }
    fn is_main(&self) -> bool {
        true
    }
    fn memory(&self) -> Option<MemoryRef> {
        Some(self.mem.clone())
    }
    fn get_register(&self, reg: u32) -> u64 {
        let r = self.regs.lock();
        match reg {
            lr35902::A => u64::from(r.a),
            lr35902::F => u64::from(r.f),
            lr35902::B => u64::from(r.b),
            lr35902::C => u64::from(r.c),
            lr35902::D => u64::from(r.d),
            lr35902::E => u64::from(r.e),
            lr35902::H => u64::from(r.h),
            lr35902::L => u64::from(r.l),
            lr35902::SP => u64::from(r.sp),
            lr35902::PC => u64::from(r.pc),
            lr35902::AF => u64::from(u16::from(r.a) << 8 | u16::from(r.f)),
            lr35902::BC => u64::from(u16::from(r.b) << 8 | u16::from(r.c)),
            lr35902::DE => u64::from(u16::from(r.d) << 8 | u16::from(r.e)),
            lr35902::HL => u64::from(u16::from(r.h) << 8 | u16::from(r.l)),
            lr35902::IME => u64::from(r.ime),
            _ => 0,
        }
    }
    fn set_register(&self, reg: u32, value: u64) -> bool {
        let mut r = self.regs.lock();
        match reg {
            lr35902::A => r.a = value as u8,
            lr35902::F => r.f = value as u8 & 0xF0,
            lr35902::B => r.b = value as u8,
            lr35902::C => r.c = value as u8,
            lr35902::D => r.d = value as u8,
            lr35902::E => r.e = value as u8,
            lr35902::H => r.h = value as u8,
            lr35902::L => r.l = value as u8,
            lr35902::SP => r.sp = value as u16,
            lr35902::PC => r.pc = value as u16,
            lr35902::AF => {
                r.a = (value >> 8) as u8;
                r.f = value as u8 & 0xF0;
            }
            lr35902::BC => {
                r.b = (value >> 8) as u8;
                r.c = value as u8;
            }
            lr35902::DE => {
                r.d = (value >> 8) as u8;
                r.e = value as u8;
            }
            lr35902::HL => {
                r.h = (value >> 8) as u8;
                r.l = value as u8;
            }
            lr35902::IME => r.ime = value != 0,
            _ => return false,
        }
        true
    }
}

struct SubRecord {
    subscription: Subscription,
    base_depth: i64,
}

struct DemoState {
    mem: Arc<MappedRegion>,
    cpu: Arc<DemoCpu>,
    subs: Mutex<HashMap<SubscriptionId, SubRecord>>,
    next_sub: AtomicI64,
    handler: Mutex<Option<Arc<dyn EventHandler>>>,
    /// Whether events are reported with `can_halt = true`.
    can_halt: AtomicBool,
    call_depth: AtomicI64,
    /// PC whose execution events were already delivered before a clean
    /// halt; they are not re-delivered on the next frame.
    resume_skip: Mutex<Option<u64>>,
}

struct DemoControl {
    state: Arc<DemoState>,
    system: SystemRef,
}

impl DebugControl for DemoControl {
    fn system(&self) -> SystemRef {
        self.system.clone()
    }

    fn subscribe(&self, subscription: &Subscription) -> SubscriptionId {
        // Intermediate execution ranges are rejected, like hardware-assisted
        // cores that only have broad and single-address matches.
        if let Subscription::Execution { range, .. } = subscription
            && !range.is_broad()
            && !range.is_point()
        {
            return -1;
        }
        if matches!(subscription, Subscription::Io { .. } | Subscription::Register { .. }) {
            return -1;
        }
        let id = self.state.next_sub.fetch_add(1, Ordering::Relaxed);
        self.state.subs.lock().insert(
            id,
            SubRecord {
                subscription: subscription.clone(),
                base_depth: self.state.call_depth.load(Ordering::Relaxed),
            },
        );
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.state.subs.lock().remove(&id);
    }
}

/// Scripted LR35902-flavoured core.
pub struct DemoCore {
    state: Arc<DemoState>,
    system: SystemRef,
    loaded: bool,
    env_init: bool,
    frame: Vec<u32>,
    frame_counter: u64,
    halted: bool,
}

impl DemoCore {
    pub fn new() -> Self {
        let mem = MappedRegion::new("mem", 0, 0x1_0000);
        let cpu = Arc::new(DemoCpu {
            regs: Mutex::new(RegFile {
                sp: 0xFFFE,
                pc: PROGRAM_BASE as u16,
                ..RegFile::default()
            }),
            mem: mem.clone(),
        });
        let state = Arc::new(DemoState {
            mem: mem.clone(),
            cpu: cpu.clone(),
            subs: Mutex::new(HashMap::new()),
            next_sub: AtomicI64::new(1),
            handler: Mutex::new(None),
            can_halt: AtomicBool::new(true),
            call_depth: AtomicI64::new(0),
            resume_skip: Mutex::new(None),
        });
        let system: SystemRef = Arc::new(StaticSystem::new(
            "gb",
            vec![cpu as CpuRef],
            Vec::new(),
            Vec::new(),
        ));
        let mut core = Self {
            state,
            system,
            loaded: false,
            env_init: false,
            frame: vec![0xFF20_2020; (FRAME_WIDTH * FRAME_HEIGHT) as usize],
            frame_counter: 0,
            halted: false,
        };
        core.install_program(&DEFAULT_PROGRAM);
        core
    }

    /// Loads `program` at 0x0100 and points PC at it.
    pub fn with_program(program: &[u8]) -> Self {
        let mut core = Self::new();
        core.install_program(program);
        core.loaded = true;
        core
    }

    fn install_program(&mut self, program: &[u8]) {
        self.state.mem.fill(PROGRAM_BASE, program);
        self.state.cpu.set_register(lr35902::PC, PROGRAM_BASE);
        self.halted = false;
    }

    /// Report events with `can_halt = false`, forcing frontends onto the
    /// thread-blocking pause path.
    pub fn set_can_halt(&self, can_halt: bool) {
        self.state.can_halt.store(can_halt, Ordering::Relaxed);
    }

    pub fn memory(&self) -> MemoryRef {
        self.state.mem.clone()
    }

    pub fn cpu(&self) -> CpuRef {
        self.state.cpu.clone()
    }

    fn dispatch_execution(&self, pc: u64) -> bool {
        // Events postponed by a previous clean halt are considered
        // delivered; execution continues past them.
        {
            let mut resume_skip = self.state.resume_skip.lock();
            if *resume_skip == Some(pc) {
                *resume_skip = None;
                return false;
            }
            *resume_skip = None;
        }

        let handler = self.state.handler.lock().clone();
        let Some(handler) = handler else {
            return false;
        };
        let can_halt = self.state.can_halt.load(Ordering::Relaxed);
        let depth = self.state.call_depth.load(Ordering::Relaxed);

        // Collect matching subscriptions first: handlers may mutate the
        // subscription set while we dispatch.
        let matching: Vec<SubscriptionId> = {
            let subs = self.state.subs.lock();
            let mut ids: Vec<SubscriptionId> = subs
                .iter()
                .filter(|(_, record)| match &record.subscription {
                    Subscription::Execution { range, step, .. } => {
                        if !range.contains(pc) {
                            return false;
                        }
                        match step {
                            StepKind::Step | StepKind::SkipInterrupt => true,
                            StepKind::CurrentSubroutine => depth <= record.base_depth,
                            StepKind::StepOut => depth < record.base_depth,
                        }
                    }
                    _ => false,
                })
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();
            ids
        };

        let mut halt = false;
        for id in matching {
            let event = Event::new(
                EventKind::Execution {
                    cpu: self.state.cpu.clone() as CpuRef,
                    address: pc,
                },
                can_halt,
            );
            if handler.handle_event(id, &event) && can_halt {
                halt = true;
            }
        }
        halt
    }

    fn dispatch_memory(&self, address: u64, op: MemoryOp, value: u8) -> bool {
        let handler = self.state.handler.lock().clone();
        let Some(handler) = handler else {
            return false;
        };
        let can_halt = self.state.can_halt.load(Ordering::Relaxed);

        let matching: Vec<SubscriptionId> = {
            let subs = self.state.subs.lock();
            let mut ids: Vec<SubscriptionId> = subs
                .iter()
                .filter(|(_, record)| match &record.subscription {
                    Subscription::Memory {
                        range, op: want, ..
                    } => range.contains(address) && want.intersects(op),
                    _ => false,
                })
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();
            ids
        };

        let mut halt = false;
        for id in matching {
            let event = Event::new(
                EventKind::Memory {
                    memory: self.state.mem.clone() as MemoryRef,
                    address,
                    op,
                    value,
                },
                can_halt,
            );
            if handler.handle_event(id, &event) && can_halt {
                halt = true;
            }
        }
        halt
    }

    fn push16(&self, value: u16) {
        let cpu = &self.state.cpu;
        let sp = cpu.get_register(lr35902::SP) as u16;
        let sp = sp.wrapping_sub(2);
        self.state.mem.poke(u64::from(sp), value as u8);
        self.state.mem.poke(u64::from(sp.wrapping_add(1)), (value >> 8) as u8);
        cpu.set_register(lr35902::SP, u64::from(sp));
    }

    fn pop16(&self) -> u16 {
        let cpu = &self.state.cpu;
        let sp = cpu.get_register(lr35902::SP) as u16;
        let lo = self.state.mem.peek(u64::from(sp), false);
        let hi = self.state.mem.peek(u64::from(sp.wrapping_add(1)), false);
        cpu.set_register(lr35902::SP, u64::from(sp.wrapping_add(2)));
        u16::from(hi) << 8 | u16::from(lo)
    }

    /// Executes one instruction. Returns false when the frame must end
    /// (halt requested through the event handler, or HALT reached).
    fn step_one(&mut self) -> bool {
        let cpu = &self.state.cpu;
        let pc = cpu.get_register(lr35902::PC);

        if self.dispatch_execution(pc) {
            *self.state.resume_skip.lock() = Some(pc);
            return false;
        }
        // The handler may have redirected the PC; refetch in that case.
        let new_pc = cpu.get_register(lr35902::PC);
        if new_pc != pc {
            return true;
        }

        let mem = &self.state.mem;
        let op = mem.peek(pc, false);
        let imm8 = || mem.peek(pc + 1, false);
        let imm16 =
            || u16::from(mem.peek(pc + 1, false)) | (u16::from(mem.peek(pc + 2, false)) << 8);

        let mut next = pc.wrapping_add(1) & 0xFFFF;
        match op {
            0x00 => {} // NOP
            0x3E => {
                let v = imm8();
                cpu.set_register(lr35902::A, u64::from(v));
                next = pc.wrapping_add(2) & 0xFFFF;
            }
            0x3C => {
                let a = cpu.get_register(lr35902::A) as u8;
                cpu.set_register(lr35902::A, u64::from(a.wrapping_add(1)));
            }
            0x06 => {
                let v = imm8();
                cpu.set_register(lr35902::B, u64::from(v));
                next = pc.wrapping_add(2) & 0xFFFF;
            }
            0x04 => {
                let b = cpu.get_register(lr35902::B) as u8;
                cpu.set_register(lr35902::B, u64::from(b.wrapping_add(1)));
            }
            0xC3 => next = u64::from(imm16()),
            0x18 => {
                let offset = imm8() as i8;
                next = (pc as i64 + 2 + i64::from(offset)) as u64 & 0xFFFF;
            }
            0xCD => {
                let target = imm16();
                let ret = (pc.wrapping_add(3) & 0xFFFF) as u16;
                self.push16(ret);
                self.state.call_depth.fetch_add(1, Ordering::Relaxed);
                next = u64::from(target);
            }
            0xC9 => {
                self.state.call_depth.fetch_sub(1, Ordering::Relaxed);
                next = u64::from(self.pop16());
            }
            0xEA => {
                let addr = u64::from(imm16());
                let value = cpu.get_register(lr35902::A) as u8;
                let halt = self.dispatch_memory(addr, MemoryOp::WRITE, value);
                mem.poke(addr, value);
                next = pc.wrapping_add(3) & 0xFFFF;
                if halt {
                    cpu.set_register(lr35902::PC, next);
                    return false;
                }
            }
            0xFA => {
                let addr = u64::from(imm16());
                let value = mem.peek(addr, false);
                let halt = self.dispatch_memory(addr, MemoryOp::READ, value);
                cpu.set_register(lr35902::A, u64::from(value));
                next = pc.wrapping_add(3) & 0xFFFF;
                if halt {
                    cpu.set_register(lr35902::PC, next);
                    return false;
                }
            }
            0x76 => {
                // HALT: stay put, end the frame.
                return false;
            }
            _ => {} // everything else behaves as a 1-byte NOP
        }

        cpu.set_register(lr35902::PC, next);
        true
    }
}

impl Default for DemoCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts up in A, mirrors it to 0xC000, and bumps B in a subroutine.
static DEFAULT_PROGRAM: [u8; 18] = [
    0x3E, 0x00, // 0100: LD A,$00
    0x3C, // 0102: INC A
    0xEA, 0x00, 0xC0, // 0103: LD ($C000),A
    0xCD, 0x10, 0x01, // 0106: CALL $0110
    0xC3, 0x02, 0x01, // 0109: JP $0102
    0x00, 0x00, 0x00, 0x00, // padding
    0x04, // 0110: INC B
    0xC9, // 0111: RET
];

impl Core for DemoCore {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            library_name: "ArretDemo".into(),
            library_version: "0.1".into(),
            valid_extensions: Some("gb|bin".into()),
            need_fullpath: false,
        }
    }

    fn av_info(&self) -> AvInfo {
        AvInfo {
            geometry: GameGeometry {
                base_width: FRAME_WIDTH,
                base_height: FRAME_HEIGHT,
                max_width: FRAME_WIDTH,
                max_height: FRAME_HEIGHT,
                aspect_ratio: FRAME_WIDTH as f32 / FRAME_HEIGHT as f32,
            },
            timing: SystemTiming {
                fps: 60.0,
                sample_rate: 384_000.0,
            },
        }
    }

    fn load_content(&mut self, path: &Path) -> Result<(), LoadContentError> {
        let data = std::fs::read(path).map_err(|e| LoadContentError::Message(e.to_string()))?;
        if data.is_empty() {
            self.install_program(&DEFAULT_PROGRAM);
        } else {
            let mut program = data;
            program.truncate(0x8000);
            self.install_program(&program);
        }
        self.loaded = true;
        Ok(())
    }

    fn unload_content(&mut self) {
        self.loaded = false;
    }

    fn run_frame(&mut self, host: &mut dyn Host) {
        if !self.env_init {
            host.set_pixel_format(PixelFormat::Xrgb8888);
            self.env_init = true;
        }

        host.input_poll();
        let _ = host.input_state(0, InputDevice::Joypad, 0, joypad::MASK);

        if !self.halted {
            for _ in 0..INSTRUCTIONS_PER_FRAME {
                if !self.step_one() {
                    break;
                }
            }
        }

        self.frame_counter += 1;
        let shade = 0xFF20_2020 + ((self.frame_counter as u32 & 0x3F) << 2);
        self.frame.fill(shade);
        host.video_refresh(&self.frame, FRAME_WIDTH, FRAME_HEIGHT);

        // One frame of silence at the native 384 kHz rate.
        let silence = vec![0i16; 2 * 6400];
        host.audio_batch(&silence);
    }

    fn reset(&mut self) {
        *self.state.cpu.regs.lock() = RegFile {
            sp: 0xFFFE,
            pc: PROGRAM_BASE as u16,
            ..RegFile::default()
        };
        self.state.call_depth.store(0, Ordering::Relaxed);
        self.halted = false;
    }

    fn serialize_size(&self) -> usize {
        0x1_0000 + 16
    }

    fn serialize(&mut self, dst: &mut [u8]) -> Result<usize, SerializeError> {
        let required = self.serialize_size();
        if dst.len() < required {
            return Err(SerializeError::BufferTooSmall { required });
        }
        self.state.mem.peek_range(0, &mut dst[..0x1_0000]);
        let r = *self.state.cpu.regs.lock();
        let tail = &mut dst[0x1_0000..required];
        tail[..8].copy_from_slice(&[r.a, r.f, r.b, r.c, r.d, r.e, r.h, r.l]);
        tail[8..10].copy_from_slice(&r.sp.to_le_bytes());
        tail[10..12].copy_from_slice(&r.pc.to_le_bytes());
        tail[12] = u8::from(r.ime);
        Ok(required)
    }

    fn unserialize(&mut self, src: &[u8]) -> Result<(), SerializeError> {
        let required = self.serialize_size();
        if src.len() < required {
            return Err(SerializeError::Message("state too small".into()));
        }
        self.state.mem.fill(0, &src[..0x1_0000]);
        let tail = &src[0x1_0000..required];
        *self.state.cpu.regs.lock() = RegFile {
            a: tail[0],
            f: tail[1],
            b: tail[2],
            c: tail[3],
            d: tail[4],
            e: tail[5],
            h: tail[6],
            l: tail[7],
            sp: u16::from_le_bytes([tail[8], tail[9]]),
            pc: u16::from_le_bytes([tail[10], tail[11]]),
            ime: tail[12] != 0,
        };
        Ok(())
    }

    fn set_debugger(&mut self, handler: Arc<dyn EventHandler>) -> Option<DebugControlRef> {
        *self.state.handler.lock() = Some(handler);
        Some(Arc::new(DemoControl {
            state: self.state.clone(),
            system: self.system.clone(),
        }))
    }
}
