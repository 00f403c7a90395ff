//! PlayStation system module.
//!
//! Trace options: BIOS call tracing (point subscriptions at the 00A0/00B0/
//! 00C0 dispatchers, function number in R9, arguments in R4..R7), GPU
//! command tracing, and GPU post-command tracing (both decoding the misc
//! GP0/GP1 payload).

use std::sync::Arc;

use parking_lot::Mutex;

use arret_abi::psx::GpuPost;
use arret_abi::{
    AddressRange, Cpu, CpuRef, DebugControl, Event, EventKind, StepKind, Subscription,
    SubscriptionId, System,
};

use super::{SystemTracer, TraceOption};
use crate::trace::TraceSink;

static PSX_INT_NAMES: [&str; 11] = [
    "VBlank", "GPU", "CD", "DMA", "Timer0", "Timer1", "Timer2", "SIO",
    // bit 8: no standard interrupt
    "", "SPU", "PIO",
];

struct BiosFunc {
    func: u8,
    name: &'static str,
    /// Number of named arguments (0-4).
    nargs: u8,
}

const fn bf(func: u8, name: &'static str, nargs: u8) -> BiosFunc {
    BiosFunc { func, name, nargs }
}

/// A-functions (call 00A0h).
#[rustfmt::skip]
static A_TABLE: &[BiosFunc] = &[
    bf(0x00, "FileOpen", 2),        bf(0x01, "FileSeek", 3),
    bf(0x02, "FileRead", 3),        bf(0x03, "FileWrite", 3),
    bf(0x04, "FileClose", 1),       bf(0x05, "FileIoctl", 3),
    bf(0x06, "exit", 1),            bf(0x07, "FileGetDeviceFlag", 1),
    bf(0x08, "FileGetc", 1),        bf(0x09, "FilePutc", 2),
    bf(0x0A, "todigit", 1),         bf(0x0B, "atof", 1),
    bf(0x0C, "strtoul", 3),         bf(0x0D, "strtol", 3),
    bf(0x0E, "abs", 1),             bf(0x0F, "labs", 1),
    bf(0x10, "atoi", 1),            bf(0x11, "atol", 1),
    bf(0x12, "atob", 2),            bf(0x13, "SaveState", 1),
    bf(0x14, "RestoreState", 2),    bf(0x15, "strcat", 2),
    bf(0x16, "strncat", 3),         bf(0x17, "strcmp", 2),
    bf(0x18, "strncmp", 3),         bf(0x19, "strcpy", 2),
    bf(0x1A, "strncpy", 3),         bf(0x1B, "strlen", 1),
    bf(0x1C, "index", 2),           bf(0x1D, "rindex", 2),
    bf(0x1E, "strchr", 2),          bf(0x1F, "strrchr", 2),
    bf(0x20, "strpbrk", 2),         bf(0x21, "strspn", 2),
    bf(0x22, "strcspn", 2),         bf(0x23, "strtok", 2),
    bf(0x24, "strstr", 2),          bf(0x25, "toupper", 1),
    bf(0x26, "tolower", 1),         bf(0x27, "bcopy", 3),
    bf(0x28, "bzero", 2),           bf(0x29, "bcmp", 3),
    bf(0x2A, "memcpy", 3),          bf(0x2B, "memset", 3),
    bf(0x2C, "memmove", 3),         bf(0x2D, "memcmp", 3),
    bf(0x2E, "memchr", 3),          bf(0x2F, "rand", 0),
    bf(0x30, "srand", 1),           bf(0x31, "qsort", 4),
    bf(0x32, "strtod", 2),          bf(0x33, "malloc", 1),
    bf(0x34, "free", 1),            bf(0x35, "lsearch", 4),
    bf(0x36, "bsearch", 4),         bf(0x37, "calloc", 2),
    bf(0x38, "realloc", 2),         bf(0x39, "InitHeap", 2),
    bf(0x3A, "SystemErrorExit", 1), bf(0x3B, "std_in_getchar", 0),
    bf(0x3C, "std_out_putchar", 1), bf(0x3D, "std_in_gets", 1),
    bf(0x3E, "std_out_puts", 1),    bf(0x3F, "printf", 1),
    bf(0x40, "SystemErrorUnresolvedException", 0),
    bf(0x41, "LoadExeHeader", 2),   bf(0x42, "LoadExeFile", 2),
    bf(0x43, "DoExecute", 3),       bf(0x44, "FlushCache", 0),
    bf(0x45, "init_a0_b0_c0_vectors", 0),
    bf(0x46, "GPU_dw", 4),          bf(0x47, "gpu_send_dma", 4),
    bf(0x48, "SendGP1Command", 1),  bf(0x49, "GPU_cw", 1),
    bf(0x4A, "GPU_cwp", 2),         bf(0x4B, "send_gpu_linked_list", 1),
    bf(0x4C, "gpu_abort_dma", 0),   bf(0x4D, "GetGPUStatus", 0),
    bf(0x4E, "gpu_sync", 0),        bf(0x51, "LoadAndExecute", 3),
    bf(0x54, "CdInit", 0),          bf(0x55, "_bu_init", 0),
    bf(0x56, "CdRemove", 0),        bf(0x5B, "dev_tty_init", 0),
    bf(0x5C, "dev_tty_open", 3),    bf(0x5D, "dev_tty_in_out", 2),
    bf(0x5E, "dev_tty_ioctl", 3),   bf(0x5F, "dev_cd_open", 3),
    bf(0x60, "dev_cd_read", 3),     bf(0x61, "dev_cd_close", 1),
    bf(0x62, "dev_cd_firstfile", 3), bf(0x63, "dev_cd_nextfile", 2),
    bf(0x64, "dev_cd_chdir", 2),    bf(0x65, "dev_card_open", 3),
    bf(0x66, "dev_card_read", 3),   bf(0x67, "dev_card_write", 3),
    bf(0x68, "dev_card_close", 1),  bf(0x69, "dev_card_firstfile", 3),
    bf(0x6A, "dev_card_nextfile", 2), bf(0x6B, "dev_card_erase", 2),
    bf(0x6C, "dev_card_undelete", 2), bf(0x6D, "dev_card_format", 1),
    bf(0x6E, "dev_card_rename", 4), bf(0x70, "_bu_init", 0),
    bf(0x71, "CdInit", 0),          bf(0x72, "CdRemove", 0),
    bf(0x78, "CdAsyncSeekL", 1),    bf(0x7C, "CdAsyncGetStatus", 1),
    bf(0x7E, "CdAsyncReadSector", 3), bf(0x81, "CdAsyncSetMode", 1),
    bf(0x90, "CdromIoIrqFunc1", 0), bf(0x91, "CdromDmaIrqFunc1", 0),
    bf(0x92, "CdromIoIrqFunc2", 0), bf(0x93, "CdromDmaIrqFunc2", 0),
    bf(0x94, "CdromGetInt5errCode", 2), bf(0x95, "CdInitSubFunc", 0),
    bf(0x96, "AddCDROMDevice", 0),  bf(0x97, "AddMemCardDevice", 0),
    bf(0x98, "AddDuartTtyDevice", 0), bf(0x99, "AddDummyTtyDevice", 0),
    bf(0x9C, "SetConf", 3),         bf(0x9D, "GetConf", 3),
    bf(0x9E, "SetCdromIrqAutoAbort", 2), bf(0x9F, "SetMemSize", 1),
    bf(0xA0, "WarmBoot", 0),        bf(0xA1, "SystemErrorBootOrDiskFailure", 2),
    bf(0xA2, "EnqueueCdIntr", 0),   bf(0xA3, "DequeueCdIntr", 0),
    bf(0xA4, "CdGetLbn", 1),        bf(0xA5, "CdReadSector", 3),
    bf(0xA6, "CdGetStatus", 0),     bf(0xAB, "_card_info", 1),
    bf(0xAC, "_card_async_load_directory", 1),
    bf(0xAD, "set_card_auto_format", 1), bf(0xAF, "card_write_test", 1),
    bf(0xB2, "ioabort_raw", 1),     bf(0xB4, "GetSystemInfo", 1),
];

/// B-functions (call 00B0h).
#[rustfmt::skip]
static B_TABLE: &[BiosFunc] = &[
    bf(0x00, "alloc_kernel_memory", 1), bf(0x01, "free_kernel_memory", 1),
    bf(0x02, "init_timer", 3),      bf(0x03, "get_timer", 1),
    bf(0x04, "enable_timer_irq", 1), bf(0x05, "disable_timer_irq", 1),
    bf(0x06, "restart_timer", 1),   bf(0x07, "DeliverEvent", 2),
    bf(0x08, "OpenEvent", 4),       bf(0x09, "CloseEvent", 1),
    bf(0x0A, "WaitEvent", 1),       bf(0x0B, "TestEvent", 1),
    bf(0x0C, "EnableEvent", 1),     bf(0x0D, "DisableEvent", 1),
    bf(0x0E, "OpenThread", 3),      bf(0x0F, "CloseThread", 1),
    bf(0x10, "ChangeThread", 1),    bf(0x12, "InitPad", 4),
    bf(0x13, "StartPad", 0),        bf(0x14, "StopPad", 0),
    bf(0x15, "OutdatedPadInitAndStart", 4),
    bf(0x16, "OutdatedPadGetButtons", 0),
    bf(0x17, "ReturnFromException", 0),
    bf(0x18, "SetDefaultExitFromException", 0),
    bf(0x19, "SetCustomExitFromException", 1),
    bf(0x20, "UnDeliverEvent", 2),  bf(0x32, "FileOpen", 2),
    bf(0x33, "FileSeek", 3),        bf(0x34, "FileRead", 3),
    bf(0x35, "FileWrite", 3),       bf(0x36, "FileClose", 1),
    bf(0x37, "FileIoctl", 3),       bf(0x38, "exit", 1),
    bf(0x39, "FileGetDeviceFlag", 1), bf(0x3A, "FileGetc", 1),
    bf(0x3B, "FilePutc", 2),        bf(0x3C, "std_in_getchar", 0),
    bf(0x3D, "std_out_putchar", 1), bf(0x3E, "std_in_gets", 1),
    bf(0x3F, "std_out_puts", 1),    bf(0x40, "chdir", 1),
    bf(0x41, "FormatDevice", 1),    bf(0x42, "firstfile", 2),
    bf(0x43, "nextfile", 1),        bf(0x44, "FileRename", 2),
    bf(0x45, "FileDelete", 1),      bf(0x46, "FileUndelete", 1),
    bf(0x47, "AddDevice", 1),       bf(0x48, "RemoveDevice", 1),
    bf(0x49, "PrintInstalledDevices", 0), bf(0x4A, "InitCard", 1),
    bf(0x4B, "StartCard", 0),       bf(0x4C, "StopCard", 0),
    bf(0x4D, "_card_info_subfunc", 1), bf(0x4E, "write_card_sector", 3),
    bf(0x4F, "read_card_sector", 3), bf(0x50, "allow_new_card", 0),
    bf(0x51, "Krom2RawAdd", 1),     bf(0x53, "Krom2Offset", 1),
    bf(0x54, "GetLastError", 0),    bf(0x55, "GetLastFileError", 1),
    bf(0x56, "GetC0Table", 0),      bf(0x57, "GetB0Table", 0),
    bf(0x58, "get_bu_callback_port", 0), bf(0x59, "testdevice", 1),
    bf(0x5B, "ChangeClearPad", 1),  bf(0x5C, "get_card_status", 1),
    bf(0x5D, "wait_card_status", 1),
];

/// C-functions (call 00C0h).
#[rustfmt::skip]
static C_TABLE: &[BiosFunc] = &[
    bf(0x00, "EnqueueTimerAndVblankIrqs", 1),
    bf(0x01, "EnqueueSyscallHandler", 1),
    bf(0x02, "SysEnqIntRP", 2),     bf(0x03, "SysDeqIntRP", 2),
    bf(0x04, "get_free_EvCB_slot", 0), bf(0x05, "get_free_TCB_slot", 0),
    bf(0x06, "ExceptionHandler", 0), bf(0x07, "InstallExceptionHandlers", 0),
    bf(0x08, "SysInitMemory", 2),   bf(0x09, "SysInitKernelVariables", 0),
    bf(0x0A, "ChangeClearRCnt", 2), bf(0x0C, "InitDefInt", 1),
    bf(0x0D, "SetIrqAutoAck", 2),   bf(0x12, "InstallDevices", 1),
    bf(0x13, "FlushStdInOutPut", 0), bf(0x15, "tty_cdevinput", 2),
    bf(0x16, "tty_cdevscan", 0),    bf(0x17, "tty_circgetc", 1),
    bf(0x18, "tty_circputc", 2),    bf(0x19, "ioabort", 2),
    bf(0x1A, "set_card_find_mode", 1), bf(0x1B, "KernelRedirect", 1),
    bf(0x1C, "AdjustA0Table", 0),   bf(0x1D, "get_card_find_mode", 0),
];

fn lookup(table: &'static [BiosFunc], func: u8) -> Option<&'static BiosFunc> {
    table.iter().find(|f| f.func == func)
}

/// Sign-extend an 11-bit value.
pub(crate) fn sign11(v: u32) -> i32 {
    ((v << 21) as i32) >> 21
}

/// `A3F: printf(r4, ...)`-style line for a BIOS dispatcher hit.
fn format_bios_call(table_letter: char, func: u8, cpu: &dyn Cpu) -> String {
    use arret_abi::r3000a;

    let table = match table_letter {
        'A' => A_TABLE,
        'B' => B_TABLE,
        _ => C_TABLE,
    };
    let args = [
        cpu.get_register(r3000a::A0) as u32,
        cpu.get_register(r3000a::A1) as u32,
        cpu.get_register(r3000a::A2) as u32,
        cpu.get_register(r3000a::A3) as u32,
    ];

    match lookup(table, func) {
        Some(f) => {
            let mut out = format!("{table_letter}{func:02X}: {}(", f.name);
            for (i, arg) in args.iter().take(usize::from(f.nargs.min(4))).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format!("{arg:X}"));
            }
            // printf is variadic: show the format pointer plus ellipsis.
            if table_letter == 'A' && func == 0x3F {
                out.push_str(", ...");
            }
            out.push(')');
            out
        }
        None => format!(
            "{table_letter}{func:02X}({:X}, {:X}, {:X}, {:X})",
            args[0], args[1], args[2], args[3]
        ),
    }
}

/// One-line decode of a GP0 command.
pub fn decode_gp0(words: &[u32]) -> String {
    let Some(&first) = words.first() else {
        return "GP0 ?".to_string();
    };
    let op = (first >> 24) as u8;

    match op {
        0x00 => "GP0 NOP".to_string(),
        0x01 => "GP0 ClearCache".to_string(),
        0x02 => {
            let color = first & 0xFF_FFFF;
            let (mut x, mut y, mut w, mut h) = (0, 0, 0, 0);
            if words.len() >= 3 {
                x = sign11(words[1] & 0x7FF);
                y = sign11((words[1] >> 16) & 0x7FF);
                w = (words[2] & 0xFFFF) as i32;
                h = (words[2] >> 16) as i32;
            }
            format!("GP0 FillRect ({x},{y}) {w}x{h} #{color:06X}")
        }
        0x1F => "GP0 IRQ".to_string(),
        0x20..=0x3F => {
            let quad = op & 0x08 != 0;
            let tex = op & 0x04 != 0;
            let shade = op & 0x10 != 0;
            let trans = op & 0x02 != 0;
            format!(
                "GP0 {} {}{}{}",
                if quad { "Poly4" } else { "Poly3" },
                if shade { "shade " } else { "mono " },
                if tex { "tex " } else { "" },
                if trans { "trans" } else { "opaque" }
            )
        }
        0x40..=0x5F => {
            let shade = op & 0x10 != 0;
            let trans = op & 0x02 != 0;
            let polyline = op & 0x08 != 0;
            format!(
                "GP0 {} {}{}",
                if polyline { "Polyline" } else { "Line" },
                if shade { "shade " } else { "mono " },
                if trans { "trans" } else { "opaque" }
            )
        }
        0x60..=0x7F => {
            let tex = op & 0x04 != 0;
            let trans = op & 0x02 != 0;
            let size = match (op >> 3) & 0x03 {
                0 => "var",
                1 => "1x1",
                2 => "8x8",
                _ => "16x16",
            };
            format!(
                "GP0 Rect {size}{}{}",
                if tex { " tex" } else { "" },
                if trans { " trans" } else { " opaque" }
            )
        }
        0x80..=0x9F => {
            let (mut sx, mut sy, mut dx, mut dy, mut w, mut h) = (0, 0, 0, 0, 0, 0);
            if words.len() >= 4 {
                sx = words[1] & 0x3FF;
                sy = (words[1] >> 16) & 0x3FF;
                dx = words[2] & 0x3FF;
                dy = (words[2] >> 16) & 0x3FF;
                w = words[3] & 0x3FF;
                h = (words[3] >> 16) & 0x1FF;
            }
            format!("GP0 VRAM>VRAM ({sx},{sy})>({dx},{dy}) {w}x{h}")
        }
        0xA0..=0xBF => {
            let (mut x, mut y, mut w, mut h) = (0, 0, 0, 0);
            if words.len() >= 3 {
                x = words[1] & 0x3FF;
                y = (words[1] >> 16) & 0x3FF;
                w = words[2] & 0x3FF;
                h = (words[2] >> 16) & 0x1FF;
            }
            format!("GP0 CPU>VRAM ({x},{y}) {w}x{h}")
        }
        0xC0..=0xDF => {
            let (mut x, mut y, mut w, mut h) = (0, 0, 0, 0);
            if words.len() >= 3 {
                x = words[1] & 0x3FF;
                y = (words[1] >> 16) & 0x3FF;
                w = words[2] & 0x3FF;
                h = (words[2] >> 16) & 0x1FF;
            }
            format!("GP0 VRAM>CPU ({x},{y}) {w}x{h}")
        }
        0xE1 => {
            let v = first & 0xFF_FFFF;
            let page_x = (v & 0xF) * 64;
            let page_y = ((v >> 4) & 1) * 256;
            let abr = (v >> 5) & 3;
            let depth = ["4bpp", "8bpp", "15bpp", "reserved"][((v >> 7) & 3) as usize];
            let dither = (v >> 9) & 1 != 0;
            format!(
                "GP0 DrawMode page=({page_x},{page_y}) abr={abr} {depth}{}",
                if dither { " dither" } else { "" }
            )
        }
        0xE2 => format!("GP0 TexWindow {:08X}", first & 0xFF_FFFF),
        0xE3 => {
            let x = first & 0x3FF;
            let y = (first >> 10) & 0x1FF;
            format!("GP0 DrawAreaTL ({x},{y})")
        }
        0xE4 => {
            let x = first & 0x3FF;
            let y = (first >> 10) & 0x1FF;
            format!("GP0 DrawAreaBR ({x},{y})")
        }
        0xE5 => {
            let x = sign11(first & 0x7FF);
            let y = sign11((first >> 11) & 0x7FF);
            format!("GP0 DrawOffset ({x},{y})")
        }
        0xE6 => {
            let v = first & 3;
            format!("GP0 MaskBit set={} check={}", v & 1, (v >> 1) & 1)
        }
        _ => format!("GP0 {op:02X} [{first:08X}]"),
    }
}

/// One-line decode of a GP1 command.
pub fn decode_gp1(words: &[u32]) -> String {
    let Some(&first) = words.first() else {
        return "GP1 ?".to_string();
    };
    let op = (first >> 24) as u8;
    let v = first & 0x00FF_FFFF;

    match op {
        0x00 => "GP1 Reset".to_string(),
        0x01 => "GP1 ResetCmdBuf".to_string(),
        0x02 => "GP1 AckIRQ".to_string(),
        0x03 => format!("GP1 DispEnable {}", if v & 1 != 0 { "off" } else { "on" }),
        0x04 => format!("GP1 DMADir {}", v & 3),
        0x05 => {
            let x = v & 0x3FE;
            let y = (v >> 10) & 0x1FF;
            format!("GP1 DispStart ({x},{y})")
        }
        0x06 => {
            let x1 = v & 0xFFF;
            let x2 = (v >> 12) & 0xFFF;
            format!("GP1 HRange {x1}-{x2}")
        }
        0x07 => {
            let y1 = v & 0x3FF;
            let y2 = (v >> 10) & 0x3FF;
            format!("GP1 VRange {y1}-{y2}")
        }
        0x08 => {
            let widths = [256, 320, 512, 640];
            let width = if v & 0x40 != 0 {
                368
            } else {
                widths[(v & 3) as usize]
            };
            let height = if v & 0x04 != 0 { 480 } else { 240 };
            let region = if v & 0x08 != 0 { "PAL" } else { "NTSC" };
            let depth = if v & 0x10 != 0 { "24bpp" } else { "15bpp" };
            let interlace = v & 0x20 != 0;
            format!(
                "GP1 DispMode {width}x{height} {region} {depth}{}",
                if interlace { " interlace" } else { "" }
            )
        }
        0x09 => format!("GP1 TexDisable {}", v & 1),
        0x10..=0x1F => format!("GP1 GetInfo {}", v & 0xF),
        _ => format!("GP1 {op:02X} [{v:06X}]"),
    }
}

const BIOS_ADDRS: [u64; 3] = [0xA0, 0xB0, 0xC0];

#[derive(Default)]
struct PsxState {
    bios_subs: [Option<SubscriptionId>; 3],
    gpu_subs: [Option<SubscriptionId>; 2],
    post_sub: Option<SubscriptionId>,
    sink: Option<Arc<TraceSink>>,
    cpu: Option<CpuRef>,
}

pub struct PsxTracer {
    state: Mutex<PsxState>,
}

static PSX_TRACE_OPTIONS: [TraceOption; 3] = [
    TraceOption {
        label: "BIOS calls",
    },
    TraceOption {
        label: "GPU commands",
    },
    TraceOption {
        label: "GPU post-commands",
    },
];

impl PsxTracer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PsxState::default()),
        }
    }
}

impl Default for PsxTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemTracer for PsxTracer {
    fn interrupt_names(&self) -> &'static [&'static str] {
        &PSX_INT_NAMES
    }

    fn trace_options(&self) -> &'static [TraceOption] {
        &PSX_TRACE_OPTIONS
    }

    fn option_start(
        &self,
        index: usize,
        control: &dyn DebugControl,
        system: &dyn System,
        sink: Arc<TraceSink>,
    ) -> bool {
        let mut state = self.state.lock();
        match index {
            0 => {
                let Some(cpu) = system.cpus().iter().find(|c| c.is_main()).cloned() else {
                    return false;
                };
                for (slot, addr) in state.bios_subs.iter_mut().zip(BIOS_ADDRS) {
                    let id = control.subscribe(&Subscription::Execution {
                        cpu: cpu.clone(),
                        step: StepKind::Step,
                        range: AddressRange::point(addr),
                    });
                    *slot = (id >= 0).then_some(id);
                }
                state.cpu = Some(cpu);
                state.sink = Some(sink);
                true
            }
            1 => {
                let mut found = [None, None];
                for bp in system.misc_breakpoints() {
                    match bp.description.as_str() {
                        "GP0" => found[0] = Some(bp.clone()),
                        "GP1" => found[1] = Some(bp.clone()),
                        _ => {}
                    }
                }
                let (Some(gp0), Some(gp1)) = (found[0].take(), found[1].take()) else {
                    return false;
                };
                for (slot, bp) in state.gpu_subs.iter_mut().zip([gp0, gp1]) {
                    let id = control.subscribe(&Subscription::Misc { breakpoint: bp });
                    *slot = (id >= 0).then_some(id);
                }
                state.sink = Some(sink);
                true
            }
            2 => {
                let Some(bp) = system
                    .misc_breakpoints()
                    .iter()
                    .find(|bp| bp.description == "GPU Post")
                    .cloned()
                else {
                    return false;
                };
                let id = control.subscribe(&Subscription::Misc { breakpoint: bp });
                state.post_sub = (id >= 0).then_some(id);
                state.sink = Some(sink);
                state.post_sub.is_some()
            }
            _ => false,
        }
    }

    fn option_stop(&self, index: usize, control: &dyn DebugControl) {
        let mut state = self.state.lock();
        match index {
            0 => {
                for slot in &mut state.bios_subs {
                    if let Some(id) = slot.take() {
                        control.unsubscribe(id);
                    }
                }
                state.cpu = None;
            }
            1 => {
                for slot in &mut state.gpu_subs {
                    if let Some(id) = slot.take() {
                        control.unsubscribe(id);
                    }
                }
            }
            2 => {
                if let Some(id) = state.post_sub.take() {
                    control.unsubscribe(id);
                }
            }
            _ => {}
        }
    }

    fn owns(&self, sub_id: SubscriptionId) -> bool {
        let state = self.state.lock();
        state.bios_subs.iter().any(|s| *s == Some(sub_id))
            || state.gpu_subs.iter().any(|s| *s == Some(sub_id))
            || state.post_sub == Some(sub_id)
    }

    fn on_event(&self, sub_id: SubscriptionId, event: &Event) {
        let state = self.state.lock();
        let Some(sink) = state.sink.clone() else {
            return;
        };

        if state.bios_subs.iter().any(|s| *s == Some(sub_id)) {
            let EventKind::Execution { address, .. } = event.kind else {
                return;
            };
            let table_letter = match address {
                0xA0 => 'A',
                0xB0 => 'B',
                0xC0 => 'C',
                _ => return,
            };
            let Some(cpu) = state.cpu.clone() else { return };
            drop(state);

            let func = cpu.get_register(arret_abi::r3000a::T1) as u8;
            sink.log(&format_bios_call(table_letter, func, cpu.as_ref()));
            return;
        }

        let is_gpu = state.gpu_subs.iter().any(|s| *s == Some(sub_id));
        let is_post = state.post_sub == Some(sub_id);
        if !is_gpu && !is_post {
            return;
        }
        drop(state);

        let EventKind::Misc { data, .. } = &event.kind else {
            return;
        };
        let Some(post) = data.as_ref().and_then(|d| GpuPost::from_bytes(d)) else {
            return;
        };

        let line = if post.port == 0 {
            decode_gp0(post.words())
        } else {
            decode_gp1(post.words())
        };
        if is_post {
            sink.log(&format!("[post] {line}"));
        } else {
            sink.log(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gp0_decodes() {
        assert_eq!(decode_gp0(&[0x0000_0000]), "GP0 NOP");
        assert_eq!(
            decode_gp0(&[0x0200_00FF, 0x0010_0020, 0x0008_0040]),
            "GP0 FillRect (32,16) 64x8 #0000FF"
        );
        assert_eq!(decode_gp0(&[0x2800_0000]), "GP0 Poly4 mono opaque");
        assert_eq!(decode_gp0(&[0x3C00_0000]), "GP0 Poly4 shade tex opaque");
        assert_eq!(decode_gp0(&[0x6500_0000]), "GP0 Rect var tex opaque");
        assert_eq!(
            decode_gp0(&[0xA000_0000, 0x0010_0020, 0x0008_0040]),
            "GP0 CPU>VRAM (32,16) 64x8"
        );
        assert_eq!(decode_gp0(&[0xE300_0000]), "GP0 DrawAreaTL (0,0)");
        assert_eq!(decode_gp0(&[0xE500_0000 | (0x7FF & 0x7FF)]), "GP0 DrawOffset (-1,0)");
    }

    #[test]
    fn gp1_decodes() {
        assert_eq!(decode_gp1(&[0x0000_0000]), "GP1 Reset");
        assert_eq!(decode_gp1(&[0x0300_0001]), "GP1 DispEnable off");
        assert_eq!(decode_gp1(&[0x0800_0001]), "GP1 DispMode 320x240 NTSC 15bpp");
        assert_eq!(decode_gp1(&[0x1000_0007]), "GP1 GetInfo 7");
    }

    #[test]
    fn sign11_extends() {
        assert_eq!(sign11(0x000), 0);
        assert_eq!(sign11(0x3FF), 1023);
        assert_eq!(sign11(0x400), -1024);
        assert_eq!(sign11(0x7FF), -1);
    }

    #[test]
    fn bios_tables_resolve_known_functions() {
        assert_eq!(lookup(A_TABLE, 0x3F).unwrap().name, "printf");
        assert_eq!(lookup(B_TABLE, 0x07).unwrap().name, "DeliverEvent");
        assert_eq!(lookup(C_TABLE, 0x1C).unwrap().name, "AdjustA0Table");
        assert!(lookup(A_TABLE, 0x50).is_none());
    }
}
