//! Command parsing and dispatch.

use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};

use arret_abi::{Cpu, CpuRef, Memory, MemoryRef, System, joypad};
use arret_arch::registers;
use arret_backend::breakpoint::BpFlags;
use arret_backend::search::{SearchOp, VS_PREV};
use arret_backend::sys::psx::{decode_gp0, decode_gp1};
use arret_backend::sys::psx_capture::CaptureEventKind;
use arret_backend::{CoreState, Runtime, StepRequest, memmap};

const PEEK_MAX: u64 = 256;
const RUN_MAX_FRAMES: u64 = 10_000;
const DIS_MAX_BYTES: u64 = 0x10_0000;
const POLL_SLEEP: Duration = Duration::from_micros(100);

/// Frontend hook for verbs the backend does not know. Returns true when the
/// command was handled (response already written).
pub type CommandHook = Box<dyn Fn(&Runtime, &str, &str, &mut dyn Write) -> bool + Send + Sync>;

#[derive(Default)]
pub struct Dispatcher {
    hook: Option<CommandHook>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sub-dispatcher for unknown verbs.
    pub fn set_hook(&mut self, hook: CommandHook) {
        self.hook = Some(hook);
    }

    /// Processes a single command line, writing the response to `out`.
    pub fn process(&self, rt: &Runtime, line: &str, out: &mut dyn Write) -> io::Result<()> {
        let line = line.trim_end();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&verb) = tokens.first() else {
            return Ok(());
        };
        let args = &tokens[1..];

        match verb {
            "quit" => {
                json_ok(out, Map::new())?;
                rt.set_running(false);
                Ok(())
            }
            "info" => cmd_info(rt, out),
            "content" => cmd_content(rt, out),
            "run" => cmd_run(rt, args, out),
            "s" => cmd_step(rt, StepRequest::In, out),
            "so" => cmd_step(rt, StepRequest::Over, out),
            "sout" => cmd_step(rt, StepRequest::Out, out),
            "input" => cmd_input(rt, args, out),
            "peek" => cmd_peek(rt, args, out),
            "poke" => cmd_poke(rt, args, out),
            "reg" => cmd_reg(rt, args, out),
            "regions" => cmd_regions(rt, out),
            "save" => cmd_save(rt, args, out),
            "load" => cmd_load(rt, args, out),
            "screen" => cmd_screen(rt, args, out),
            "dump" => cmd_dump(rt, line, args, out),
            "dis" => cmd_dis(rt, args, out),
            "search" => cmd_search(rt, line, args, out),
            "cpu" => cmd_cpu(rt, out),
            "bp" => cmd_bp(rt, line, args, out),
            "sym" => cmd_sym(rt, line, args, out),
            "trace" => cmd_trace(rt, line, args, out),
            "stack" => cmd_stack(rt, args, out),
            "capture" => cmd_capture(rt, args, out),
            "reset" => match rt.reset() {
                Ok(()) => json_ok(out, Map::new()),
                Err(e) => json_err(out, e),
            },
            "manual" => cmd_manual(rt, args, out),
            _ => {
                if let Some(hook) = &self.hook
                    && hook(rt, verb, line, out)
                {
                    return Ok(());
                }
                json_err(out, format_args!("unknown command: {verb}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn json_ok(out: &mut dyn Write, fields: Map<String, Value>) -> io::Result<()> {
    let mut object = Map::new();
    object.insert("ok".into(), Value::Bool(true));
    object.extend(fields);
    writeln!(out, "{}", Value::Object(object))
}

fn json_err(out: &mut dyn Write, message: impl Display) -> io::Result<()> {
    writeln!(out, "{}", json!({ "ok": false, "error": message.to_string() }))
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Parses `0x`-prefixed hex or decimal.
fn parse_num(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

fn parse_hex(token: &str) -> Option<u64> {
    let token = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(token, 16).ok()
}

/// Remainder of `line` after its first `n` whitespace-separated tokens.
fn rest_after(line: &str, n: usize) -> &str {
    let mut rest = line.trim_start();
    for _ in 0..n {
        match rest.find(char::is_whitespace) {
            Some(i) => rest = rest[i..].trim_start(),
            None => return "",
        }
    }
    rest.trim_end()
}

fn button_id_from_name(name: &str) -> Option<u32> {
    let id = match name.to_ascii_lowercase().as_str() {
        "b" => joypad::B,
        "y" => joypad::Y,
        "select" => joypad::SELECT,
        "start" => joypad::START,
        "up" => joypad::UP,
        "down" => joypad::DOWN,
        "left" => joypad::LEFT,
        "right" => joypad::RIGHT,
        "a" => joypad::A,
        "x" => joypad::X,
        "l" => joypad::L,
        "r" => joypad::R,
        "l2" => joypad::L2,
        "r2" => joypad::R2,
        "l3" => joypad::L3,
        "r3" => joypad::R3,
        _ => return None,
    };
    Some(id)
}

/// Polls the core until the frame settles. Returns true when the frame
/// ended in BLOCKED.
fn wait_frame(rt: &Runtime) -> bool {
    loop {
        match rt.core_state() {
            CoreState::Done => {
                rt.ack_done();
                return false;
            }
            CoreState::Blocked => return true,
            _ => std::thread::sleep(POLL_SLEEP),
        }
    }
}

/// Resumes a core left BLOCKED by a previous hit and drains the
/// interrupted frame.
fn resume_if_blocked(rt: &Runtime) {
    if !rt.blocked() {
        return;
    }
    rt.set_skip();
    rt.ack_bp_hit();
    rt.resume_blocked();
    loop {
        match rt.core_state() {
            CoreState::Idle => break,
            CoreState::Done => {
                rt.ack_done();
                break;
            }
            // Another non-haltable hit while the frame drained.
            CoreState::Blocked => break,
            CoreState::Running => std::thread::sleep(POLL_SLEEP),
        }
    }
}

// ---------------------------------------------------------------------------
// Simple verbs
// ---------------------------------------------------------------------------

fn cmd_info(rt: &Runtime, out: &mut dyn Write) -> io::Result<()> {
    let si = rt.sys_info();
    let av = rt.av_info();
    json_ok(
        out,
        fields(json!({
            "core": si.library_name.clone(),
            "version": si.library_version.clone(),
            "width": av.geometry.base_width,
            "height": av.geometry.base_height,
            "fps": av.timing.fps,
            "sample_rate": av.timing.sample_rate,
            "debug": rt.has_debug(),
        })),
    )
}

fn cmd_content(rt: &Runtime, out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    if !rt.content_loaded() {
        return json_err(out, "no content loaded");
    }
    let Some(system) = rt.system() else {
        return json_err(out, "no debug support");
    };
    match system.content_info() {
        Some(info) => json_ok(out, fields(json!({ "info": info }))),
        None => json_err(out, "core does not support content info"),
    }
}

fn cmd_manual(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    match args.first() {
        Some(&"on") => {
            rt.set_manual_input(true);
            json_ok(out, fields(json!({ "manual": true })))
        }
        Some(&"off") => {
            rt.set_manual_input(false);
            json_ok(out, fields(json!({ "manual": false })))
        }
        _ => json_err(out, "usage: manual on|off"),
    }
}

fn cmd_input(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let (Some(button), Some(value)) = (args.first(), args.get(1)) else {
        return json_err(out, "usage: input <button> <0|1>");
    };
    let Some(id) = button_id_from_name(button) else {
        return json_err(out, format_args!("unknown button: {button}"));
    };
    let value: i16 = value.parse().unwrap_or(0);
    rt.input_unfix(id);
    rt.set_input(id, value);
    json_ok(out, Map::new())
}

// ---------------------------------------------------------------------------
// Run control
// ---------------------------------------------------------------------------

fn cmd_run(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.content_loaded() {
        return json_err(out, "no content loaded");
    }
    let n = args
        .first()
        .and_then(|t| parse_num(t))
        .unwrap_or(1)
        .clamp(1, RUN_MAX_FRAMES);

    // Thread-blocking debug events must not park the command thread.
    rt.start_core_thread();
    resume_if_blocked(rt);

    let fps = rt.av_info().timing.fps;
    let frame_duration = if fps > 0.0 {
        Duration::from_secs_f64(1.0 / fps)
    } else {
        Duration::ZERO
    };

    let mut frames = 0u64;
    let mut was_blocked = false;
    for _ in 0..n {
        let started = Instant::now();
        if !rt.run_frame_async() {
            std::thread::sleep(Duration::from_millis(1));
            if !rt.run_frame_async() {
                break;
            }
        }
        was_blocked = wait_frame(rt);
        frames += 1;

        if was_blocked || rt.bp_hit().is_some() {
            break;
        }

        let elapsed = started.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    rt.bp_flush_deferred();
    match rt.bp_hit() {
        Some(bp) => {
            rt.ack_bp_hit();
            let mut map = fields(json!({ "frames": frames, "breakpoint": bp }));
            if was_blocked {
                map.insert("blocked".into(), Value::Bool(true));
            }
            json_ok(out, map)
        }
        None => json_ok(out, fields(json!({ "frames": frames }))),
    }
}

fn cmd_step(rt: &Runtime, request: StepRequest, out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    if !rt.content_loaded() {
        return json_err(out, "no content loaded");
    }

    rt.start_core_thread();
    resume_if_blocked(rt);

    if !rt.step_begin(request) {
        return json_err(out, "step subscribe failed");
    }

    let mut frames = 0u64;
    for _ in 0..RUN_MAX_FRAMES {
        if !rt.run_frame_async() {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        wait_frame(rt);
        frames += 1;

        if rt.step_complete() || rt.bp_hit().is_some() || rt.blocked() {
            break;
        }
    }

    rt.step_end();
    rt.bp_flush_deferred();

    match rt.bp_hit() {
        Some(bp) => {
            rt.ack_bp_hit();
            json_ok(out, fields(json!({ "frames": frames, "breakpoint": bp })))
        }
        None => json_ok(out, fields(json!({ "frames": frames }))),
    }
}

// ---------------------------------------------------------------------------
// Memory & registers
// ---------------------------------------------------------------------------

fn cmd_peek(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(addr) = args.first().and_then(|t| parse_num(t)) else {
        return json_err(out, "usage: peek <addr> [len]");
    };
    let len = args
        .get(1)
        .and_then(|t| parse_num(t))
        .unwrap_or(1)
        .clamp(1, PEEK_MAX);
    let Some(mem) = rt.debug_memory() else {
        return json_err(out, "no debug support");
    };

    let data: Vec<u64> = (0..len).map(|i| u64::from(mem.peek(addr + i, false))).collect();
    json_ok(
        out,
        fields(json!({ "addr": format!("0x{addr:04x}"), "data": data })),
    )
}

fn cmd_poke(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(addr) = args.first().and_then(|t| parse_num(t)) else {
        return json_err(out, "usage: poke <addr> <byte>...");
    };
    if args.len() < 2 {
        return json_err(out, "usage: poke <addr> <byte>...");
    }
    let Some(mem) = rt.debug_memory() else {
        return json_err(out, "no debug support");
    };

    let mut written = 0u64;
    for token in &args[1..] {
        let Some(value) = parse_num(token) else {
            continue;
        };
        mem.poke(addr + written, value as u8);
        written += 1;
    }
    json_ok(out, fields(json!({ "written": written })))
}

fn cmd_reg(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(cpu) = rt.primary_cpu() else {
        return json_err(out, "no debug support");
    };
    let cpu_type = cpu.cpu_type();

    match args {
        [] => {
            let mut listed = Map::new();
            for n in 0..registers::reg_count(cpu_type) {
                let Some(idx) = registers::reg_by_order(cpu_type, n) else {
                    continue;
                };
                let Some(name) = registers::reg_name(cpu_type, idx) else {
                    continue;
                };
                listed.insert(name.to_string(), json!(cpu.get_register(idx)));
            }
            json_ok(out, fields(json!({ "registers": listed })))
        }
        [name, rest @ ..] => {
            let Some(idx) = registers::reg_from_name(cpu_type, name) else {
                return json_err(out, format_args!("unknown register: {name}"));
            };
            match rest.first() {
                Some(value_token) => {
                    let Some(value) = parse_num(value_token) else {
                        return json_err(out, format_args!("bad value: {value_token}"));
                    };
                    if cpu.set_register(idx, value) {
                        json_ok(out, Map::new())
                    } else {
                        json_err(out, format_args!("failed to set register {name}"))
                    }
                }
                None => {
                    let mut map = Map::new();
                    map.insert((*name).to_string(), json!(cpu.get_register(idx)));
                    json_ok(out, map)
                }
            }
        }
    }
}

fn cmd_regions(rt: &Runtime, out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let regions = match rt.regions() {
        Ok(regions) => regions,
        Err(e) => return json_err(out, e),
    };
    let listed: Vec<Value> = regions
        .iter()
        .map(|m| {
            json!({
                "id": m.id(),
                "description": m.description(),
                "base_address": format!("0x{:x}", m.base_address()),
                "size": m.size(),
                "has_mmap": m.memory_map().is_some(),
            })
        })
        .collect();
    json_ok(out, fields(json!({ "regions": listed })))
}

// ---------------------------------------------------------------------------
// Save states & screenshot
// ---------------------------------------------------------------------------

fn cmd_save(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(slot) = args.first().and_then(|t| t.parse::<i64>().ok()) else {
        return json_err(out, "usage: save <slot>");
    };
    if rt.blocked() {
        return json_err(out, "cannot save state while core thread is blocked");
    }
    match rt.save_state(slot) {
        Ok(_) => json_ok(out, fields(json!({ "slot": slot }))),
        Err(e) => {
            tracing::warn!(slot, error = %e, "save state failed");
            json_err(out, format_args!("save failed for slot {slot}"))
        }
    }
}

fn cmd_load(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(slot) = args.first().and_then(|t| t.parse::<i64>().ok()) else {
        return json_err(out, "usage: load <slot>");
    };
    if rt.blocked() {
        return json_err(out, "cannot load state while core thread is blocked");
    }
    match rt.load_state(slot) {
        Ok(_) => json_ok(out, fields(json!({ "slot": slot }))),
        Err(e) => {
            tracing::warn!(slot, error = %e, "load state failed");
            json_err(out, format_args!("load failed for slot {slot}"))
        }
    }
}

fn cmd_screen(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let path = args.first().copied().unwrap_or("screenshot.png");
    let (frame, width, height) = rt.frame_snapshot();

    let mut rgb = Vec::with_capacity(frame.len() * 3);
    for px in &frame {
        rgb.push((px >> 16) as u8);
        rgb.push((px >> 8) as u8);
        rgb.push(*px as u8);
    }

    let write_png = || -> Result<(), png::EncodingError> {
        let file = std::fs::File::create(path)?;
        let mut encoder = png::Encoder::new(io::BufWriter::new(file), width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&rgb)?;
        Ok(())
    };

    match write_png() {
        Ok(()) => json_ok(
            out,
            fields(json!({ "width": width, "height": height, "path": path })),
        ),
        Err(_) => json_err(out, format_args!("failed to write PNG: {path}")),
    }
}

// ---------------------------------------------------------------------------
// Hex dump
// ---------------------------------------------------------------------------

fn cmd_dump(rt: &Runtime, line: &str, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(&id) = args.first() else {
        return json_err(out, "usage: dump <id> [start size [path]]");
    };
    let mem = match rt.find_region(id) {
        Ok(mem) => mem,
        Err(e) => return json_err(out, e),
    };

    let (start, size) = match (args.get(1), args.get(2)) {
        (Some(s), Some(n)) => {
            let (Some(start), Some(size)) = (parse_num(s), parse_num(n)) else {
                return json_err(out, "usage: dump <id> [start size [path]]");
            };
            (start, size)
        }
        (Some(_), None) => return json_err(out, "usage: dump <id> [start size [path]]"),
        _ => (mem.base_address(), mem.size()),
    };
    if size == 0 {
        return json_err(out, "memory region has unknown size; specify start and size");
    }

    let path = rest_after(line, 4);
    if !path.is_empty() {
        let mut file = std::fs::File::create(path)?;
        do_dump(mem.as_ref(), start, size, &mut file)?;
        json_ok(out, fields(json!({ "path": path })))
    } else {
        do_dump(mem.as_ref(), start, size, out)
    }
}

fn do_dump(mem: &dyn Memory, start: u64, size: u64, out: &mut dyn Write) -> io::Result<()> {
    let end = start + size;
    let map = mem.memory_map().filter(|m| !m.is_empty());

    let bank_width = map.as_ref().map_or(0, |map| {
        let max_bank = map.iter().filter_map(|e| e.bank).max().unwrap_or(-1);
        if max_bank < 0 {
            0
        } else {
            let mut width = 1;
            let mut v = max_bank;
            while v >= 10 {
                width += 1;
                v /= 10;
            }
            width
        }
    });

    let max_addr = end.saturating_sub(1);
    let mut addr_width = 1;
    let mut v = max_addr;
    while v >= 16 {
        addr_width += 1;
        v /= 16;
    }

    let window_start = |addr: u64| {
        map.as_ref()
            .is_some_and(|map| map.iter().any(|e| e.base_addr == addr))
    };
    let bank_for = |addr: u64| {
        map.as_ref().and_then(|map| {
            map.iter()
                .find(|e| addr >= e.base_addr && addr < e.base_addr + e.size)
                .and_then(|e| e.bank)
        })
    };

    let mut first_line = true;
    for addr in start..end {
        let new_line = addr == start || addr % 16 == 0 || window_start(addr);

        if new_line {
            if !first_line {
                writeln!(out)?;
            }
            first_line = false;

            if bank_width > 0 {
                match bank_for(addr) {
                    Some(bank) => write!(out, "{bank:>bank_width$}:")?,
                    None => write!(out, "{:>bank_width$}:", "")?,
                }
            }
            write!(out, "{addr:0addr_width$X}:")?;

            // Column-align mid-row starts.
            let pad = 1 + (addr % 16) as usize * 3;
            write!(out, "{:pad$}", "")?;
        }

        write!(out, "{:02X}", mem.peek(addr, false))?;

        let next = addr + 1;
        if next < end {
            let next_new_line = next % 16 == 0 || window_start(next);
            if !next_new_line {
                write!(out, " ")?;
            }
        }
    }
    if !first_line {
        writeln!(out)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Disassembly
// ---------------------------------------------------------------------------

/// Resolves `@` address markers: strips the marker and appends `[label]`
/// when the resolved address carries one.
fn resolve_addr_markers(rt: &Runtime, system: &dyn System, text: &str, mem_id: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '@' {
            result.push(c);
            continue;
        }
        let hex_start = i + 1;
        let mut hex_end = hex_start;
        while let Some((j, h)) = chars.peek().copied() {
            if h.is_ascii_hexdigit() {
                hex_end = j + h.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if hex_end == hex_start {
            result.push(c);
            continue;
        }

        let digits = &text[hex_start..hex_end];
        result.push_str(digits);
        if let Ok(addr) = u64::from_str_radix(digits, 16)
            && let Some(resolved) = memmap::resolve(system, mem_id, addr)
        {
            let symbols = rt.symbols();
            if let Some(label) = symbols.label(&resolved.region_id, resolved.addr) {
                result.push('[');
                result.push_str(label);
                result.push(']');
            }
        }
    }
    result
}

fn cmd_dis(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(system) = rt.system() else {
        return json_err(out, "no debug support");
    };

    // CPU and range argument. With more than one CPU the first argument
    // must name the CPU; with one it may, but plain ranges also work.
    let (cpu, range_arg): (CpuRef, &str) = if system.cpus().len() > 1 {
        let Some(&cpu_arg) = args.first() else {
            return json_err(out, "usage: dis <cpu> [region.]<start>-<end>");
        };
        let Some(cpu) = rt.find_cpu(cpu_arg) else {
            return json_err(
                out,
                format_args!("unknown cpu: {cpu_arg} (multi-CPU system requires cpu argument)"),
            );
        };
        let Some(&range) = args.get(1) else {
            return json_err(out, "usage: dis <cpu> [region.]<start>-<end>");
        };
        (cpu, range)
    } else {
        match args {
            [maybe_cpu, range, ..] if rt.find_cpu(maybe_cpu).is_some() => {
                (rt.find_cpu(maybe_cpu).unwrap(), *range)
            }
            [range, ..] => {
                let Some(cpu) = rt.primary_cpu() else {
                    return json_err(out, "no cpu available");
                };
                (cpu, *range)
            }
            [] => return json_err(out, "usage: dis [cpu] [region.]<start>-<end>"),
        }
    };

    // Optional "region." prefix, then "start-end" in hex, inclusive.
    let (region_id, range_str) = match range_arg.split_once('.') {
        Some((region, rest)) if !region.is_empty() => (Some(region), rest),
        Some(_) => return json_err(out, format_args!("bad range: {range_arg}")),
        None => (None, range_arg),
    };
    let Some((start_str, end_str)) = range_str.split_once('-') else {
        return json_err(out, format_args!("bad range (expected start-end): {range_arg}"));
    };
    let (Some(start), Some(end)) = (parse_hex(start_str), parse_hex(end_str)) else {
        return json_err(out, format_args!("bad range: {range_arg}"));
    };
    if end < start {
        return json_err(out, "end < start");
    }
    if end - start + 1 > DIS_MAX_BYTES {
        return json_err(out, format_args!("bad range: {range_arg}"));
    }

    let mem: MemoryRef = match region_id {
        Some(id) => match rt.find_region(id) {
            Ok(mem) => mem,
            Err(e) => return json_err(out, e),
        },
        None => match cpu.memory() {
            Some(mem) => mem,
            None => return json_err(out, "unknown memory region: (cpu default)"),
        },
    };

    let pc = registers::pc_index(cpu.cpu_type())
        .map(|idx| cpu.get_register(idx))
        .unwrap_or(u64::MAX);
    let addr_width = if mem.size() <= 0x1_0000 { 4 } else { 8 };

    let mut bytes = vec![0u8; (end - start + 1) as usize];
    mem.peek_range(start, &mut bytes);
    let insns = arret_arch::disassemble(&bytes, start, cpu.cpu_type());

    // Bank column width from the largest bank in range.
    let map = mem.memory_map().filter(|m| !m.is_empty());
    let bank_for = |addr: u64| {
        map.as_ref().and_then(|map| {
            map.iter()
                .find(|e| addr >= e.base_addr && addr < e.base_addr + e.size)
                .and_then(|e| e.bank)
        })
    };
    let bank_width = {
        let max_bank = insns
            .iter()
            .take_while(|insn| insn.address <= end)
            .filter_map(|insn| bank_for(insn.address))
            .max();
        match max_bank {
            Some(max_bank) if max_bank >= 0 => {
                let mut width = 1;
                let mut v = max_bank;
                while v >= 10 {
                    width += 1;
                    v /= 10;
                }
                width
            }
            _ => 0,
        }
    };

    let mem_id = mem.id();
    for insn in &insns {
        if insn.address > end {
            break;
        }

        let resolved = memmap::resolve(system.as_ref(), mem_id, insn.address);

        // Label line above labelled addresses.
        if let Some(resolved) = &resolved {
            let symbols = rt.symbols();
            if let Some(label) = symbols.label(&resolved.region_id, resolved.addr) {
                writeln!(out, "{label}:")?;
            }
        }

        let marker = if insn.address == pc {
            '>'
        } else if pc > insn.address && pc < insn.address + u64::from(insn.length) {
            '~'
        } else {
            ':'
        };

        if bank_width > 0 {
            match bank_for(insn.address) {
                Some(bank) => write!(out, "{bank:>bank_width$}:")?,
                None => write!(out, "{:>bank_width$} ", "")?,
            }
        }

        let text = resolve_addr_markers(rt, system.as_ref(), &insn.text, mem_id);
        write!(
            out,
            "{:0addr_width$X}{marker} {text}",
            insn.address
        )?;

        // First comment line, cropped.
        if let Some(resolved) = &resolved {
            let symbols = rt.symbols();
            if let Some(comment) = symbols.comment(&resolved.region_id, resolved.addr) {
                let first_line = comment.lines().next().unwrap_or("");
                let cropped: String = first_line.chars().take(24).collect();
                let ellipsis = comment.contains('\n') || first_line.chars().count() > 24;
                write!(out, " ; {cropped}{}", if ellipsis { "..." } else { "" })?;
            }
        }

        writeln!(out)?;
        if insn.breaks_flow {
            writeln!(out)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory search
// ---------------------------------------------------------------------------

fn cmd_search(rt: &Runtime, line: &str, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(&sub) = args.first() else {
        return json_err(out, "usage: search reset|filter|list|count ...");
    };

    match sub {
        "reset" => {
            let Some(&region) = args.get(1) else {
                return json_err(out, "usage: search reset <region_id> [size] [alignment]");
            };
            let size = args.get(2).and_then(|t| parse_num(t)).unwrap_or(1) as u32;
            let alignment = args
                .get(3)
                .and_then(|t| parse_num(t))
                .unwrap_or(u64::from(size)) as u32;
            let mem = match rt.find_region(region) {
                Ok(mem) => mem,
                Err(_) => return json_err(out, "search reset failed (bad region or size)"),
            };
            let mut search = rt.search();
            if search.reset(mem, size, alignment) {
                let count = search.count();
                json_ok(out, fields(json!({ "candidates": count })))
            } else {
                json_err(out, "search reset failed (bad region or size)")
            }
        }
        "filter" => {
            if args.len() < 3 {
                return json_err(out, "usage: search filter <op> <value|p>");
            }
            if !rt.search().active() {
                return json_err(out, "no active search (call search reset first)");
            }
            let Some(op) = SearchOp::from_name(args[1]) else {
                return json_err(out, format_args!("unknown op: {}", args[1]));
            };
            let value_token = rest_after(line, 3);
            let value = if value_token.eq_ignore_ascii_case("p") {
                VS_PREV
            } else {
                match parse_num(value_token) {
                    Some(v) => v,
                    None => return json_err(out, format_args!("bad value: {value_token}")),
                }
            };
            let count = rt.search().filter(op, value);
            json_ok(out, fields(json!({ "candidates": count })))
        }
        "list" => {
            let search = rt.search();
            if !search.active() {
                return json_err(out, "no active search");
            }
            let max = args
                .get(1)
                .and_then(|t| parse_num(t))
                .unwrap_or(100)
                .min(10_000) as usize;
            let results: Vec<Value> = search
                .results(max)
                .iter()
                .map(|r| {
                    json!({
                        "addr": format!("0x{:x}", r.addr),
                        "value": r.value,
                        "prev": r.prev,
                    })
                })
                .collect();
            let count = search.count();
            json_ok(
                out,
                fields(json!({ "candidates": count, "results": results })),
            )
        }
        "count" => {
            let search = rt.search();
            if !search.active() {
                return json_err(out, "no active search");
            }
            let count = search.count();
            json_ok(out, fields(json!({ "candidates": count })))
        }
        _ => json_err(out, format_args!("unknown search subcommand: {sub}")),
    }
}

// ---------------------------------------------------------------------------
// CPUs
// ---------------------------------------------------------------------------

fn cmd_cpu(rt: &Runtime, out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(system) = rt.system() else {
        return json_err(out, "no debug support");
    };
    let cpus: Vec<Value> = system
        .cpus()
        .iter()
        .map(|c| {
            json!({
                "id": c.id(),
                "description": c.description(),
                "primary": c.is_main(),
            })
        })
        .collect();
    json_ok(out, fields(json!({ "cpus": cpus })))
}

// ---------------------------------------------------------------------------
// Breakpoints
// ---------------------------------------------------------------------------

/// `bp add [cpu.]<addr> [flags] [condition...]`. The second token is a
/// flags string only when it is made of XRWT letters; anything else starts
/// the condition.
fn parse_bp_add(line: &str, args: &[&str]) -> Option<(String, u64, BpFlags, bool, String)> {
    let addr_token = args.first()?;
    let (cpu_id, addr_str) = match addr_token.split_once('.') {
        Some((cpu, rest)) if !cpu.is_empty() => (cpu.to_string(), rest),
        _ => (String::new(), *addr_token),
    };
    let address = parse_hex(addr_str)?;

    let mut flags = BpFlags::EXECUTE;
    let mut temporary = false;
    let mut condition = String::new();

    if let Some(&flags_token) = args.get(1) {
        let is_flags = flags_token
            .chars()
            .all(|c| matches!(c.to_ascii_uppercase(), 'X' | 'R' | 'W' | 'T'));
        if is_flags {
            flags = BpFlags::empty();
            for c in flags_token.chars() {
                match c.to_ascii_uppercase() {
                    'X' => flags |= BpFlags::EXECUTE,
                    'R' => flags |= BpFlags::READ,
                    'W' => flags |= BpFlags::WRITE,
                    'T' => temporary = true,
                    _ => {}
                }
            }
            // Everything after the flags token is the condition.
            condition = rest_after(line, 4).to_string();
        } else {
            // Not a flags string: the condition starts right here.
            condition = rest_after(line, 3).to_string();
        }
    }

    Some((cpu_id, address, flags, temporary, condition))
}

fn cmd_bp(rt: &Runtime, line: &str, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(&sub) = args.first() else {
        return json_err(out, "usage: bp add|delete|enable|disable|list|clear|save|load ...");
    };

    match sub {
        "add" => {
            let Some((cpu_id, address, flags, temporary, condition)) =
                parse_bp_add(line, &args[1..])
            else {
                return json_err(out, "usage: bp add [cpu.]<addr> [flags] [condition...]");
            };
            match rt.bp_add(address, flags, true, temporary, &condition, &cpu_id) {
                Ok(id) => json_ok(out, fields(json!({ "id": id }))),
                Err(e) => json_err(out, e),
            }
        }
        "delete" => {
            let Some(id) = args.get(1).and_then(|t| t.parse::<u32>().ok()) else {
                return json_err(out, "usage: bp delete <id>");
            };
            match rt.bp_delete(id) {
                Ok(true) => json_ok(out, Map::new()),
                Ok(false) => json_err(out, format_args!("breakpoint {id} not found")),
                Err(e) => json_err(out, e),
            }
        }
        "enable" | "disable" => {
            let enabled = sub == "enable";
            let Some(id) = args.get(1).and_then(|t| t.parse::<u32>().ok()) else {
                return json_err(out, format_args!("usage: bp {sub} <id>"));
            };
            match rt.bp_enable(id, enabled) {
                Ok(true) => json_ok(out, Map::new()),
                Ok(false) => json_err(
                    out,
                    format_args!("breakpoint {id} not found or subscription failed"),
                ),
                Err(e) => json_err(out, e),
            }
        }
        "list" => {
            let listed: Vec<Value> = rt
                .bp_list()
                .iter()
                .map(|bp| {
                    json!({
                        "id": bp.id,
                        "address": format!("0x{:04x}", bp.address),
                        "enabled": bp.enabled,
                        "temporary": bp.temporary,
                        "flags": bp.flags.display(),
                        "condition": bp.condition.clone(),
                        "cpu": bp.cpu_id.clone(),
                    })
                })
                .collect();
            json_ok(out, fields(json!({ "breakpoints": listed })))
        }
        "clear" => match rt.bp_clear() {
            Ok(()) => json_ok(out, Map::new()),
            Err(e) => json_err(out, e),
        },
        "save" => {
            let path = bp_file_path(rt, line);
            let Some(path) = path else {
                return json_err(out, "no content loaded and no path given");
            };
            match rt.bp_save(&path) {
                Ok(()) => json_ok(out, fields(json!({ "path": path.display().to_string() }))),
                Err(_) => json_err(
                    out,
                    format_args!("failed to save breakpoints to {}", path.display()),
                ),
            }
        }
        "load" => {
            let path = bp_file_path(rt, line);
            let Some(path) = path else {
                return json_err(out, "no content loaded and no path given");
            };
            match rt.bp_load(&path) {
                Ok(count) => json_ok(
                    out,
                    fields(json!({ "path": path.display().to_string(), "count": count })),
                ),
                Err(_) => json_err(
                    out,
                    format_args!("failed to load breakpoints from {}", path.display()),
                ),
            }
        }
        _ => json_err(out, format_args!("unknown bp subcommand: {sub}")),
    }
}

fn bp_file_path(rt: &Runtime, line: &str) -> Option<PathBuf> {
    let given = rest_after(line, 2);
    if !given.is_empty() {
        return Some(PathBuf::from(given));
    }
    let base = rt.rom_base()?;
    let mut path = base.into_os_string();
    path.push(".bp");
    Some(PathBuf::from(path))
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// `<hex>`, `region.<hex>`, or `region.<bank_hex>:<hex>`.
struct AddrSpec {
    region: String,
    addr: u64,
    bank: Option<i64>,
}

fn parse_addrspec(rt: &Runtime, spec: &str) -> Option<AddrSpec> {
    let (region, rest) = match spec.split_once('.') {
        Some((region, rest)) if !region.is_empty() => (region.to_string(), rest),
        Some(_) => return None,
        None => {
            let region = rt.debug_memory()?.id().to_string();
            (region, spec)
        }
    };

    match rest.split_once(':') {
        Some((bank_str, addr_str)) => {
            let bank = i64::from_str_radix(bank_str, 16).ok()?;
            let addr = parse_hex(addr_str)?;
            Some(AddrSpec {
                region,
                addr,
                bank: Some(bank),
            })
        }
        None => {
            let addr = parse_hex(rest)?;
            Some(AddrSpec {
                region,
                addr,
                bank: None,
            })
        }
    }
}

fn cmd_sym(rt: &Runtime, line: &str, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(&kind) = args.first() else {
        return json_err(out, "usage: sym label|comment get|set|delete ... | sym list");
    };

    if kind == "list" {
        let listed: Vec<Value> = rt
            .symbols()
            .list()
            .into_iter()
            .map(|s| {
                let mut object = fields(json!({ "region": s.region, "addr": s.addr }));
                if let Some(label) = s.label {
                    object.insert("label".into(), json!(label));
                }
                if let Some(comment) = s.comment {
                    object.insert("comment".into(), json!(comment));
                }
                Value::Object(object)
            })
            .collect();
        return json_ok(out, fields(json!({ "symbols": listed })));
    }

    if kind != "label" && kind != "comment" {
        return json_err(out, format_args!("unknown sym subcommand: {kind}"));
    }
    let is_label = kind == "label";

    let (Some(&action), Some(&spec)) = (args.get(1), args.get(2)) else {
        return json_err(
            out,
            format_args!("usage: sym {kind} get|set|delete <addrspec> [value]"),
        );
    };

    let Some(parsed) = parse_addrspec(rt, spec) else {
        return json_err(out, format_args!("bad addrspec: {spec}"));
    };

    let Some(system) = rt.system() else {
        return json_err(out, "no debug support");
    };
    let resolved = match parsed.bank {
        Some(bank) => memmap::resolve_bank(system.as_ref(), &parsed.region, parsed.addr, bank),
        None => memmap::resolve(system.as_ref(), &parsed.region, parsed.addr),
    };
    let Some(resolved) = resolved else {
        return if let Some(bank) = parsed.bank {
            json_err(
                out,
                format_args!(
                    "cannot resolve {} bank 0x{bank:x} at 0x{:x}",
                    parsed.region, parsed.addr
                ),
            )
        } else if memmap::find_memory_by_id(system.as_ref(), &parsed.region).is_none() {
            json_err(out, format_args!("unknown memory region: {}", parsed.region))
        } else {
            json_err(
                out,
                format_args!("cycle detected resolving {}:0x{:x}", parsed.region, parsed.addr),
            )
        };
    };

    match action {
        "get" => {
            let symbols = rt.symbols();
            if is_label {
                let label = symbols.label(&resolved.region_id, resolved.addr);
                json_ok(out, fields(json!({ "label": label })))
            } else {
                let comment = symbols.comment(&resolved.region_id, resolved.addr);
                json_ok(out, fields(json!({ "comment": comment })))
            }
        }
        "delete" => {
            let mut symbols = rt.symbols();
            if is_label {
                symbols.delete_label(&resolved.region_id, resolved.addr);
            } else {
                symbols.delete_comment(&resolved.region_id, resolved.addr);
            }
            json_ok(out, Map::new())
        }
        "set" => {
            let value = rest_after(line, 4);
            if value.is_empty() {
                return json_err(
                    out,
                    format_args!("usage: sym {kind} set <addrspec> <value>"),
                );
            }
            let mut symbols = rt.symbols();
            if is_label {
                if let Err(e) = symbols.set_label(&resolved.region_id, resolved.addr, value) {
                    return json_err(out, e);
                }
            } else {
                symbols.set_comment(&resolved.region_id, resolved.addr, value);
            }
            json_ok(out, Map::new())
        }
        _ => json_err(out, format_args!("unknown sym {kind} subcommand: {action}")),
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

fn cmd_trace(rt: &Runtime, line: &str, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(&sub) = args.first() else {
        return json_err(out, "usage: trace on|off|status|cpu|registers|indent|sys ...");
    };

    match sub {
        "on" => {
            let path = rest_after(line, 2);
            let path = (!path.is_empty()).then(|| Path::new(path));
            match rt.trace_start(path) {
                Ok(()) => {
                    let mut map = fields(json!({ "tracing": true }));
                    if let Some(path) = path {
                        map.insert("file".into(), json!(path.display().to_string()));
                    }
                    json_ok(out, map)
                }
                Err(_) => json_err(out, "failed to start trace"),
            }
        }
        "off" => {
            let lines = rt.trace_total_lines();
            rt.trace_stop();
            json_ok(out, fields(json!({ "tracing": false, "lines": lines })))
        }
        "status" => json_ok(
            out,
            fields(json!({
                "tracing": rt.trace_active(),
                "lines": rt.trace_total_lines(),
                "registers": rt.trace_registers(),
                "indent": rt.trace_indent(),
                "file": rt
                    .trace_file_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            })),
        ),
        "cpu" => {
            let (Some(&name), Some(&state)) = (args.get(1), args.get(2)) else {
                return json_err(out, "usage: trace cpu <name> on|off");
            };
            let enable = match state {
                "on" => true,
                "off" => false,
                _ => return json_err(out, "usage: trace cpu <name> on|off"),
            };
            match rt.trace_cpu_enable(name, enable) {
                Ok(true) => json_ok(out, fields(json!({ "cpu": name, "enabled": enable }))),
                Ok(false) => json_err(out, format_args!("unknown cpu: {name}")),
                Err(e) => json_err(out, e),
            }
        }
        "registers" | "indent" => {
            let enable = match args.get(1) {
                Some(&"on") => true,
                Some(&"off") => false,
                _ => return json_err(out, format_args!("usage: trace {sub} on|off")),
            };
            if sub == "registers" {
                rt.trace_set_registers(enable);
                json_ok(out, fields(json!({ "registers": rt.trace_registers() })))
            } else {
                rt.trace_set_indent(enable);
                json_ok(out, fields(json!({ "indent": rt.trace_indent() })))
            }
        }
        "read" => {
            let max = args
                .get(1)
                .and_then(|t| parse_num(t))
                .unwrap_or(256)
                .min(10_000) as usize;
            let lines = rt.trace_read_new(max);
            json_ok(out, fields(json!({ "lines": lines })))
        }
        "sys" => match args.get(1) {
            Some(&"list") | None => {
                let options: Vec<Value> = rt
                    .trace_sys_options()
                    .iter()
                    .enumerate()
                    .map(|(index, option)| {
                        json!({
                            "index": index,
                            "label": option.label,
                            "enabled": rt.trace_sys_option_enabled(index),
                        })
                    })
                    .collect();
                json_ok(out, fields(json!({ "options": options })))
            }
            Some(&state @ ("on" | "off")) => {
                let Some(index) = args.get(2).and_then(|t| t.parse::<usize>().ok()) else {
                    return json_err(out, "usage: trace sys on|off <index>");
                };
                match rt.trace_sys_option_enable(index, state == "on") {
                    Ok(()) => json_ok(
                        out,
                        fields(json!({ "index": index, "enabled": state == "on" })),
                    ),
                    Err(e) => json_err(out, e),
                }
            }
            Some(other) => json_err(out, format_args!("unknown trace sys subcommand: {other}")),
        },
        _ => json_err(out, format_args!("unknown trace subcommand: {sub}")),
    }
}

// ---------------------------------------------------------------------------
// Stack trace
// ---------------------------------------------------------------------------

fn cmd_stack(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    if !rt.has_debug() {
        return json_err(out, "no debug support");
    }
    let Some(cpu) = rt.primary_cpu() else {
        return json_err(out, "no debug support");
    };
    let Some(unwind) = arret_arch::arch_for_cpu(cpu.cpu_type()).and_then(|a| a.stack_trace)
    else {
        return json_err(out, "no stack trace support for this cpu");
    };
    let max_depth = args
        .first()
        .and_then(|t| parse_num(t))
        .unwrap_or(16)
        .clamp(1, 256) as usize;

    let trace = unwind(cpu.as_ref(), max_depth);
    let frames: Vec<Value> = trace
        .frames
        .iter()
        .map(|f| {
            let mut object = fields(json!({
                "pc": format!("0x{:08x}", f.pc),
                "sp": format!("0x{:08x}", f.sp),
            }));
            if let Some(func) = f.func_addr {
                object.insert("func".into(), json!(format!("0x{func:08x}")));
            }
            Value::Object(object)
        })
        .collect();
    json_ok(
        out,
        fields(json!({
            "status": format!("{:?}", trace.status),
            "frames": frames,
        })),
    )
}

// ---------------------------------------------------------------------------
// GPU capture
// ---------------------------------------------------------------------------

fn cmd_capture(rt: &Runtime, args: &[&str], out: &mut dyn Write) -> io::Result<()> {
    let Some(&sub) = args.first() else {
        return json_err(out, "usage: capture start|stop|status|list|dump ...");
    };

    match sub {
        "start" => match rt.capture_start() {
            Ok(()) => json_ok(out, fields(json!({ "capturing": true }))),
            Err(e) => json_err(out, e),
        },
        "stop" => match rt.capture_stop() {
            Ok(()) => {
                let events = rt.capture().map_or(0, |c| c.event_count());
                json_ok(out, fields(json!({ "capturing": false, "events": events })))
            }
            Err(e) => json_err(out, e),
        },
        "status" => {
            let Some(capture) = rt.capture() else {
                return json_err(out, "no GPU capture on this system");
            };
            json_ok(
                out,
                fields(json!({
                    "capturing": capture.active(),
                    "events": capture.event_count(),
                    "compressed_bytes": capture.compressed_bytes(),
                })),
            )
        }
        "list" => {
            let Some(capture) = rt.capture() else {
                return json_err(out, "no GPU capture on this system");
            };
            let max = args
                .get(1)
                .and_then(|t| parse_num(t))
                .unwrap_or(100)
                .min(10_000) as usize;

            let inner = capture.events();
            let listed: Vec<Value> = inner
                .events()
                .iter()
                .take(max)
                .enumerate()
                .map(|(index, event)| match event.kind {
                    CaptureEventKind::FrameBoundary => json!({
                        "index": index,
                        "frame": event.frame_number,
                    }),
                    CaptureEventKind::Command => {
                        let words = &event.words[..event.word_count];
                        let decoded = if event.port == 0 {
                            decode_gp0(words)
                        } else {
                            decode_gp1(words)
                        };
                        let mut object = fields(json!({
                            "index": index,
                            "port": event.port,
                            "source": event.source,
                            "pc": format!("0x{:08x}", event.pc),
                            "decoded": decoded,
                            "keyframe": event.is_keyframe,
                        }));
                        if let Some(rect) = event.rect {
                            object.insert(
                                "rect".into(),
                                json!([rect.x, rect.y, rect.w, rect.h]),
                            );
                        }
                        Value::Object(object)
                    }
                })
                .collect();
            drop(inner);
            json_ok(out, fields(json!({ "events": listed })))
        }
        "dump" => {
            let Some(capture) = rt.capture() else {
                return json_err(out, "no GPU capture on this system");
            };
            let (Some(index), Some(&path)) = (
                args.get(1).and_then(|t| t.parse::<usize>().ok()),
                args.get(2),
            ) else {
                return json_err(out, "usage: capture dump <index> <path>");
            };
            let mut vram = vec![0u8; arret_abi::psx::VRAM_BYTES];
            if !capture.reconstruct(index, &mut vram) {
                return json_err(out, format_args!("cannot reconstruct event {index}"));
            }
            std::fs::write(path, &vram)?;
            json_ok(out, fields(json!({ "index": index, "path": path })))
        }
        _ => json_err(out, format_args!("unknown capture subcommand: {sub}")),
    }
}
