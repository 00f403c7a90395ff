//! Command protocol tests against the scripted demo core.

use std::io::Write;
use std::time::{Duration, Instant};

use serde_json::Value;

use arret_backend::testing::DemoCore;
use arret_backend::{Runtime, RuntimeOptions};
use arret_proto::{CmdServer, Dispatcher, send_command};

/// Counts up in A, mirrors it to 0xC000, and bumps B in a subroutine.
const PROGRAM: [u8; 18] = [
    0x3E, 0x00, // 0100: LD A,$00
    0x3C, // 0102: INC A
    0xEA, 0x00, 0xC0, // 0103: LD ($C000),A
    0xCD, 0x10, 0x01, // 0106: CALL $0110
    0xC3, 0x02, 0x01, // 0109: JP $0102
    0x00, 0x00, 0x00, 0x00, // padding
    0x04, // 0110: INC B
    0xC9, // 0111: RET
];

fn runtime() -> (Runtime, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let rom = dir.path().join("demo.gb");
    let mut file = std::fs::File::create(&rom).unwrap();
    file.write_all(&PROGRAM).unwrap();
    drop(file);

    let runtime = Runtime::new(Box::new(DemoCore::new()), RuntimeOptions::default());
    runtime.load_content(&rom).unwrap();
    (runtime, dir)
}

fn process(rt: &Runtime, line: &str) -> String {
    let dispatcher = Dispatcher::new();
    let mut out = Vec::new();
    dispatcher.process(rt, line, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn process_json(rt: &Runtime, line: &str) -> Value {
    let response = process(rt, line);
    serde_json::from_str(response.lines().next().unwrap_or("")).unwrap()
}

#[test]
fn info_reports_core_and_debug() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "info");
    assert_eq!(v["ok"], true);
    assert_eq!(v["core"], "ArretDemo");
    assert_eq!(v["debug"], true);
    assert_eq!(v["width"], 160);
    assert_eq!(v["height"], 144);
}

#[test]
fn unknown_command_is_an_error() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "frobnicate");
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"], "unknown command: frobnicate");
}

#[test]
fn hook_handles_frontend_verbs() {
    let (rt, _dir) = runtime();
    let mut dispatcher = Dispatcher::new();
    dispatcher.set_hook(Box::new(|_rt, verb, _line, out| {
        if verb == "custom" {
            writeln!(out, "{{\"ok\":true,\"custom\":1}}").unwrap();
            true
        } else {
            false
        }
    }));

    let mut out = Vec::new();
    dispatcher.process(&rt, "custom", &mut out).unwrap();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["custom"], 1);

    let mut out = Vec::new();
    dispatcher.process(&rt, "other", &mut out).unwrap();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["ok"], false);
}

#[test]
fn peek_and_poke_round_trip() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "poke 0xD000 0x12 0x34 0x56");
    assert_eq!(v["ok"], true);
    assert_eq!(v["written"], 3);

    let v = process_json(&rt, "peek 0xD000 3");
    assert_eq!(v["addr"], "0xd000");
    assert_eq!(v["data"], serde_json::json!([0x12, 0x34, 0x56]));
}

#[test]
fn peek_requires_an_address() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "peek");
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"], "usage: peek <addr> [len]");
}

#[test]
fn reg_reads_and_writes() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "reg");
    assert_eq!(v["registers"]["pc"], 0x0100);
    assert_eq!(v["registers"]["sp"], 0xFFFE);

    let v = process_json(&rt, "reg hl 0xBEEF");
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "reg hl");
    assert_eq!(v["hl"], 0xBEEF);

    let v = process_json(&rt, "reg nope");
    assert_eq!(v["error"], "unknown register: nope");
}

#[test]
fn regions_lists_the_memory() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "regions");
    let regions = v["regions"].as_array().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0]["id"], "mem");
    assert_eq!(regions[0]["size"], 0x10000);
    assert_eq!(regions[0]["has_mmap"], false);
}

#[test]
fn cpu_lists_the_primary() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "cpu");
    assert_eq!(v["cpus"][0]["id"], "sm83");
    assert_eq!(v["cpus"][0]["primary"], true);
}

#[test]
fn run_counts_frames() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "run 2");
    assert_eq!(v["ok"], true);
    assert_eq!(v["frames"], 2);
    rt.stop_core_thread();
}

#[test]
fn run_stops_at_breakpoint_and_resumes() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "bp add 0106");
    assert_eq!(v["ok"], true);
    let id = v["id"].as_u64().unwrap();

    let v = process_json(&rt, "run 50");
    assert_eq!(v["breakpoint"], id);
    assert_eq!(v["frames"], 1);

    // Resuming suppresses the immediate re-hit but catches the next pass.
    let v = process_json(&rt, "run 50");
    assert_eq!(v["breakpoint"], id);
    rt.stop_core_thread();
}

#[test]
fn step_advances_pc() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "s");
    assert_eq!(v["ok"], true);
    assert_eq!(rt.debug_pc(), 0x0102);
    rt.stop_core_thread();
}

#[test]
fn bp_lifecycle_over_the_wire() {
    let (rt, _dir) = runtime();

    let v = process_json(&rt, "bp add 0150 XW cond stuff");
    let id = v["id"].as_u64().unwrap();

    let v = process_json(&rt, "bp list");
    let bps = v["breakpoints"].as_array().unwrap();
    assert_eq!(bps.len(), 1);
    assert_eq!(bps[0]["id"], id);
    assert_eq!(bps[0]["address"], "0x0150");
    assert_eq!(bps[0]["flags"], "X-W");
    assert_eq!(bps[0]["condition"], "cond stuff");
    assert_eq!(bps[0]["enabled"], true);

    let v = process_json(&rt, &format!("bp disable {id}"));
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "bp list");
    assert_eq!(v["breakpoints"][0]["enabled"], false);

    let v = process_json(&rt, &format!("bp delete {id}"));
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "bp list");
    assert!(v["breakpoints"].as_array().unwrap().is_empty());

    let v = process_json(&rt, "bp delete 42");
    assert_eq!(v["error"], "breakpoint 42 not found");
}

#[test]
fn bp_save_and_load_round_trip() {
    let (rt, dir) = runtime();
    process_json(&rt, "bp add 0103 X");
    process_json(&rt, "bp add 0150 RW");

    let path = dir.path().join("saved.bp");
    let v = process_json(&rt, &format!("bp save {}", path.display()));
    assert_eq!(v["ok"], true);

    process_json(&rt, "bp clear");
    let v = process_json(&rt, &format!("bp load {}", path.display()));
    assert_eq!(v["count"], 2);
}

#[test]
fn sym_label_set_get_delete() {
    let (rt, _dir) = runtime();

    let v = process_json(&rt, "sym label set 0102 loop_top");
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "sym label get 0102");
    assert_eq!(v["label"], "loop_top");

    let v = process_json(&rt, "sym label set 0102 not valid");
    assert_eq!(
        v["error"],
        "invalid label: must match [a-zA-Z_][a-zA-Z0-9_]*"
    );

    let v = process_json(&rt, "sym comment set 0102 counter loop");
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "sym list");
    let syms = v["symbols"].as_array().unwrap();
    assert_eq!(syms.len(), 1);
    assert_eq!(syms[0]["region"], "mem");
    assert_eq!(syms[0]["addr"], 0x0102);
    assert_eq!(syms[0]["label"], "loop_top");
    assert_eq!(syms[0]["comment"], "counter loop");

    let v = process_json(&rt, "sym label delete 0102");
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "sym label get 0102");
    assert_eq!(v["label"], Value::Null);
}

#[test]
fn dis_resolves_labels_and_markers() {
    let (rt, _dir) = runtime();
    process_json(&rt, "sym label set 0102 loop_top");

    let listing = process(&rt, "dis 0100-010B");
    let lines: Vec<&str> = listing.lines().collect();

    // PC marker on the first instruction.
    assert_eq!(lines[0], "0100> LD A,$00");
    // Label line above the labelled address.
    assert!(lines.contains(&"loop_top:"));
    // The @-marked operand resolves to the label.
    assert!(lines.iter().any(|l| l.contains("JP $0102[loop_top]")));
    // Flow-breaking instruction gets a blank separator.
    let jp_idx = lines
        .iter()
        .position(|l| l.contains("JP $0102"))
        .unwrap();
    assert_eq!(lines.get(jp_idx + 1), Some(&""));
}

#[test]
fn dis_rejects_bad_ranges() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "dis 0200-0100");
    assert_eq!(v["error"], "end < start");
    let v = process_json(&rt, "dis zzz");
    assert_eq!(v["ok"], false);
}

#[test]
fn dump_streams_hex() {
    let (rt, _dir) = runtime();
    let text = process(&rt, "dump mem 0x100 8");
    assert_eq!(text.trim_end(), "100: 3E 00 3C EA 00 C0 CD 10");
}

#[test]
fn search_narrows_candidates() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "search reset mem 1 1");
    assert_eq!(v["candidates"], 0x10000);

    // Only the opcode bytes equal 0xEA.
    let v = process_json(&rt, "search filter eq 0xEA");
    assert_eq!(v["candidates"], 1);

    let v = process_json(&rt, "search list");
    assert_eq!(v["results"][0]["addr"], "0x103");
    assert_eq!(v["results"][0]["value"], 0xEA);

    let v = process_json(&rt, "search count");
    assert_eq!(v["candidates"], 1);
}

#[test]
fn search_requires_session() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "search count");
    assert_eq!(v["error"], "no active search");
}

#[test]
fn trace_status_round_trip() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "trace status");
    assert_eq!(v["tracing"], false);

    let v = process_json(&rt, "trace on");
    assert_eq!(v["tracing"], true);

    let v = process_json(&rt, "trace registers on");
    assert_eq!(v["registers"], true);

    let v = process_json(&rt, "trace off");
    assert_eq!(v["tracing"], false);
}

#[test]
fn trace_read_drains_the_ring() {
    let (rt, _dir) = runtime();
    process_json(&rt, "trace on");
    process_json(&rt, "run 1");
    process_json(&rt, "trace off");

    let v = process_json(&rt, "trace read 8");
    let lines = v["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 8);
    assert!(lines[0].as_str().unwrap().contains("LD A,$00"));
    rt.stop_core_thread();
}

#[test]
fn stack_requires_an_unwinder() {
    let (rt, _dir) = runtime();
    let v = process_json(&rt, "stack");
    assert_eq!(v["error"], "no stack trace support for this cpu");
}

#[test]
fn save_load_state_verbs() {
    let (rt, _dir) = runtime();
    process_json(&rt, "run 1");
    let v = process_json(&rt, "save 0");
    assert_eq!(v["ok"], true);
    assert_eq!(v["slot"], 0);
    let v = process_json(&rt, "load 0");
    assert_eq!(v["ok"], true);
    let v = process_json(&rt, "load 7");
    assert_eq!(v["error"], "load failed for slot 7");
    rt.stop_core_thread();
}

#[test]
fn screen_writes_png() {
    let (rt, dir) = runtime();
    let path = dir.path().join("shot.png");
    let v = process_json(&rt, &format!("screen {}", path.display()));
    assert_eq!(v["ok"], true);
    assert_eq!(v["width"], 160);
    assert_eq!(v["height"], 144);
    let data = std::fs::read(&path).unwrap();
    assert_eq!(&data[1..4], b"PNG");
}

#[test]
fn quit_stops_the_runtime() {
    let (rt, _dir) = runtime();
    assert!(rt.running());
    let v = process_json(&rt, "quit");
    assert_eq!(v["ok"], true);
    assert!(!rt.running());
}

#[test]
fn tcp_round_trip() {
    let (rt, _dir) = runtime();
    let mut server = CmdServer::bind(0).unwrap();
    let port = server.port();

    let client = std::thread::spawn(move || send_command("info", port).unwrap());

    let dispatcher = Dispatcher::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !client.is_finished() {
        assert!(Instant::now() < deadline, "client never finished");
        server.poll(&rt, &dispatcher);
        std::thread::sleep(Duration::from_millis(1));
    }

    let response = client.join().unwrap();
    let v: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(v["ok"], true);
    assert_eq!(v["core"], "ArretDemo");

    server.shutdown();
}
