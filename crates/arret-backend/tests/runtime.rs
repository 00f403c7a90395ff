//! End-to-end runtime tests against the scripted demo core.

use std::io::Write;
use std::time::{Duration, Instant};

use arret_backend::breakpoint::BpFlags;
use arret_backend::testing::DemoCore;
use arret_backend::{CoreState, Runtime, RuntimeOptions, StepRequest};

use arret_abi::{Cpu, Memory, lr35902};

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

fn runtime_with_program() -> (Runtime, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let rom = dir.path().join("demo.gb");
    let mut file = std::fs::File::create(&rom).unwrap();
    file.write_all(&PROGRAM).unwrap();
    drop(file);

    let core = DemoCore::new();
    let runtime = Runtime::new(Box::new(core), RuntimeOptions::default());
    runtime.load_content(&rom).unwrap();
    (runtime, dir)
}

#[test]
fn debug_handshake_succeeds() {
    let (runtime, _dir) = runtime_with_program();
    assert!(runtime.has_debug());
    let system = runtime.system().unwrap();
    assert_eq!(system.description(), "gb");
    assert_eq!(runtime.primary_cpu().unwrap().id(), "sm83");
    assert_eq!(runtime.debug_pc(), 0x0100);
}

#[test]
fn execution_breakpoint_halts_cleanly() {
    let (runtime, _dir) = runtime_with_program();
    let id = runtime
        .bp_add(0x0106, BpFlags::EXECUTE, true, false, "", "")
        .unwrap();

    runtime.run_frame();
    assert_eq!(runtime.bp_hit(), Some(id));
    assert_eq!(runtime.debug_pc(), 0x0106);
}

#[test]
fn skip_map_prevents_immediate_refire_but_not_progress() {
    let (runtime, _dir) = runtime_with_program();
    let cpu = runtime.primary_cpu().unwrap();
    let id = runtime
        .bp_add(0x0106, BpFlags::EXECUTE, true, false, "", "")
        .unwrap();

    runtime.run_frame();
    assert_eq!(runtime.bp_hit(), Some(id));
    let a_at_first_hit = cpu.get_register(lr35902::A);

    // Resume: skip suppresses the re-fire at 0x0106, the loop comes back
    // around, and the breakpoint fires again with the program advanced.
    runtime.set_skip();
    runtime.ack_bp_hit();
    runtime.run_frame();

    assert_eq!(runtime.bp_hit(), Some(id));
    assert_eq!(runtime.debug_pc(), 0x0106);
    assert!(cpu.get_register(lr35902::A) > a_at_first_hit);
}

#[test]
fn memory_watchpoint_reports_write() {
    let (runtime, _dir) = runtime_with_program();
    let id = runtime
        .bp_add(0xC000, BpFlags::WRITE, true, false, "", "")
        .unwrap();

    runtime.run_frame();
    assert_eq!(runtime.bp_hit(), Some(id));
    // Halted right after the store instruction.
    assert_eq!(runtime.debug_pc(), 0x0106);
}

#[test]
fn temporary_breakpoint_deletes_after_flush() {
    let (runtime, _dir) = runtime_with_program();
    let id = runtime
        .bp_add(0x0106, BpFlags::EXECUTE, true, true, "", "")
        .unwrap();

    runtime.run_frame();
    assert_eq!(runtime.bp_hit(), Some(id));
    // Still present until the main loop drains deferred deletes.
    assert_eq!(runtime.bp_count(), 1);

    runtime.bp_flush_deferred();
    assert_eq!(runtime.bp_count(), 0);
}

#[test]
fn step_in_advances_one_instruction() {
    let (runtime, _dir) = runtime_with_program();
    assert!(runtime.step_begin(StepRequest::In));
    runtime.run_frame();
    assert!(runtime.step_complete());
    runtime.step_end();
    // LD A,$00 at 0x0100 is two bytes.
    assert_eq!(runtime.debug_pc(), 0x0102);
}

#[test]
fn consecutive_steps_walk_the_program() {
    let (runtime, _dir) = runtime_with_program();
    let expected = [0x0102u64, 0x0103, 0x0106, 0x0110];
    for pc in expected {
        assert!(runtime.step_begin(StepRequest::In));
        runtime.run_frame();
        assert!(runtime.step_complete(), "step to {pc:#06x} did not fire");
        runtime.step_end();
        assert_eq!(runtime.debug_pc(), pc);
    }
}

#[test]
fn blocked_core_thread_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let rom = dir.path().join("demo.gb");
    std::fs::write(&rom, PROGRAM).unwrap();

    let core = DemoCore::new();
    // Force the thread-blocking pause path.
    core.set_can_halt(false);
    let runtime = Runtime::new(Box::new(core), RuntimeOptions::default());
    runtime.load_content(&rom).unwrap();

    let id = runtime
        .bp_add(0x0106, BpFlags::EXECUTE, true, false, "", "")
        .unwrap();

    runtime.start_core_thread();
    assert!(runtime.run_frame_async());

    let deadline = Instant::now() + Duration::from_secs(5);
    while !runtime.blocked() {
        assert!(Instant::now() < deadline, "core never blocked");
        std::thread::sleep(Duration::from_micros(100));
    }
    assert_eq!(runtime.bp_hit(), Some(id));
    assert_eq!(runtime.core_state(), CoreState::Blocked);

    // Resume and let the interrupted frame drain.
    runtime.set_skip();
    runtime.ack_bp_hit();
    runtime.resume_blocked();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = runtime.core_state();
        if state == CoreState::Done || state == CoreState::Idle || state == CoreState::Blocked {
            break;
        }
        assert!(Instant::now() < deadline, "frame never settled");
        std::thread::sleep(Duration::from_micros(100));
    }

    runtime.stop_core_thread();
}

#[test]
fn trace_logs_disassembled_lines() {
    let (runtime, _dir) = runtime_with_program();
    runtime.trace_start(None).unwrap();
    runtime.run_frame();
    runtime.trace_stop();

    let lines = runtime.trace_read_new(4096);
    assert!(!lines.is_empty());
    assert!(lines.iter().any(|l| l.contains("LD A,$00")));
    assert!(lines.iter().any(|l| l.contains("JP $0109") || l.contains("JP $0102")));
    // Markers are stripped for trace output.
    assert!(lines.iter().all(|l| !l.contains('@')));

    // The counter only moves while tracing is active.
    let total = runtime.trace_total_lines();
    runtime.run_frame();
    assert_eq!(runtime.trace_total_lines(), total);
}

#[test]
fn trace_register_column() {
    let (runtime, _dir) = runtime_with_program();
    runtime.trace_set_registers(true);
    runtime.trace_start(None).unwrap();
    runtime.run_frame();
    runtime.trace_stop();

    let lines = runtime.trace_read_new(16);
    assert!(lines[0].contains(" ; "));
    assert!(lines[0].contains("AF="));
    assert!(lines[0].contains("SP=FFFE"));
    // PC is excluded from the register column.
    assert!(!lines[0].contains("PC="));
}

#[test]
fn save_and_load_state_round_trip() {
    let (runtime, _dir) = runtime_with_program();
    runtime.run_frame();
    let saved_pc = runtime.debug_pc();
    runtime.save_state(0).unwrap();

    runtime.run_frame();
    runtime.load_state(0).unwrap();
    assert_eq!(runtime.debug_pc(), saved_pc);
}

#[test]
fn save_state_rejects_bad_slot() {
    let (runtime, _dir) = runtime_with_program();
    assert!(runtime.save_state(-1).is_err());
    assert!(runtime.save_state(10).is_err());
}

#[test]
fn breakpoints_autopersist_with_content() {
    let (runtime, dir) = runtime_with_program();
    runtime
        .bp_add(0x0103, BpFlags::EXECUTE, true, false, "", "")
        .unwrap();
    let bp_file = dir.path().join("demo.bp");
    assert!(bp_file.exists());
    let contents = std::fs::read_to_string(&bp_file).unwrap();
    assert!(contents.contains("0103 X"));
}

#[test]
fn peek_poke_through_debug_memory() {
    let (runtime, _dir) = runtime_with_program();
    let mem = runtime.debug_memory().unwrap();
    assert!(mem.poke(0xD000, 0x42));
    assert_eq!(mem.peek(0xD000, false), 0x42);
}

#[test]
fn regions_enumerate_the_system() {
    let (runtime, _dir) = runtime_with_program();
    let regions = runtime.regions().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].id(), "mem");
    assert!(runtime.find_region("mem").is_ok());
    assert!(runtime.find_region("vram").is_err());
}
