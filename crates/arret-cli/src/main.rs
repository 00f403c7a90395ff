use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use arret_backend::testing::DemoCore;
use arret_backend::{Runtime, RuntimeOptions};
use arret_proto::{CmdServer, DEFAULT_PORT, Dispatcher, run_client};

/// Arrêt retro-emulator debugger
///
/// Runs the debugger backend over the built-in demonstration core and
/// serves the line/JSON command protocol over TCP. Real emulator cores are
/// embedded by linking against `arret-backend` and handing the runtime a
/// `Core` implementation.
#[derive(Parser, Debug)]
#[command(name = "arret")]
#[command(about = "Cross-architecture retro-emulator debugger backend", long_about = None)]
struct Args {
    /// Content file loaded into the demonstration core
    #[arg(long)]
    rom: Option<PathBuf>,

    /// TCP command port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Client mode: send a single command to a running instance and exit
    #[arg(long)]
    cmd: Option<String>,

    /// Do not free-run frames; the emulator only advances on `run`/step
    /// commands
    #[arg(long)]
    headless: bool,

    /// Drop audio samples at the input
    #[arg(long)]
    mute: bool,

    /// System/BIOS directory handed to the core
    #[arg(long, default_value = ".")]
    system_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Client mode needs no logging or runtime of its own.
    if let Some(cmd) = &args.cmd {
        std::process::exit(run_client(cmd, args.port));
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = Runtime::new(
        Box::new(DemoCore::new()),
        RuntimeOptions {
            mute: args.mute,
            system_dir: args.system_dir.clone(),
        },
    );

    if let Some(rom) = &args.rom {
        runtime.load_content(rom)?;
    }

    let mut server = CmdServer::bind(args.port)?;
    let dispatcher = Dispatcher::new();

    info!(port = server.port(), "command server ready");
    if args.rom.is_none() {
        info!("no content loaded; load one with --rom or debug the idle core");
    }

    let frame_duration = {
        let fps = runtime.av_info().timing.fps;
        Duration::from_secs_f64(1.0 / fps.max(1.0))
    };

    while runtime.running() {
        server.poll(&runtime, &dispatcher);

        let free_run = !args.headless
            && runtime.content_loaded()
            && runtime.bp_hit().is_none()
            && !runtime.blocked();

        if free_run {
            let started = Instant::now();
            runtime.run_frame();
            runtime.bp_flush_deferred();
            let elapsed = started.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        } else {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    info!("shutting down");
    server.shutdown();
    runtime.shutdown();
    Ok(())
}
