//! TCP command server.
//!
//! Accepts one-shot connections: read one line, hand it to the main loop
//! over a channel, write the response, close. Connection handling is
//! threaded, but every command funnels through the single channel the main
//! loop drains, so clients observe a total order.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use arret_backend::Runtime;

use crate::cmd::Dispatcher;

const LINE_MAX: usize = 4096;
/// A stuck peer must not hold a connection thread forever.
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const ACCEPT_POLL: Duration = Duration::from_millis(20);

struct CmdRequest {
    line: String,
    reply: Sender<Vec<u8>>,
}

pub struct CmdServer {
    rx: Receiver<CmdRequest>,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    port: u16,
}

impl CmdServer {
    /// Binds the listener and spawns the accept thread. Port 0 picks an
    /// ephemeral port; see [`port`](Self::port).
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let (tx, rx) = unbounded::<CmdRequest>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_shutdown = shutdown.clone();
        let accept_thread = std::thread::Builder::new()
            .name("arret-cmd-accept".into())
            .spawn(move || {
                while !accept_shutdown.load(Ordering::Acquire) {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            let tx = tx.clone();
                            let _ = std::thread::Builder::new()
                                .name("arret-cmd-conn".into())
                                .spawn(move || {
                                    if let Err(error) = handle_connection(stream, tx) {
                                        tracing::debug!(%peer, %error, "command connection error");
                                    }
                                });
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(ACCEPT_POLL);
                        }
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                            std::thread::sleep(ACCEPT_POLL);
                        }
                    }
                }
            })?;

        tracing::info!(port, "command server listening");
        Ok(Self {
            rx,
            shutdown,
            accept_thread: Some(accept_thread),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Drains pending commands, executing them on the calling thread.
    pub fn poll(&self, rt: &Runtime, dispatcher: &Dispatcher) {
        while let Ok(request) = self.rx.try_recv() {
            let mut response = Vec::new();
            if let Err(error) = dispatcher.process(rt, &request.line, &mut response) {
                tracing::warn!(%error, "command processing failed");
            }
            let _ = request.reply.send(response);
        }
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CmdServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn handle_connection(stream: TcpStream, tx: Sender<CmdRequest>) -> std::io::Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_nodelay(true).ok();

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader
        .by_ref()
        .take(LINE_MAX as u64)
        .read_line(&mut line)?;

    let (reply_tx, reply_rx) = unbounded::<Vec<u8>>();
    if tx
        .send(CmdRequest {
            line,
            reply: reply_tx,
        })
        .is_err()
    {
        return Ok(()); // server shutting down
    }

    let Ok(response) = reply_rx.recv() else {
        return Ok(());
    };
    let mut stream = stream;
    stream.write_all(&response)?;
    stream.flush()
}
