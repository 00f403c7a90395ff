//! One-shot command client: connect, send a line, print the response.

use std::io::{Read, Write};
use std::net::TcpStream;

/// Sends `command` to a running instance and returns the raw response with
/// trailing newlines stripped.
pub fn send_command(command: &str, port: u16) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))?;
    stream.write_all(command.as_bytes())?;
    stream.write_all(b"\n")?;

    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    while response.ends_with('\n') {
        response.pop();
    }
    Ok(response)
}

/// Client mode entry point: prints the response and returns the process
/// exit code.
pub fn run_client(command: &str, port: u16) -> i32 {
    match send_command(command, port) {
        Ok(response) => {
            println!("{response}");
            0
        }
        Err(error) => {
            eprintln!("error: {error}");
            1
        }
    }
}
