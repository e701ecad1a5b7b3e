//! Blocking HTTP client over the daemon's Unix socket.
//!
//! Requests are HTTP/1.0 GETs, so the response body is delimited by
//! connection close and needs no transfer-coding support. The request
//! budget is enforced with socket timeouts; connecting to a local socket
//! either succeeds immediately or fails outright.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use libc::c_int;

use crate::config;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum IpcError {
    /// Daemon answered 404.
    NotFound,
    /// Daemon answered some other non-200 status.
    Status(u16),
    /// Socket-level failure.
    Transport(std::io::Error),
    /// Response did not parse as HTTP or as the expected JSON.
    Malformed,
}

impl IpcError {
    /// errno value reported to the host process.
    pub fn errno(&self) -> c_int {
        match self {
            IpcError::NotFound => libc::ENOENT,
            _ => libc::EIO,
        }
    }
}

/// Conservative percent-encoding for the `path` query parameter. Everything
/// outside `[A-Za-z0-9/._~-]` is escaped.
pub fn url_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                const HEX: &[u8; 16] = b"0123456789ABCDEF";
                out.push('%');
                out.push(HEX[usize::from(byte >> 4)] as char);
                out.push(HEX[usize::from(byte & 0xF)] as char);
            }
        }
    }
    out
}

/// Parse the status line and skip headers, leaving `reader` at the body.
pub(crate) fn read_response_head<R: BufRead>(reader: &mut R) -> Result<u16, IpcError> {
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .map_err(IpcError::Transport)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(IpcError::Malformed)?;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(IpcError::Transport)?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(status)
}

fn request(endpoint: &str, abs_path: &str) -> Result<BufReader<UnixStream>, IpcError> {
    let cfg = config::get();
    let stream = UnixStream::connect(&cfg.socket).map_err(IpcError::Transport)?;
    stream
        .set_write_timeout(Some(WRITE_TIMEOUT))
        .map_err(IpcError::Transport)?;
    stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .map_err(IpcError::Transport)?;

    let mut stream = stream;
    let req = format!(
        "GET {endpoint}?path={} HTTP/1.0\r\nHost: remotefs\r\nAccept: */*\r\n\r\n",
        url_encode(abs_path)
    );
    stream
        .write_all(req.as_bytes())
        .map_err(IpcError::Transport)?;

    let mut reader = BufReader::new(stream);
    match read_response_head(&mut reader)? {
        200 => Ok(reader),
        404 => Err(IpcError::NotFound),
        status => Err(IpcError::Status(status)),
    }
}

/// GET an endpoint and return the whole body (for `/stat` and `/ls`).
pub fn get_json(endpoint: &str, abs_path: &str) -> Result<Vec<u8>, IpcError> {
    let mut reader = request(endpoint, abs_path)?;
    let mut body = Vec::new();
    reader.read_to_end(&mut body).map_err(IpcError::Transport)?;
    Ok(body)
}

/// GET `/cat` and stream the body into `dst`.
pub fn get_to_file(endpoint: &str, abs_path: &str, dst: &mut std::fs::File) -> Result<u64, IpcError> {
    let mut reader = request(endpoint, abs_path)?;
    std::io::copy(&mut reader, dst).map_err(IpcError::Transport)
}
