//! The blocking HTTP/1.1 socket loop. This is the only module in the
//! crate that touches raw sockets; everything else operates on the
//! [`super::Request`] / [`super::Response`] pair so routing stays
//! unit-testable (see the module doc on [`super`]).

use super::{admin, chat_bridge, Method, Request, Response};
use crate::app::Engine;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Binds `engine.config.bind_addr` and serves requests until `shutdown` is
/// set. Each connection is handled on its own thread; the listener itself
/// is polled non-blocking so the accept loop can observe shutdown without
/// a dedicated wakeup mechanism.
pub fn serve(engine: Arc<Engine>, shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    let listener = TcpListener::bind(engine.config.bind_addr)?;
    listener.set_nonblocking(true)?;
    tracing::info!(addr = %engine.config.bind_addr, "http server listening");

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _peer)) => {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    if let Err(e) = handle_connection(&engine, stream) {
                        debug!(error = %e, "connection closed with error");
                    }
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
    Ok(())
}

fn handle_connection(engine: &Arc<Engine>, mut stream: TcpStream) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;

    let request = match read_request(&stream) {
        Ok(req) => req,
        Err(_) => {
            let resp = Response::text(400, "Bad Request");
            stream.write_all(&resp.encode())?;
            return Ok(());
        }
    };

    let response = dispatch(engine, &request);
    stream.write_all(&response.encode())?;
    stream.flush()
}

fn dispatch(engine: &Arc<Engine>, req: &Request) -> Response {
    if req.path.starts_with("/admin") {
        admin::handle(engine, req)
    } else if req.path == "/fossabot/vote" {
        chat_bridge::handle(engine, req)
    } else if req.method == Method::Options {
        admin::handle(engine, req)
    } else {
        Response::text(404, "Not Found")
    }
}

fn read_request(stream: &TcpStream) -> std::io::Result<Request> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.trim_end().splitn(3, ' ');
    let method = Method::from_bytes(parts.next().unwrap_or("").as_bytes());
    let raw_target = parts.next().unwrap_or("");
    let (path, query) = Request::parse_path_and_query(raw_target);

    let mut headers = std::collections::HashMap::new();
    let mut consumed = request_line.len();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        consumed += n;
        if consumed > MAX_HEADER_BYTES {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "headers too large"));
        }
        if n == 0 || line.trim_end().is_empty() {
            break;
        }
        if let Some((name, value)) = line.trim_end().split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
        .min(MAX_BODY_BYTES);

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body)?;
    }

    Ok(Request {
        method,
        path,
        query,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_request_line_and_headers() {
        let raw = b"GET /admin/status?x=1 HTTP/1.1\r\nHost: localhost\r\nX-Admin-Passcode: secret\r\n\r\n";
        let mut reader = BufReader::new(&raw[..]);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut parts = request_line.trim_end().splitn(3, ' ');
        let method = Method::from_bytes(parts.next().unwrap().as_bytes());
        let (path, query) = Request::parse_path_and_query(parts.next().unwrap());
        assert_eq!(method, Method::Get);
        assert_eq!(path, "/admin/status");
        assert_eq!(query.get("x").map(String::as_str), Some("1"));
    }
}
