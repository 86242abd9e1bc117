//! Minimal HTTP/1.1 request/response types for the admin and chat-bridge
//! surfaces (§6): `Method`, a parsed `Request`, and a `Response` builder,
//! pared down to what a handful of JSON admin routes and one plain-text
//! chat-bridge route need. No async runtime's cancellation model to wire
//! into here (§9, F.0 — every suspension point is a blocking call on an
//! OS thread).
//!
//! [`server::serve`] owns the only socket I/O in this crate; [`admin`] and
//! [`chat_bridge`] are pure functions from a parsed [`Request`] to a
//! [`Response`], so routing logic is unit-testable without a real socket.

pub mod admin;
pub mod chat_bridge;
pub mod server;

use std::collections::HashMap;
use std::fmt;

/// HTTP request method, as named in §6's route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Options,
    Other,
}

impl Method {
    #[must_use]
    pub fn from_bytes(src: &[u8]) -> Self {
        match src {
            b"GET" => Self::Get,
            b"POST" => Self::Post,
            b"OPTIONS" => Self::Options,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Options => "OPTIONS",
            Self::Other => "OTHER",
        })
    }
}

/// A parsed HTTP request: method, path (without query string), query
/// parameters, headers (lower-cased names), and body bytes.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Splits `"path?query"` into the two parts this type tracks
    /// separately, URL-decoding query values.
    #[must_use]
    pub fn parse_path_and_query(raw: &str) -> (String, HashMap<String, String>) {
        match raw.split_once('?') {
            None => (raw.to_string(), HashMap::new()),
            Some((path, qs)) => {
                let mut query = HashMap::new();
                for pair in qs.split('&') {
                    if pair.is_empty() {
                        continue;
                    }
                    let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                    query.insert(url_decode(k), url_decode(v));
                }
                (path.to_string(), query)
            }
        }
    }
}

fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// An HTTP response the routing layer hands back to [`server::serve`] for
/// wire encoding.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: body.into().into_bytes(),
        }
    }

    #[must_use]
    pub fn no_content(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn status_line(status: u16) -> &'static str {
        match status {
            200 => "200 OK",
            204 => "204 No Content",
            400 => "400 Bad Request",
            401 => "401 Unauthorized",
            404 => "404 Not Found",
            _ => "500 Internal Server Error",
        }
    }

    /// Encodes this response as a full HTTP/1.1 wire message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {}\r\n", Self::status_line(self.status)).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(b"Connection: close\r\n\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// CORS headers computed for `origin` per [`crate::config::EngineConfig`]
/// (§6: "CORS: allowed origins configured via env").
#[must_use]
pub fn cors_headers(config: &crate::config::EngineConfig, origin: Option<&str>) -> Vec<(String, String)> {
    let Some(origin) = origin else {
        return Vec::new();
    };
    if !config.origin_allowed(origin) {
        return Vec::new();
    }
    vec![
        ("Access-Control-Allow-Origin".to_string(), origin.to_string()),
        ("Access-Control-Allow-Methods".to_string(), "GET, POST, OPTIONS".to_string()),
        ("Access-Control-Allow-Headers".to_string(), "Content-Type, x-admin-passcode".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_and_query() {
        let (path, query) = Request::parse_path_and_query("/fossabot/vote?vote=A&who=me");
        assert_eq!(path, "/fossabot/vote");
        assert_eq!(query.get("vote").map(String::as_str), Some("A"));
        assert_eq!(query.get("who").map(String::as_str), Some("me"));
    }

    #[test]
    fn url_decodes_percent_and_plus() {
        let (_, query) = Request::parse_path_and_query("/x?name=a%20b+c");
        assert_eq!(query.get("name").map(String::as_str), Some("a b c"));
    }

    #[test]
    fn response_encodes_status_and_content_length() {
        let r = Response::text(200, "hi");
        let encoded = String::from_utf8(r.encode()).unwrap();
        assert!(encoded.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(encoded.contains("Content-Length: 2\r\n"));
        assert!(encoded.ends_with("hi"));
    }
}
