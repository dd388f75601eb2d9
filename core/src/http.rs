//! HTTP/1.0 wire protocol: request encoding and response parsing.
//!
//! # Design
//! Requests and responses are plain data. [`HttpRequest::encode`] produces
//! the exact byte sequence written to the socket; [`parse_response`] consumes
//! any buffered reader, so the parser is testable without a network. The
//! transport in [`crate::transport`] is the only place the two meet a real
//! `TcpStream`.
//!
//! The wire format is deliberately old-fashioned: HTTP/1.0, no chunked
//! transfer-encoding, no persistent connections. The server closing the
//! stream is the only body terminator the parser relies on.

use std::collections::BTreeMap;
use std::io::BufRead;

use crate::error::Error;

/// HTTP method for a request. `Copy` is the nonstandard verb CouchDB uses
/// for server-side document copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Copy,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Copy => "COPY",
        }
    }
}

/// An outbound request described as plain data.
///
/// Headers keep their insertion order and exact case. [`HttpRequest::encode`]
/// emits every entry as given: nothing is filtered, so a caller-supplied
/// `Content-Type` coexists with the `application/json` pair appended by body
/// framing.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Request path, already query-encoded by the caller apart from the
    /// space and double-quote escapes applied at encode time.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Set `name` to `value`, replacing the first entry with the same exact
    /// name or appending a new one. Position is preserved on replacement.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Produce the exact byte sequence to write to the socket:
    /// `METHOD PATH HTTP/1.0\r\n<headers>\r\n[body\r\n]`.
    ///
    /// Literal spaces and double quotes in the path are escaped to `%20` and
    /// `%22`; any other percent-encoding is the caller's responsibility.
    /// A body appends `Content-Length` (its byte length, excluding the
    /// trailing line break) and `Content-Type: application/json`.
    pub fn encode(&self) -> Vec<u8> {
        let path = self.path.replace(' ', "%20").replace('"', "%22");

        let mut packet = format!("{} {} HTTP/1.0\r\n", self.method.as_str(), path);
        for (name, value) in &self.headers {
            packet.push_str(&format!("{name}: {value}\r\n"));
        }

        match &self.body {
            Some(body) => {
                packet.push_str(&format!("Content-Length: {}\r\n", body.len()));
                packet.push_str("Content-Type: application/json\r\n\r\n");
                packet.push_str(body);
                packet.push_str("\r\n");
            }
            None => packet.push_str("\r\n"),
        }

        packet.into_bytes()
    }
}

/// The parsed status line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpInfo {
    /// The status line as received, trimmed.
    pub raw: String,
    /// Protocol version, e.g. `"1.0"`.
    pub version: String,
    /// Numeric status code.
    pub status: u16,
}

/// A fully read response before body interpretation: status line, header
/// map, and the body as raw text.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub info: HttpInfo,
    /// Header names keep their case as received; a repeated name overwrites
    /// the earlier value.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Header-phase / body-phase of the response state machine. The transition
/// is one-way, triggered by the first blank line.
enum Phase {
    Headers,
    Body,
}

/// Read `reader` to end-of-stream and parse it as an HTTP response.
///
/// The first line must match `HTTP/<version> <status>` or parsing fails.
/// Lines before the first blank line are `Name: Value` headers (split on the
/// first colon, value trimmed); everything after the blank line is appended
/// to the body verbatim, line terminators included. There is no
/// length-based framing: end of stream ends the body.
pub fn parse_response<R: BufRead>(mut reader: R) -> Result<RawResponse, Error> {
    let mut phase = Phase::Headers;
    let mut info: Option<HttpInfo> = None;
    let mut headers = BTreeMap::new();
    let mut body = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| Error::Protocol(format!("failed reading the response stream: {e}")))?;
        if read == 0 {
            break;
        }

        match phase {
            Phase::Headers => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    phase = Phase::Body;
                } else if info.is_none() {
                    // The first header line is always the HTTP info.
                    let (version, status) = parse_status_line(trimmed).ok_or_else(|| {
                        Error::Protocol(format!("malformed status line: {trimmed:?}"))
                    })?;
                    info = Some(HttpInfo {
                        raw: trimmed.to_string(),
                        version,
                        status,
                    });
                } else {
                    match trimmed.split_once(':') {
                        Some((name, value)) => {
                            headers.insert(name.to_string(), value.trim().to_string());
                        }
                        None => {
                            headers.insert(trimmed.to_string(), String::new());
                        }
                    }
                }
            }
            Phase::Body => body.push_str(&line),
        }
    }

    let info = info
        .ok_or_else(|| Error::Protocol("stream ended before a status line was read".to_string()))?;

    Ok(RawResponse { info, headers, body })
}

/// Match `HTTP/<digits>.<digits> <status...>`, returning version and status.
fn parse_status_line(line: &str) -> Option<(String, u16)> {
    let rest = line.strip_prefix("HTTP/")?;
    let mut parts = rest.split_whitespace();

    let version = parts.next()?;
    let (major, minor) = version.split_once('.')?;
    if major.is_empty()
        || minor.is_empty()
        || !major.bytes().all(|b| b.is_ascii_digit())
        || !minor.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    // Leading digits of the next token; the reason phrase is ignored.
    let digits: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    let status = digits.parse::<u16>().ok()?;

    Some((version.to_string(), status))
}

const BASE64_TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// RFC 4648 base64, encode-only. Used for the `Authorization: Basic` value.
pub(crate) fn base64_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);

    for chunk in data.chunks(3) {
        let b0 = u32::from(chunk[0]);
        let b1 = u32::from(chunk.get(1).copied().unwrap_or(0));
        let b2 = u32::from(chunk.get(2).copied().unwrap_or(0));
        let n = (b0 << 16) | (b1 << 8) | b2;

        out.push(BASE64_TABLE[(n >> 18 & 0x3f) as usize] as char);
        out.push(BASE64_TABLE[(n >> 12 & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 {
            BASE64_TABLE[(n >> 6 & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            BASE64_TABLE[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn packet_str(request: &HttpRequest) -> String {
        String::from_utf8(request.encode()).unwrap()
    }

    #[test]
    fn encode_without_body_ends_with_blank_line() {
        let request = HttpRequest {
            method: HttpMethod::Get,
            path: "/db/doc1".to_string(),
            headers: vec![("Host".to_string(), "127.0.0.1:5984".to_string())],
            body: None,
        };
        assert_eq!(
            packet_str(&request),
            "GET /db/doc1 HTTP/1.0\r\nHost: 127.0.0.1:5984\r\n\r\n"
        );
    }

    #[test]
    fn encode_with_body_appends_framing_headers_and_terminator() {
        let request = HttpRequest {
            method: HttpMethod::Put,
            path: "/db/doc1".to_string(),
            headers: vec![("Host".to_string(), "127.0.0.1:5984".to_string())],
            body: Some(r#"{"a":1}"#.to_string()),
        };
        assert_eq!(
            packet_str(&request),
            "PUT /db/doc1 HTTP/1.0\r\nHost: 127.0.0.1:5984\r\nContent-Length: 7\r\nContent-Type: application/json\r\n\r\n{\"a\":1}\r\n"
        );
    }

    #[test]
    fn encode_escapes_spaces_and_quotes_in_path() {
        let request = HttpRequest {
            method: HttpMethod::Get,
            path: "/db/_all_docs?startkey=\"a b\"".to_string(),
            headers: Vec::new(),
            body: None,
        };
        assert_eq!(
            packet_str(&request),
            "GET /db/_all_docs?startkey=%22a%20b%22 HTTP/1.0\r\n\r\n"
        );
    }

    #[test]
    fn set_header_replaces_in_place_and_appends() {
        let mut request = HttpRequest {
            method: HttpMethod::Get,
            path: "/".to_string(),
            headers: vec![
                ("Host".to_string(), "caller".to_string()),
                ("X-Extra".to_string(), "1".to_string()),
            ],
            body: None,
        };
        request.set_header("Host", "forced:5984");
        request.set_header("User-Agent", "agent");

        assert_eq!(
            request.headers,
            vec![
                ("Host".to_string(), "forced:5984".to_string()),
                ("X-Extra".to_string(), "1".to_string()),
                ("User-Agent".to_string(), "agent".to_string()),
            ]
        );
    }

    // The source's reserved-header skip condition was vacuous, so no
    // caller-supplied header is ever filtered: a caller Content-Type is
    // emitted alongside the framing pair.
    #[test]
    fn caller_content_type_is_not_skipped() {
        let request = HttpRequest {
            method: HttpMethod::Post,
            path: "/db".to_string(),
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: Some("{}".to_string()),
        };
        let packet = packet_str(&request);
        assert!(packet.contains("Content-Type: text/plain\r\n"));
        assert!(packet.contains("Content-Type: application/json\r\n"));
    }

    #[test]
    fn parse_extracts_version_status_headers_and_body() {
        let raw = "HTTP/1.0 200 OK\r\nServer: CouchDB/0.10\r\nContent-Type: application/json\r\n\r\n{\"ok\":true}\n";
        let response = parse_response(Cursor::new(raw)).unwrap();

        assert_eq!(response.info.version, "1.0");
        assert_eq!(response.info.status, 200);
        assert_eq!(response.info.raw, "HTTP/1.0 200 OK");
        assert_eq!(response.headers["Server"], "CouchDB/0.10");
        assert_eq!(response.headers["Content-Type"], "application/json");
        assert_eq!(response.body, "{\"ok\":true}\n");
    }

    #[test]
    fn parse_accepts_status_line_without_reason_phrase() {
        let response = parse_response(Cursor::new("HTTP/1.1 404\r\n\r\n")).unwrap();
        assert_eq!(response.info.status, 404);
        assert_eq!(response.info.version, "1.1");
    }

    #[test]
    fn parse_body_is_accumulated_verbatim_across_lines() {
        let raw = "HTTP/1.0 200 OK\r\n\r\nline one\r\nline two\r\n\r\ntrailer";
        let response = parse_response(Cursor::new(raw)).unwrap();
        assert_eq!(response.body, "line one\r\nline two\r\n\r\ntrailer");
    }

    #[test]
    fn parse_duplicate_headers_last_write_wins() {
        let raw = "HTTP/1.0 200 OK\r\nSet-Cookie: a\r\nSet-Cookie: b\r\n\r\n";
        let response = parse_response(Cursor::new(raw)).unwrap();
        assert_eq!(response.headers["Set-Cookie"], "b");
    }

    #[test]
    fn parse_header_value_is_split_on_first_colon_only() {
        let raw = "HTTP/1.0 200 OK\r\nLocation: http://example.com:5984/db\r\n\r\n";
        let response = parse_response(Cursor::new(raw)).unwrap();
        assert_eq!(response.headers["Location"], "http://example.com:5984/db");
    }

    #[test]
    fn parse_rejects_malformed_status_line() {
        let err = parse_response(Cursor::new("banana\r\n\r\n")).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let err = parse_response(Cursor::new("HTTP/x.y 200 OK\r\n\r\n")).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn parse_rejects_empty_stream() {
        let err = parse_response(Cursor::new("")).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn parse_handles_bare_lf_line_endings() {
        let raw = "HTTP/1.0 201 Created\nServer: CouchDB\n\n{\"ok\":true}";
        let response = parse_response(Cursor::new(raw)).unwrap();
        assert_eq!(response.info.status, 201);
        assert_eq!(response.headers["Server"], "CouchDB");
        assert_eq!(response.body, "{\"ok\":true}");
    }

    #[test]
    fn base64_known_vectors() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_encode(b"admin:secret"), "YWRtaW46c2VjcmV0");
    }
}
