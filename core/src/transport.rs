//! One-shot TCP transport for the HTTP engine.
//!
//! # Design
//! One connection per call: connect, write the full packet, read to
//! end-of-stream, drop. There is no pooling, keep-alive, or retry, and no
//! timeout beyond the OS socket defaults. The response is buffered fully
//! before parsing, so [`crate::http::parse_response`] never sees socket
//! errors — anything that fails mid-stream surfaces here as
//! [`Error::Transport`] with the `host:port` target attached.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::Error;
use crate::http::{parse_response, RawResponse};

/// Perform one request/response exchange with `host:port`.
///
/// The connection is closed (dropped) once the stream has been consumed or
/// on any failure.
pub(crate) fn exchange(host: &str, port: u16, packet: &[u8]) -> Result<RawResponse, Error> {
    let target = format!("{host}:{port}");

    tracing::debug!(%target, "opening connection");
    let mut stream = TcpStream::connect(&target).map_err(|source| Error::Transport {
        target: target.clone(),
        source,
    })?;

    stream.write_all(packet).map_err(|source| Error::Transport {
        target: target.clone(),
        source,
    })?;

    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .map_err(|source| Error::Transport {
            target: target.clone(),
            source,
        })?;
    tracing::debug!(%target, bytes = raw.len(), "response stream consumed");

    parse_response(raw.as_slice())
}
