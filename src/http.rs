//! # HTTP/1.1 Wire Codec
//!
//! Purpose: Serialize requests and parse responses without external
//! dependencies, keeping allocations under control.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Responses are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Callers provide line buffers to avoid per-call allocations.
//! 3. **Binary-Safe Bodies**: Bodies are raw bytes; decoding belongs to the caller.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.

use std::fmt;
use std::io::{self, BufRead};

use crate::executor::{Error, Result};

/// Request verb supported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Delete,
    Put,
    Post,
    Head,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Delete => "DELETE",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw transport response, returned to callers unmodified. Status handling
/// and body decoding belong to the resource-mapping layer.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    close: bool,
}

impl RawResponse {
    /// Returns the first header with the given name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Whether the peer left the channel open for another request.
    pub fn is_keep_alive(&self) -> bool {
        !self.close
    }
}

/// Serializes one request head plus optional body into `out`.
pub(crate) fn build_request(
    method: Method,
    target: &str,
    headers: &[(String, String)],
    body: Option<&[u8]>,
    out: &mut Vec<u8>,
) {
    out.clear();
    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
}

/// Reads one response from the channel. Interim 1xx responses are consumed
/// and discarded. `head_request` suppresses body reading for HEAD.
pub(crate) fn read_response<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    head_request: bool,
) -> Result<RawResponse> {
    loop {
        read_line(reader, line_buf)?;
        let (minor, status, reason) = parse_status_line(line_buf)?;

        let mut headers = Vec::new();
        loop {
            read_line(reader, line_buf)?;
            if line_buf.is_empty() {
                break;
            }
            headers.push(parse_header(line_buf)?);
        }

        // Interim responses carry no body; the real response follows.
        if (100..200).contains(&status) {
            continue;
        }

        let mut close = minor == 0;
        if let Some(value) = header_value(&headers, "connection") {
            if token_listed(value, "close") {
                close = true;
            } else if token_listed(value, "keep-alive") {
                close = false;
            }
        }

        let mut body = Vec::new();
        if !(head_request || status == 204 || status == 304) {
            if header_value(&headers, "transfer-encoding")
                .is_some_and(|value| token_listed(value, "chunked"))
            {
                read_chunked(reader, line_buf, &mut body)?;
            } else if let Some(value) = header_value(&headers, "content-length") {
                let len: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::Protocol("bad content-length"))?;
                body.resize(len, 0);
                reader.read_exact(&mut body)?;
            } else {
                // Length-less body: delimited by the peer closing the channel.
                reader.read_to_end(&mut body)?;
                close = true;
            }
        }

        return Ok(RawResponse {
            status,
            reason,
            headers,
            body,
            close,
        });
    }
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before response was complete",
        )));
    }
    if buf.last() != Some(&b'\n') {
        return Err(Error::Protocol("truncated line"));
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(())
}

fn parse_status_line(line: &[u8]) -> Result<(u8, u16, String)> {
    let text = std::str::from_utf8(line).map_err(|_| Error::Protocol("status line not utf-8"))?;
    let mut parts = text.splitn(3, ' ');
    let minor = match parts.next() {
        Some("HTTP/1.1") => 1,
        Some("HTTP/1.0") => 0,
        _ => return Err(Error::Protocol("unsupported http version")),
    };
    let status = parts
        .next()
        .ok_or(Error::Protocol("missing status code"))?
        .parse::<u16>()
        .map_err(|_| Error::Protocol("bad status code"))?;
    let reason = parts.next().unwrap_or("").to_string();
    Ok((minor, status, reason))
}

fn parse_header(line: &[u8]) -> Result<(String, String)> {
    let text = std::str::from_utf8(line).map_err(|_| Error::Protocol("header not utf-8"))?;
    let (name, value) = text
        .split_once(':')
        .ok_or(Error::Protocol("header missing colon"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Protocol("empty header name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn read_chunked<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, body: &mut Vec<u8>) -> Result<()> {
    loop {
        read_line(reader, line_buf)?;
        let size = parse_chunk_size(line_buf)?;
        if size == 0 {
            // Trailer section runs until a blank line.
            loop {
                read_line(reader, line_buf)?;
                if line_buf.is_empty() {
                    return Ok(());
                }
            }
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..])?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != *b"\r\n" {
            return Err(Error::Protocol("chunk missing crlf"));
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(line).map_err(|_| Error::Protocol("chunk size not utf-8"))?;
    let digits = text.split(';').next().unwrap_or("").trim();
    if digits.is_empty() {
        return Err(Error::Protocol("empty chunk size"));
    }
    usize::from_str_radix(digits, 16).map_err(|_| Error::Protocol("bad chunk size"))
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(header, _)| header.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn token_listed(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}
