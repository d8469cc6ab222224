//! HTTP/1.1 Framing
//!
//! Request serialization and async response parsing for HTTP/1.1.

use smol::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use std::io;

/// HTTP/1.1 request
#[derive(Debug, Clone)]
pub(crate) struct Http1Request {
    pub method: String,
    /// Request target (e.g., "/api/users?page=2")
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Http1Request {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(format!("{} {} HTTP/1.1\r\n", self.method, self.path).as_bytes());
        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if let Some(ref body) = self.body {
            if !self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("content-length")) {
                buf.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
            }
        }
        buf.extend_from_slice(b"\r\n");
        if let Some(ref body) = self.body {
            buf.extend_from_slice(body);
        }
        buf
    }
}

/// HTTP/1.1 response
#[derive(Debug, Clone)]
pub(crate) struct Http1Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Read one response from `reader`. Bodies longer than `max_body` bytes are rejected.
pub(crate) async fn read_response<R: AsyncBufRead + Unpin>(reader: &mut R, max_body: usize) -> io::Result<Http1Response> {
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let status = parse_status_line(&line)?;

    let mut headers = Vec::new();
    loop {
        line.clear();
        reader.read_line(&mut line).await?;
        if line == "\r\n" || line == "\n" || line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.trim_end().split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let chunked = header(&headers, "transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let content_length = match header(&headers, "content-length") {
        Some(v) => Some(v.parse::<u64>().map_err(|_| invalid("Invalid content length"))?),
        None => None,
    };

    let mut body = Vec::new();
    if chunked {
        read_chunked_body(reader, &mut body, max_body).await?;
    } else if let Some(len) = content_length {
        if len > max_body as u64 {
            return Err(invalid("Body too large"));
        }
        read_limited(reader, &mut body, len).await?;
        if (body.len() as u64) < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Body shorter than content length"));
        }
    } else if !(status == 204 || status == 304 || (100..200).contains(&status)) {
        read_limited(reader, &mut body, (max_body as u64).saturating_add(1)).await?;
        if body.len() > max_body {
            return Err(invalid("Body too large"));
        }
    }

    Ok(Http1Response { status, headers, body })
}

/// Append at most `limit` bytes to `body`, growing it as data arrives
async fn read_limited<R: AsyncBufRead + Unpin>(reader: &mut R, body: &mut Vec<u8>, limit: u64) -> io::Result<usize> {
    reader.take(limit).read_to_end(body).await
}

fn parse_status_line(line: &str) -> io::Result<u16> {
    let mut parts = line.trim_end().splitn(3, ' ');
    match parts.next() {
        Some("HTTP/1.0") | Some("HTTP/1.1") => {}
        _ => return Err(invalid("Invalid HTTP version")),
    }
    parts
        .next()
        .ok_or_else(|| invalid("Missing status code"))?
        .parse()
        .map_err(|_| invalid("Invalid status code"))
}

async fn read_chunked_body<R: AsyncBufRead + Unpin>(reader: &mut R, body: &mut Vec<u8>, max_body: usize) -> io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        reader.read_line(&mut line).await?;
        let size_str = line.trim().split(';').next().unwrap_or("");
        let size = u64::from_str_radix(size_str, 16).map_err(|_| invalid("Invalid chunk size"))?;

        if size == 0 {
            line.clear();
            reader.read_line(&mut line).await?;
            return Ok(());
        }

        let total = (body.len() as u64)
            .checked_add(size)
            .filter(|&total| total <= max_body as u64)
            .ok_or_else(|| invalid("Chunk too large"))?;
        read_limited(reader, body, size).await?;
        if (body.len() as u64) < total {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Truncated chunk"));
        }

        // Trailing CRLF
        line.clear();
        reader.read_line(&mut line).await?;
    }
}
