//! HTTP response construction.
//!
//! A `Response` collects status, headers, and an optional body, then
//! serializes into one contiguous buffer. `Date`, `Server`, and
//! `Content-Length` are filled in at serialization time unless already set
//! explicitly (a file transfer sets `Content-Length` itself and queues the
//! payload as a separate write).

use crate::http::Version;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;

/// Response header names used by the server.
pub mod header {
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const DATE: &str = "Date";
    pub const LOCATION: &str = "Location";
    pub const SERVER: &str = "Server";
}

const SERVER_TOKEN: &str = concat!("serve-a-file/", env!("CARGO_PKG_VERSION"));

/// Status codes the server answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Found,
    BadRequest,
    NotFound,
    InternalServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Found => 302,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Found => "Found",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }
}

/// A response under construction.
#[derive(Debug)]
pub struct Response {
    version: Version,
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: BytesMut,
}

impl Response {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            status: StatusCode::Ok,
            headers: Vec::new(),
            body: BytesMut::new(),
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Set a header, replacing any previous value for the same name.
    pub fn set_header(&mut self, name: &'static str, value: impl Into<String>) {
        let value = value.into();
        for entry in &mut self.headers {
            if entry.0.eq_ignore_ascii_case(name) {
                entry.1 = value;
                return;
            }
        }
        self.headers.push((name, value));
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(entry, _)| entry.eq_ignore_ascii_case(name))
    }

    /// Append to the body under construction.
    pub fn append_body(&mut self, chunk: &str) {
        self.body.extend_from_slice(chunk.as_bytes());
    }

    /// Serialize: status line, headers, blank line, body.
    pub fn into_bytes(mut self) -> Bytes {
        if !self.has_header(header::DATE) {
            self.set_header(header::DATE, imf_fixdate());
        }
        if !self.has_header(header::SERVER) {
            self.set_header(header::SERVER, SERVER_TOKEN);
        }
        if !self.has_header(header::CONTENT_LENGTH) {
            self.set_header(header::CONTENT_LENGTH, self.body.len().to_string());
        }

        let mut out = BytesMut::with_capacity(128 + self.body.len());
        out.put_slice(self.version.as_str().as_bytes());
        out.put_slice(b" ");
        out.put_slice(self.status.code().to_string().as_bytes());
        out.put_slice(b" ");
        out.put_slice(self.status.reason().as_bytes());
        out.put_slice(b"\r\n");
        for (name, value) in &self.headers {
            out.put_slice(name.as_bytes());
            out.put_slice(b": ");
            out.put_slice(value.as_bytes());
            out.put_slice(b"\r\n");
        }
        out.put_slice(b"\r\n");
        out.put_slice(&self.body);
        out.freeze()
    }
}

/// `Date` header value, IMF-fixdate as required by RFC 7231.
fn imf_fixdate() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &Bytes) -> Vec<String> {
        String::from_utf8_lossy(raw)
            .split("\r\n")
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn serializes_status_line_headers_and_body() {
        let mut response = Response::new(Version::Http11);
        response.set_status(StatusCode::NotFound);
        response.set_header(header::CONTENT_TYPE, "text/html; charset=UTF-8");
        response.append_body("<html>gone</html>");

        let raw = response.into_bytes();
        let text = String::from_utf8_lossy(&raw).into_owned();

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Type: text/html; charset=UTF-8\r\n"));
        assert!(text.contains("Content-Length: 17\r\n"));
        assert!(text.contains("\r\n\r\n<html>gone</html>"));
    }

    #[test]
    fn fills_in_date_and_server() {
        let raw = Response::new(Version::Http11).into_bytes();
        let all = lines(&raw);

        assert!(all.iter().any(|l| l.starts_with("Date: ")));
        assert!(all.iter().any(|l| l.starts_with("Server: serve-a-file/")));
        assert!(all.iter().any(|l| l == "Content-Length: 0"));

        let date = all.iter().find(|l| l.starts_with("Date: ")).unwrap();
        assert!(date.ends_with(" GMT"));
    }

    #[test]
    fn explicit_content_length_is_preserved() {
        let mut response = Response::new(Version::Http11);
        response.set_header(header::CONTENT_LENGTH, "12345");

        let raw = response.into_bytes();
        let text = String::from_utf8_lossy(&raw).into_owned();
        assert!(text.contains("Content-Length: 12345\r\n"));
        // Head only: the payload rides a separate write.
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn set_header_replaces_existing_value() {
        let mut response = Response::new(Version::Http10);
        response.set_header(header::CONNECTION, "keep-alive");
        response.set_header(header::CONNECTION, "close");

        let raw = response.into_bytes();
        let text = String::from_utf8_lossy(&raw).into_owned();
        assert_eq!(text.matches("Connection:").count(), 1);
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
    }
}
