//! HTTP request parsing.
//!
//! One completed read is treated as one request head, the way the engine
//! delivers it. Bodies are not consumed; this server has no use for them.

use crate::http::{Method, Version};
use std::collections::HashMap;
use thiserror::Error;

/// Errors answering with 400 Bad Request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("request head is truncated")]
    Truncated,

    #[error("malformed request line")]
    InvalidRequestLine,

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("unsupported protocol version '{0}'")]
    UnsupportedVersion(String),
}

/// A parsed request head.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    version: Version,
    headers: HashMap<String, String>,
    params: HashMap<String, String>,
}

impl Request {
    /// Parse a request head from one read's payload.
    ///
    /// The head must be complete (terminated by a blank line). Header names
    /// are matched case-insensitively; malformed header lines are skipped
    /// rather than fatal. Query parameters split on `&` or `;`.
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let text = String::from_utf8_lossy(payload);
        let head = match text.split_once("\r\n\r\n") {
            Some((head, _body)) => head,
            None => return Err(ParseError::Truncated),
        };

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::InvalidRequestLine)?;
        let (method, path, params, version) = parse_request_line(request_line)?;

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Ok(Self {
            method,
            path,
            version,
            headers,
            params,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Request path before the query string, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[allow(dead_code)]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Connection persistence decision for this request.
    ///
    /// An explicit `Connection` header wins; otherwise the version default
    /// applies (persistent for HTTP/1.1, not for HTTP/1.0).
    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            _ => self.version == Version::Http11,
        }
    }
}

type RequestLine = (Method, String, HashMap<String, String>, Version);

fn parse_request_line(line: &str) -> Result<RequestLine, ParseError> {
    let mut fields = line.split(' ').filter(|field| !field.is_empty());
    let method_token = fields.next().ok_or(ParseError::InvalidRequestLine)?;
    let target = fields.next().ok_or(ParseError::InvalidRequestLine)?;
    let version_token = fields.next().ok_or(ParseError::InvalidRequestLine)?;
    if fields.next().is_some() {
        return Err(ParseError::InvalidRequestLine);
    }

    let method = Method::from_token(method_token)
        .ok_or_else(|| ParseError::UnknownMethod(method_token.to_string()))?;
    let version = Version::from_token(version_token)
        .ok_or_else(|| ParseError::UnsupportedVersion(version_token.to_string()))?;

    let (path, params) = match target.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (target, HashMap::new()),
    };

    Ok((method, path.to_string(), params, version))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split(['&', ';'])
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_headers_and_query() {
        let raw = b"GET /files/a.txt?sort=name;order=desc HTTP/1.1\r\n\
                    Host: localhost:8080\r\n\
                    Connection: keep-alive\r\n\
                    \r\n";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.path(), "/files/a.txt");
        assert_eq!(request.version(), Version::Http11);
        assert_eq!(request.header("host"), Some("localhost:8080"));
        assert_eq!(request.header("Connection"), Some("keep-alive"));
        assert_eq!(request.param("sort"), Some("name"));
        assert_eq!(request.param("order"), Some("desc"));
        assert!(request.keep_alive());
    }

    #[test]
    fn keep_alive_defaults_follow_version() {
        let http11 = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(http11.keep_alive());

        let http10 = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!http10.keep_alive());
    }

    #[test]
    fn explicit_connection_header_wins() {
        let close =
            Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!close.keep_alive());

        let keep =
            Request::parse(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n").unwrap();
        assert!(keep.keep_alive());
    }

    #[test]
    fn truncated_head_is_rejected() {
        assert_eq!(
            Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap_err(),
            ParseError::Truncated
        );
    }

    #[test]
    fn malformed_request_lines_are_rejected() {
        assert_eq!(
            Request::parse(b"GET /\r\n\r\n").unwrap_err(),
            ParseError::InvalidRequestLine
        );
        assert_eq!(
            Request::parse(b"BREW / HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::UnknownMethod("BREW".to_string())
        );
        assert_eq!(
            Request::parse(b"GET / HTTP/2.0\r\n\r\n").unwrap_err(),
            ParseError::UnsupportedVersion("HTTP/2.0".to_string())
        );
    }

    #[test]
    fn malformed_header_lines_are_skipped() {
        let request =
            Request::parse(b"GET / HTTP/1.1\r\nno-colon-here\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(request.header("host"), Some("x"));
        assert_eq!(request.header("no-colon-here"), None);
    }
}
