//! Static content handler.
//!
//! Implements the engine's protocol seam over a document root: parses the
//! request, decides keep-alive, and queues the response buffers. The engine
//! guarantees the buffers reach the client in order, so a file transfer is
//! simply two writes: the response head, then the payload.

use crate::content::{self, DocRoot};
use crate::engine::{Handler, Session};
use crate::http::request::Request;
use crate::http::response::{header, Response, StatusCode};
use crate::http::{Method, Version};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// HTTP protocol handler serving files from a document root.
pub struct HttpHandler {
    docroot: DocRoot,
}

impl HttpHandler {
    /// `root` must already be validated and canonicalized (the config loader
    /// does both).
    pub fn new(root: PathBuf) -> Self {
        Self {
            docroot: DocRoot::new(root),
        }
    }

    fn respond(&self, session: &Session, request: &Request) {
        match request.method() {
            Method::Get => self.do_get(session, request),
            other => {
                debug!(peer = %session.remote_addr(), method = other.as_str(), "method not served");
                self.send_error(session, request.version(), StatusCode::NotImplemented);
            }
        }
    }

    fn do_get(&self, session: &Session, request: &Request) {
        let version = request.version();

        let Some(rel) = content::sanitize_request_path(request.path()) else {
            return self.send_error(session, version, StatusCode::NotFound);
        };

        let Some(real) = self.docroot.resolve(&rel) else {
            return self.send_error(session, version, StatusCode::NotFound);
        };

        if DocRoot::is_hidden(&real) {
            return self.send_error(session, version, StatusCode::NotFound);
        }

        if real.is_dir() {
            // Redirecting to the slash-suffixed path lets the client handle
            // the parent/child relation when browsing.
            if request.path().ends_with('/') {
                self.send_listing(session, request, &real);
            } else {
                self.send_redirect(session, request, &format!("{}/", request.path()));
            }
            return;
        }

        self.send_file(session, request, &real);
    }

    fn send_file(&self, session: &Session, request: &Request, file: &Path) {
        match self.docroot.read(file) {
            Ok(data) => {
                debug!(peer = %session.remote_addr(), file = %file.display(), bytes = data.len(), "sending file");
                let mut response = Response::new(request.version());
                response.set_header(header::CONTENT_TYPE, "application/octet-stream");
                response.set_header(header::CONTENT_LENGTH, data.len().to_string());
                self.set_connection(session, &mut response);
                // Head and payload ride the write queue as two buffers.
                session.write(response.into_bytes());
                session.write(Bytes::from(data));
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to read file");
                self.send_error(session, request.version(), StatusCode::InternalServerError);
            }
        }
    }

    fn send_listing(&self, session: &Session, request: &Request, dir: &Path) {
        let names = match self.docroot.list(dir) {
            Ok(names) => names,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list directory");
                return self.send_error(session, request.version(), StatusCode::InternalServerError);
            }
        };

        debug!(peer = %session.remote_addr(), dir = %dir.display(), entries = names.len(), "sending listing");
        let mut response = Response::new(request.version());
        response.set_header(header::CONTENT_TYPE, "text/html; charset=UTF-8");
        self.set_connection(session, &mut response);
        response.append_body(&render_listing(&self.listing_title(dir), &names));
        session.write(response.into_bytes());
    }

    fn send_redirect(&self, session: &Session, request: &Request, location: &str) {
        let mut response = Response::new(request.version());
        response.set_status(StatusCode::Found);
        response.set_header(header::LOCATION, location);
        self.set_connection(session, &mut response);
        session.write(response.into_bytes());
    }

    /// Error responses always end the connection.
    fn send_error(&self, session: &Session, version: Version, status: StatusCode) {
        session.set_keep_alive(false);
        let mut response = Response::new(version);
        response.set_status(status);
        response.set_header(header::CONTENT_TYPE, "text/html; charset=UTF-8");
        response.set_header(header::CONNECTION, "close");
        response.append_body(&format!(
            "<html><head><title>{code} {reason}</title></head><body><h3>{code} {reason}</h3></body></html>\r\n",
            code = status.code(),
            reason = status.reason(),
        ));
        session.write(response.into_bytes());
    }

    fn set_connection(&self, session: &Session, response: &mut Response) {
        let value = if session.keep_alive() {
            "keep-alive"
        } else {
            "close"
        };
        response.set_header(header::CONNECTION, value);
    }

    /// Name shown in a directory listing: the directory's own name, or "/"
    /// for the document root itself.
    fn listing_title(&self, dir: &Path) -> String {
        dir.strip_prefix(self.docroot.root())
            .ok()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }
}

impl Handler for HttpHandler {
    fn on_message(&self, session: &Session, payload: &[u8]) {
        match Request::parse(payload) {
            Ok(request) => {
                debug!(
                    peer = %session.remote_addr(),
                    method = request.method().as_str(),
                    path = %request.path(),
                    "request"
                );
                session.set_keep_alive(request.keep_alive());
                self.respond(session, &request);
            }
            Err(e) => {
                debug!(peer = %session.remote_addr(), error = %e, "malformed request");
                self.send_error(session, Version::Http11, StatusCode::BadRequest);
            }
        }
    }
}

fn render_listing(title: &str, names: &[String]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\r\n");
    html.push_str("<html><head><title>Listing of: ");
    html.push_str(title);
    html.push_str("</title></head><body>\r\n");
    html.push_str("<h3>Listing of: ");
    html.push_str(title);
    html.push_str("</h3>\r\n");
    html.push_str("<ul>");
    html.push_str("<li><a href=\"../\">..</a></li>\r\n");
    for name in names {
        html.push_str("<li><a href=\"");
        html.push_str(name);
        html.push_str("\">");
        html.push_str(name);
        html.push_str("</a></li>\r\n");
    }
    html.push_str("</ul></body></html>\r\n");
    html
}
