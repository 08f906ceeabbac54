//! Minimal HTTP/1.1 server standing in for a JSON catalog and its mirrors.
//!
//! Routes map a request target (path plus query) to a status and a body.
//! Routes can be changed while the server runs, and every request target is
//! recorded so tests can count hits.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone, Default)]
pub struct CatalogServer {
    base: String,
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl CatalogServer {
    /// Starts a server in a background thread. It runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let server = CatalogServer {
            base: format!("http://127.0.0.1:{}/", port),
            ..Default::default()
        };
        let shared = server.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let shared = shared.clone();
                thread::spawn(move || shared.handle(stream));
            }
        });
        server
    }

    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, target: &str) -> String {
        format!("{}{}", self.base, target.trim_start_matches('/'))
    }

    pub fn route(&self, target: &str, status: u16, body: impl Into<Vec<u8>>) {
        let target = format!("/{}", target.trim_start_matches('/'));
        self.routes.lock().unwrap().insert(target, (status, body.into()));
    }

    pub fn route_json(&self, target: &str, value: serde_json::Value) {
        self.route(target, 200, value.to_string());
    }

    /// Requests whose target starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        let prefix = format!("/{}", prefix.trim_start_matches('/'));
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.starts_with(&prefix))
            .count()
    }

    fn handle(&self, mut stream: std::net::TcpStream) {
        let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
        let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
        let mut buf = [0u8; 8192];
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let Ok(request) = std::str::from_utf8(&buf[..n]) else {
            return;
        };
        let mut parts = request.lines().next().unwrap_or("").split_whitespace();
        let method = parts.next().unwrap_or("");
        let target = parts.next().unwrap_or("/").to_string();
        if !method.eq_ignore_ascii_case("GET") {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
            return;
        }
        self.hits.lock().unwrap().push(target.clone());

        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&target)
            .cloned()
            .unwrap_or((404, b"not found".to_vec()));
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            if status < 400 { "OK" } else { "Error" },
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(&body);
    }
}
