//! A tiny synchronous HTTP/1.0 server used in place of a mocking framework
//! (`sack::MetadataSource` is the trait seam in production code; here we
//! just stand a real listener up on loopback so `reqwest` talks to
//! something real). Serves a fixed map of path -> bytes, one connection at
//! a time, for as long as the test process lives.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

pub struct TestServer {
    pub base_url: String,
}

impl TestServer {
    /// Start serving `routes` (path, including leading `/`, -> response
    /// body) on an OS-assigned loopback port. The accept loop runs in a
    /// detached thread for the lifetime of the test binary.
    pub fn start(routes: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().expect("local_addr").port();
        let routes = Arc::new(routes);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let routes = Arc::clone(&routes);
                thread::spawn(move || handle(stream, &routes));
            }
        });

        TestServer {
            base_url: format!("http://127.0.0.1:{}", port),
        }
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Vec<u8>>) {
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let Some(request_line) = request.lines().next() else {
        return;
    };
    let mut parts = request_line.split_whitespace();
    let _method = parts.next();
    let path = parts.next().unwrap_or("/");

    let response = match routes.get(path) {
        Some(body) => format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes()
        .into_iter()
        .chain(body.iter().copied())
        .collect::<Vec<u8>>(),
        None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    };

    let _ = stream.write_all(&response);
    let _ = stream.flush();
}
