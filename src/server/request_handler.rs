use log::{debug, error, info, warn};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::http_status::HttpStatus;
use super::path_mapper;
use super::responder::{self, ResponseOutcome};
use super::root::ServedRoot;

/// A fully built response, serialized once the worker is ready to write.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: HttpStatus,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub no_store: bool,
    pub head_only: bool,
}

impl Response {
    fn text(status: HttpStatus, body: String) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into_bytes(),
            no_store: false,
            head_only: false,
        }
    }

    fn from_outcome(outcome: ResponseOutcome) -> Self {
        match outcome {
            ResponseOutcome::Success { body, content_type } => Self {
                status: HttpStatus::Ok,
                content_type,
                body,
                no_store: true,
                head_only: false,
            },
            ResponseOutcome::Forbidden => Self::text(HttpStatus::Forbidden, "Forbidden".into()),
            ResponseOutcome::NotFound { requested } => {
                Self::text(HttpStatus::NotFound, format!("Not Found: {}", requested))
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut headers = format!(
            "{}Content-Type: {}\r\nContent-Length: {}\r\n",
            self.status.as_response_line(),
            self.content_type,
            self.body.len()
        );
        if self.no_store {
            headers.push_str("Cache-Control: no-store\r\n");
        }
        headers.push_str("Connection: close\r\n\r\n");

        let mut bytes = headers.into_bytes();
        if !self.head_only {
            bytes.extend_from_slice(&self.body);
        }
        bytes
    }
}

/// Serves exactly one request on `stream`, then lets it close.
///
/// The whole request head must arrive within `head_timeout`, counted from the
/// moment a worker picks the connection up.
pub fn handle_client(
    mut stream: TcpStream,
    root: &ServedRoot,
    max_request_size: usize,
    head_timeout: Duration,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown".to_string(),
    };

    debug!(
        "[Thread {:?}] Handling request from {}",
        std::thread::current().id(),
        peer_addr
    );

    let deadline = Instant::now() + head_timeout;
    let head = match read_request_head(&mut stream, max_request_size, deadline) {
        Ok(Some(head)) => head,
        Ok(None) => {
            debug!("Connection closed by client {}", peer_addr);
            return;
        }
        Err(e) => {
            warn!("Error reading from {}: {}", peer_addr, e);
            return;
        }
    };

    let response = build_response(root, &head);
    send_response(&mut stream, &response, &peer_addr);
}

/// Reads until the blank line ending the request head.
///
/// `Ok(None)` means the client hung up before sending anything. A head that
/// outgrows `max_size` comes back empty so the parser rejects it. Each read is
/// bounded by what is left until `deadline`, so a trickling client cannot hold
/// the worker past it.
fn read_request_head(
    stream: &mut TcpStream,
    max_size: usize,
    deadline: Instant,
) -> io::Result<Option<Vec<u8>>> {
    let mut request = Vec::with_capacity(1024);
    let mut buffer = [0u8; 1024];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request head not received in time",
            ));
        }
        stream.set_read_timeout(Some(remaining))?;

        let n = stream.read(&mut buffer)?;
        if n == 0 {
            return Ok(if request.is_empty() { None } else { Some(request) });
        }
        request.extend_from_slice(&buffer[..n]);

        if request.len() > max_size {
            warn!("Request head exceeds {} bytes", max_size);
            request.clear();
            return Ok(Some(request));
        }
        if contains_double_newline(&request) {
            return Ok(Some(request));
        }
    }
}

/// Routes a raw request head through the path mapper and responder.
pub fn build_response(root: &ServedRoot, head: &[u8]) -> Response {
    let bad_request = || Response::text(HttpStatus::BadRequest, "Bad Request".into());

    let request = String::from_utf8_lossy(head);
    let request_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        debug!("Malformed request line: {:?}", request_line);
        return bad_request();
    }

    let method = parts[0];
    let Some(path) = request_path(parts[1]) else {
        info!("Rejected undecodable target {:?}", parts[1]);
        return bad_request();
    };

    let outcome = match path_mapper::map(root, &path) {
        Ok(target) => responder::respond(&target),
        Err(escape) => {
            info!("{}", escape);
            ResponseOutcome::Forbidden
        }
    };

    let mut response = Response::from_outcome(outcome);
    response.head_only = method.eq_ignore_ascii_case("HEAD");

    info!("{} {} -> {}", method, path, response.status.code());
    response
}

/// Extracts the decoded path of a request target, dropping scheme and
/// authority of an absolute-form target and any query or fragment.
fn request_path(target: &str) -> Option<String> {
    let mut raw = target.split(['?', '#']).next().unwrap_or("");
    if !raw.starts_with('/') {
        if let Some((_, rest)) = raw.split_once("://") {
            raw = &rest[rest.find('/').unwrap_or(rest.len())..];
        }
    }

    let path = if raw.is_empty() {
        "/".to_string()
    } else {
        percent_decode(raw)?
    };
    if !path.starts_with('/') {
        return None;
    }
    Some(path)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let hex = std::str::from_utf8(hex).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(decoded).ok()
}

fn send_response(stream: &mut TcpStream, response: &Response, client_addr: &str) {
    if let Err(e) = stream.write_all(&response.to_bytes()) {
        error!("Error sending response to {}: {}", client_addr, e);
        return;
    }
    if let Err(e) = stream.flush() {
        error!("Error flushing stream for {}: {}", client_addr, e);
    }
}

fn contains_double_newline(buffer: &[u8]) -> bool {
    buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.windows(2).any(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::TcpListener;
    use std::thread;
    use tempfile::{TempDir, tempdir};

    fn site() -> (TempDir, ServedRoot) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/app.css"), "body{}").unwrap();
        let root = ServedRoot::from_dir(dir.path()).unwrap();
        (dir, root)
    }

    fn get(root: &ServedRoot, target: &str) -> Response {
        build_response(root, format!("GET {} HTTP/1.1\r\nHost: x\r\n\r\n", target).as_bytes())
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(percent_decode("/a%20b.html").as_deref(), Some("/a b.html"));
        assert_eq!(percent_decode("/%2e%2E/x").as_deref(), Some("/../x"));
        assert_eq!(percent_decode("/caf%C3%A9").as_deref(), Some("/café"));
        assert_eq!(percent_decode("/bad%2"), None);
        assert_eq!(percent_decode("/bad%+1"), None);
        assert_eq!(percent_decode("/bad%zz"), None);
        assert_eq!(percent_decode("/%ff"), None);
    }

    #[test]
    fn request_path_drops_query_fragment_and_authority() {
        assert_eq!(request_path("/index.html?v=2").as_deref(), Some("/index.html"));
        assert_eq!(request_path("/a.js#top").as_deref(), Some("/a.js"));
        assert_eq!(
            request_path("http://localhost:8787/assets/app.css").as_deref(),
            Some("/assets/app.css")
        );
        assert_eq!(request_path("http://localhost:8787").as_deref(), Some("/"));
        assert_eq!(
            request_path("http://localhost:8787?next=/a").as_deref(),
            Some("/")
        );
        assert_eq!(request_path("*"), None);
    }

    #[test]
    fn url_in_query_does_not_change_the_path() {
        assert_eq!(
            request_path("/index.html?next=http://x/other.html").as_deref(),
            Some("/index.html")
        );
        assert_eq!(
            request_path("/index.html#http://x/other.html").as_deref(),
            Some("/index.html")
        );

        let (dir, root) = site();
        fs::write(dir.path().join("other.html"), "OTHER").unwrap();
        let response = get(&root, "/index.html?next=http://x/other.html");
        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(response.body, b"<h1>hi</h1>");
    }

    fn loopback() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn oversized_head_is_dropped_even_when_terminated() {
        let (mut client, mut server) = loopback();
        let head = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(200));
        client.write_all(head.as_bytes()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let read = read_request_head(&mut server, 64, deadline).unwrap();
        assert_eq!(read, Some(Vec::new()));
        assert_eq!(build_response(&ServedRoot::new_unchecked("/srv"), &[]).status, HttpStatus::BadRequest);
    }

    #[test]
    fn head_within_limit_is_returned_whole() {
        let (mut client, mut server) = loopback();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let read = read_request_head(&mut server, 8192, deadline).unwrap();
        assert_eq!(read.as_deref(), Some(&b"GET / HTTP/1.1\r\n\r\n"[..]));
    }

    #[test]
    fn trickled_head_stops_at_deadline() {
        let (mut client, mut server) = loopback();
        let writer = thread::spawn(move || {
            for byte in b"GET /index.html HTTP/1.1\r\n".iter() {
                if client.write_all(&[*byte]).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        });

        let started = Instant::now();
        let deadline = started + Duration::from_millis(300);
        let err = read_request_head(&mut server, 8192, deadline).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        ));
        assert!(started.elapsed() < Duration::from_secs(1));

        drop(server);
        writer.join().unwrap();
    }

    #[test]
    fn success_carries_no_store() {
        let (_dir, root) = site();
        let response = get(&root, "/assets/app.css");
        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(response.content_type, "text/css; charset=utf-8");
        assert_eq!(response.body, b"body{}");

        let bytes = String::from_utf8(response.to_bytes()).unwrap();
        assert!(bytes.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(bytes.contains("Cache-Control: no-store\r\n"));
        assert!(bytes.contains("Content-Length: 6\r\n"));
        assert!(bytes.ends_with("\r\n\r\nbody{}"));
    }

    #[test]
    fn encoded_traversal_is_forbidden() {
        let (_dir, root) = site();
        let response = get(&root, "/%2e%2e/%2e%2e/etc/passwd");
        assert_eq!(response.status, HttpStatus::Forbidden);
        assert_eq!(response.body, b"Forbidden");
        assert!(!String::from_utf8(response.to_bytes()).unwrap().contains("Cache-Control"));
    }

    #[test]
    fn missing_file_echoes_path() {
        let (_dir, root) = site();
        let response = get(&root, "/nope.html?x=1");
        assert_eq!(response.status, HttpStatus::NotFound);
        assert_eq!(response.body, b"Not Found: /nope.html");
    }

    #[test]
    fn head_omits_body_but_keeps_length() {
        let (_dir, root) = site();
        let response = build_response(&root, b"HEAD / HTTP/1.1\r\n\r\n");
        let bytes = String::from_utf8(response.to_bytes()).unwrap();
        assert!(bytes.contains("Content-Length: 11\r\n"));
        assert!(bytes.ends_with("\r\n\r\n"));
    }

    #[test]
    fn malformed_requests_are_bad_requests() {
        let (_dir, root) = site();
        assert_eq!(build_response(&root, b"").status, HttpStatus::BadRequest);
        assert_eq!(build_response(&root, b"GET\r\n\r\n").status, HttpStatus::BadRequest);
        assert_eq!(get(&root, "/bad%zz").status, HttpStatus::BadRequest);
    }

    #[test]
    fn detects_end_of_head() {
        assert!(contains_double_newline(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(contains_double_newline(b"GET / HTTP/1.1\n\n"));
        assert!(!contains_double_newline(b"GET / HTTP/1.1\r\nHost: x\r\n"));
    }
}
