use std::fs;
use std::path::Path;
use std::sync::Arc;

use dirserv::config::{Args, ServerConfig};
use dirserv::serve::Server;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server(root: &Path) -> u16 {
    let config = ServerConfig::from_args(Args {
        directory: root.to_path_buf(),
        default_doc: "index.html".to_string(),
        port: 0,
        cache: false,
        load: false,
    })
    .expect("valid test configuration");

    let server = Arc::new(Server::new(config));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let port = listener.local_addr().expect("listener address").port();
    tokio::spawn(server.run(listener));
    port
}

async fn send(port: u16, raw: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to test server");
    stream.write_all(raw.as_bytes()).await.expect("send request");
    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .expect("read response");
    response
}

fn header_value(headers: &str, name: &str) -> Option<String> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let pos = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator")
        + 4;
    (
        String::from_utf8_lossy(&raw[..pos]).into_owned(),
        raw[pos..].to_vec(),
    )
}

// Read exactly one framed response off a keep-alive connection.
async fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.expect("read headers");
        assert!(n > 0, "connection closed before headers completed");
        buf.extend_from_slice(&chunk[..n]);
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let length: usize = header_value(&headers, "Content-Length")
        .expect("content-length present")
        .parse()
        .expect("numeric content-length");
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await.expect("read body");
        assert!(n > 0, "connection closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    (headers, buf[header_end..header_end + length].to_vec())
}

#[cfg(test)]
mod options_tests {
    use super::*;

    #[tokio::test]
    async fn test_options_returns_bare_200() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();
        let port = start_server(tmp.path()).await;

        let raw = send(
            port,
            "OPTIONS / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        let (headers, body) = split_response(&raw);
        assert!(headers.starts_with("HTTP/1.1 200 OK"), "{headers}");
        assert!(body.is_empty());
        assert_eq!(header_value(&headers, "Content-Length").as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_options_ignores_path_validity() {
        let tmp = TempDir::new().unwrap();
        let port = start_server(tmp.path()).await;

        // No files exist at all; OPTIONS still succeeds.
        let raw = send(
            port,
            "OPTIONS /no/such/path HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        let (headers, body) = split_response(&raw);
        assert!(headers.starts_with("HTTP/1.1 200 OK"));
        assert!(body.is_empty());
    }
}

#[cfg(test)]
mod method_tests {
    use super::*;

    #[tokio::test]
    async fn test_any_method_is_served() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "<html>any</html>").unwrap();
        let port = start_server(tmp.path()).await;

        for method in ["POST", "PUT", "DELETE", "PATCH"] {
            let raw = send(
                port,
                &format!(
                    "{method} /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
                ),
            )
            .await;
            let (headers, body) = split_response(&raw);
            assert!(
                headers.starts_with("HTTP/1.1 200 OK"),
                "{method} should hit the catch-all route: {headers}"
            );
            assert_eq!(body, b"<html>any</html>");
        }
    }
}

#[cfg(test)]
mod request_parsing_tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_request_line_rejected() {
        let tmp = TempDir::new().unwrap();
        let port = start_server(tmp.path()).await;

        let raw = send(port, "GARBAGE\r\n").await;
        let (headers, _) = split_response(&raw);
        assert!(headers.starts_with("HTTP/1.1 400 Bad Request"), "{headers}");
    }

    #[tokio::test]
    async fn test_extra_request_line_tokens_rejected() {
        let tmp = TempDir::new().unwrap();
        let port = start_server(tmp.path()).await;

        let raw = send(port, "GET /index.html HTTP/1.1 surprise\r\n").await;
        let (headers, _) = split_response(&raw);
        assert!(headers.starts_with("HTTP/1.1 400 Bad Request"));
    }
}

#[cfg(test)]
mod connection_tests {
    use super::*;

    #[tokio::test]
    async fn test_keep_alive_serves_sequential_requests() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "<html>home</html>").unwrap();
        fs::write(tmp.path().join("two.html"), "<html>two</html>").unwrap();
        let port = start_server(tmp.path()).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect");

        stream
            .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let (first_headers, first_body) = read_response(&mut stream).await;
        assert!(first_headers.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(first_body, b"<html>home</html>");
        assert_eq!(
            header_value(&first_headers, "Connection").as_deref(),
            Some("keep-alive")
        );

        stream
            .write_all(b"GET /two.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let (second_headers, second_body) = read_response(&mut stream).await;
        assert!(second_headers.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(second_body, b"<html>two</html>");
        assert_eq!(
            header_value(&second_headers, "Connection").as_deref(),
            Some("close")
        );

        // After Connection: close the server hangs up.
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_http10_closes_by_default() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("index.html"), "<html></html>").unwrap();
        let port = start_server(tmp.path()).await;

        let raw = send(port, "GET / HTTP/1.0\r\nHost: localhost\r\n\r\n").await;
        let (headers, _) = split_response(&raw);
        assert!(headers.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(
            header_value(&headers, "Connection").as_deref(),
            Some("close")
        );
    }
}

#[cfg(test)]
mod error_response_tests {
    use super::*;

    #[tokio::test]
    async fn test_404_body_is_plain_text_error() {
        let tmp = TempDir::new().unwrap();
        let port = start_server(tmp.path()).await;

        let raw = send(
            port,
            "GET /missing.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        let (headers, body) = split_response(&raw);
        assert!(headers.starts_with("HTTP/1.1 404 Not Found"));
        assert_eq!(
            header_value(&headers, "Content-Type").as_deref(),
            Some("text/plain; charset=utf-8")
        );
        assert!(!body.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_read_is_a_500() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("assets")).unwrap();
        let port = start_server(tmp.path()).await;

        // Opening a directory succeeds, reading it does not: the 500 path.
        let raw = send(
            port,
            "GET /assets HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        let (headers, body) = split_response(&raw);
        assert!(
            headers.starts_with("HTTP/1.1 500 Internal Server Error"),
            "{headers}"
        );
        assert_eq!(body, b"unable to read file");
    }
}
