use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEntry, ContentCache};
use crate::config::ServerConfig;
use crate::mime::TypeMap;
use crate::resolve;

const MAX_REQUEST_LINE: usize = 8192;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Shared state for every request task: the immutable configuration plus the
/// two concurrent maps.
pub struct Server {
    pub config: ServerConfig,
    pub cache: ContentCache,
    pub types: TypeMap,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            cache: ContentCache::new(),
            types: TypeMap::new(),
        }
    }

    /// Accept loop: one spawned task per connection, no worker pool. Runs
    /// until the caller drops or aborts it.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(serve_connection(Arc::clone(&self), stream));
                }
                Err(err) => warn!("accept failed: {err}"),
            }
        }
    }
}

/// Keep-alive request loop over one connection. No read or write timeouts:
/// a slow peer holds its task until it hangs up.
pub async fn serve_connection(server: Arc<Server>, mut stream: TcpStream) {
    loop {
        let mut reader = BufReader::new(&mut stream);
        let mut request_line = String::new();
        match reader.read_line(&mut request_line).await {
            Ok(0) | Err(_) => break,
            Ok(n) if n > MAX_REQUEST_LINE => {
                let _ = write_response(
                    &mut stream,
                    413,
                    "Request Entity Too Large",
                    Some(TEXT_PLAIN),
                    b"request too large",
                    false,
                    false,
                )
                .await;
                break;
            }
            Ok(_) => {}
        }
        if request_line.trim().is_empty() {
            // Keep-alive idle line; wait for the next request.
            continue;
        }

        let Some((method, target, version)) = parse_request_line(request_line.trim()) else {
            let _ = write_response(
                &mut stream,
                400,
                "Bad Request",
                Some(TEXT_PLAIN),
                b"malformed request",
                false,
                false,
            )
            .await;
            break;
        };

        let mut keep_alive = version == "HTTP/1.1";
        let mut header = String::new();
        loop {
            header.clear();
            match reader.read_line(&mut header).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = header.trim();
                    if line.is_empty() {
                        break;
                    }
                    if header_starts_with(line, "connection:") {
                        let close = header_has_token(line, "close");
                        keep_alive = !close
                            && (version == "HTTP/1.1" || header_has_token(line, "keep-alive"));
                    }
                }
            }
        }

        let sent = if method == "OPTIONS" {
            // Short-circuits before path resolution; a bare 200 regardless of
            // what was asked for.
            debug!("{} OPTIONS", target);
            write_response(&mut stream, 200, "OK", None, b"", false, keep_alive).await
        } else {
            handle_request(&server, &mut stream, target, method == "HEAD", keep_alive).await
        };

        if sent.is_err() || !keep_alive {
            break;
        }
    }
}

/// Resolve, consult the cache, read, type, store, respond. At most one retry
/// against the default document when the first open fails.
async fn handle_request(
    server: &Server,
    stream: &mut TcpStream,
    target: &str,
    head: bool,
    keep_alive: bool,
) -> io::Result<()> {
    let cfg = &server.config;
    let resolution = resolve::resolve(&cfg.root, &cfg.default_doc, &cfg.default_doc_path, target);
    let original = resolution.original;
    let mut full_path = resolution.full_path;
    let mut fell_back = false;

    loop {
        let rel = resolve::rel_path(&cfg.root, &full_path);

        // The cache key is the final resolved path, never the raw target.
        if cfg.cache_enabled {
            if let Some(entry) = server.cache.lookup(&full_path) {
                log_result(&original, &rel, &entry.content_type, true);
                return write_response(
                    stream,
                    200,
                    "OK",
                    Some(&entry.content_type),
                    &entry.content,
                    head,
                    keep_alive,
                )
                .await;
            }
        }

        let mut file = match File::open(&full_path).await {
            Ok(file) => file,
            Err(err) => {
                if !fell_back && full_path != cfg.default_doc_path {
                    warn!("unable to open file: {}", full_path.display());
                    full_path = cfg.default_doc_path.clone();
                    fell_back = true;
                    continue;
                }
                error!("unable to open file: {}", full_path.display());
                error!("{} => ??? (404)", original);
                let body = format!("{}: {}", full_path.display(), err);
                return write_response(
                    stream,
                    404,
                    "Not Found",
                    Some(TEXT_PLAIN),
                    body.as_bytes(),
                    head,
                    keep_alive,
                )
                .await;
            }
        };

        let mut content = Vec::new();
        if file.read_to_end(&mut content).await.is_err() {
            // Open succeeded but the read did not; no fallback for this case.
            error!("unable to read file: {}", full_path.display());
            error!("{} => ??? (500)", original);
            return write_response(
                stream,
                500,
                "Internal Server Error",
                Some(TEXT_PLAIN),
                b"unable to read file",
                head,
                keep_alive,
            )
            .await;
        }

        let content_type = server.types.resolve(&full_path, &content);
        let entry = Arc::new(CacheEntry {
            content,
            content_type,
        });
        if cfg.cache_enabled {
            server.cache.store(full_path.clone(), Arc::clone(&entry));
        }

        log_result(&original, &rel, &entry.content_type, false);
        return write_response(
            stream,
            200,
            "OK",
            Some(&entry.content_type),
            &entry.content,
            head,
            keep_alive,
        )
        .await;
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    content_type: Option<&str>,
    body: &[u8],
    head: bool,
    keep_alive: bool,
) -> io::Result<()> {
    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\n{}Content-Length: {}\r\nDate: {}\r\nConnection: {}\r\n\r\n",
        content_type
            .map(|ty| format!("Content-Type: {ty}\r\n"))
            .unwrap_or_default(),
        body.len(),
        httpdate::fmt_http_date(SystemTime::now()),
        if keep_alive { "keep-alive" } else { "close" },
    )
    .into_bytes();

    // HEAD carries the same headers as GET and no body.
    if !head {
        response.extend_from_slice(body);
    }
    stream.write_all(&response).await?;
    stream.flush().await
}

// One result record per completed request. WARN when the served path differs
// from the requested one.
fn log_result(original: &str, rel: &str, content_type: &str, cached: bool) {
    if original == rel {
        info!(cached, "{} => {} ({})", original, rel, content_type);
    } else {
        warn!(cached, "{} => {} ({})", original, rel, content_type);
    }
}

// Request line split without allocation: method, target, version, nothing
// trailing.
fn parse_request_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.split_ascii_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((method, target, version))
}

fn header_starts_with(line: &str, prefix: &str) -> bool {
    let line = line.as_bytes();
    let prefix = prefix.as_bytes();
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

// Case-insensitive token scan of a header value.
fn header_has_token(line: &str, token: &str) -> bool {
    match line.split_once(':') {
        Some((_, value)) => value
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(token)),
        None => false,
    }
}
