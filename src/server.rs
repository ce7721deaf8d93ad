//! HTTP server for the dashboard
//! Simple HTTP/1.1 server using tokio and basic request handling

use crate::app::App;
use crate::error::ArgoError;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    /// Path without query string, trailing slash or `/api` prefix
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let header_end = find_header_end(raw)?;
        let head = std::str::from_utf8(&raw[..header_end]).ok()?;
        let mut lines = head.split("\r\n");

        let request_line = lines.next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_uppercase();
        let target = parts.next()?;

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            // First occurrence wins, as in `content_length`
            if let Some((key, value)) = line.split_once(':') {
                headers
                    .entry(key.trim().to_lowercase())
                    .or_insert_with(|| value.trim().to_string());
            }
        }

        let body_start = header_end + 4;
        let body_len = content_length(&raw[..header_end]).unwrap_or(raw.len().saturating_sub(body_start));
        let body_end = body_start.saturating_add(body_len).min(raw.len());

        Some(Self {
            method,
            path: normalize_path(target),
            headers,
            body: raw.get(body_start..body_end).unwrap_or_default().to_vec(),
        })
    }

    pub fn json_body(&self) -> std::result::Result<Value, String> {
        if self.body.is_empty() {
            return Err("Request body is empty".to_string());
        }
        serde_json::from_slice(&self.body).map_err(|e| format!("Invalid JSON body: {}", e))
    }
}

fn normalize_path(target: &str) -> String {
    let path = target.split('?').next().unwrap_or("/");
    let path = path.strip_prefix("/api").filter(|p| p.is_empty() || p.starts_with('/')).unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &[u8]) -> Option<usize> {
    let head = std::str::from_utf8(head).ok()?;
    head.lines()
        .find(|line| line.to_lowercase().starts_with("content-length:"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|value| value.trim().parse().ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn serialized<T: serde::Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self { status, body },
            Err(e) => Self::json(500, &json!({"error": "Failed to serialize response", "details": e.to_string()})),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: String::new(),
        }
    }

    pub fn json_value(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: application/json\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            status_text(self.status),
            self.body.len(),
            self.body
        )
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Maps a pipeline error to the response the GUI expects.
pub fn error_response(err: &ArgoError, context: &str) -> HttpResponse {
    let status = err.status_code();
    let body = match err {
        ArgoError::FilterParse { message, raw } => json!({"error": message, "raw": raw}),
        _ if status == 400 => json!({"error": err.to_string()}),
        _ => json!({"error": context, "details": err.to_string()}),
    };
    HttpResponse::json(status, &body)
}

pub async fn handle_request(app: &App, request: &HttpRequest) -> HttpResponse {
    info!("{} {}", request.method, request.path);

    match (request.method.as_str(), request.path.as_str()) {
        ("OPTIONS", _) => HttpResponse::no_content(),
        ("GET", "/health") => HttpResponse::json(200, &json!({"status": "ok", "service": "argo-insight"})),
        ("GET", "/data/profiles") => match app.all_profiles().await {
            Ok(profiles) => HttpResponse::serialized(200, &profiles),
            Err(e) => {
                error!("Failed to fetch profiles: {}", e);
                error_response(&e, "Failed to fetch profiles")
            }
        },
        ("POST", "/data/profiles") => {
            let body = match request.json_body() {
                Ok(body) => body,
                Err(msg) => return HttpResponse::json(400, &json!({"error": msg})),
            };
            match app.ingestor.ingest(&body).await {
                Ok(report) => HttpResponse::serialized(200, &report),
                Err(ArgoError::Validation(_)) => {
                    HttpResponse::json(400, &json!({"error": "Expected an array of profiles"}))
                }
                Err(e) => error_response(&e, "Failed to ingest profiles"),
            }
        }
        ("POST", "/chat/query") => {
            let query = match request.json_body() {
                Ok(body) => match body.get("query").and_then(Value::as_str) {
                    Some(q) => q.to_string(),
                    None => {
                        return HttpResponse::json(400, &json!({"error": "Expected a JSON body with a 'query' string"}))
                    }
                },
                Err(msg) => return HttpResponse::json(400, &json!({"error": msg})),
            };
            match app.chat.answer(&query).await {
                Ok(response) => HttpResponse::serialized(200, &response),
                Err(e) => error_response(&e, "Failed to process chat query"),
            }
        }
        ("GET", "/chat/history") => HttpResponse::serialized(200, &app.chat.history().recent()),
        _ => HttpResponse::json(404, &json!({"error": format!("No route for {} {}", request.method, request.path)})),
    }
}

/// Accept connections until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Arc<App>) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!("New connection from: {}", addr);
                    tokio::spawn(handle_connection(stream, Arc::clone(&app)));
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

enum ReadOutcome {
    Complete(Vec<u8>),
    TooLarge,
    Closed,
}

async fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> std::io::Result<ReadOutcome> {
    // Headers are small; the limit is for bodies
    let max_total = max_body_bytes.saturating_add(64 * 1024);
    let mut buffer = Vec::new();
    let mut temp_buf = [0u8; 8192];

    loop {
        let n = stream.read(&mut temp_buf).await?;
        if n == 0 {
            return Ok(if buffer.is_empty() {
                ReadOutcome::Closed
            } else {
                ReadOutcome::Complete(buffer)
            });
        }
        buffer.extend_from_slice(&temp_buf[..n]);

        if let Some(header_end) = find_header_end(&buffer) {
            let body_len = content_length(&buffer[..header_end]).unwrap_or(0);
            if body_len > max_body_bytes {
                return Ok(ReadOutcome::TooLarge);
            }
            if buffer.len() >= header_end + 4 + body_len {
                return Ok(ReadOutcome::Complete(buffer));
            }
        }
        if buffer.len() > max_total {
            return Ok(ReadOutcome::TooLarge);
        }
    }
}

async fn handle_connection(mut stream: TcpStream, app: Arc<App>) {
    let read_result = tokio::time::timeout(
        app.config.read_timeout,
        read_request(&mut stream, app.config.max_body_bytes),
    )
    .await;

    let response = match read_result {
        Err(_) => {
            warn!("Request read timeout");
            HttpResponse::json(408, &json!({"error": "Request read timeout"}))
        }
        Ok(Err(e)) => {
            warn!("Failed to read from stream: {}", e);
            return;
        }
        Ok(Ok(ReadOutcome::Closed)) => return,
        Ok(Ok(ReadOutcome::TooLarge)) => {
            HttpResponse::json(413, &json!({"error": "Request body too large"}))
        }
        Ok(Ok(ReadOutcome::Complete(raw))) => match HttpRequest::parse(&raw) {
            Some(request) => handle_request(&app, &request).await,
            None => HttpResponse::json(400, &json!({"error": "Malformed HTTP request"})),
        },
    };

    if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
    let _ = stream.shutdown().await;
}
