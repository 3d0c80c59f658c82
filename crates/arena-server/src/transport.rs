//! Plain-HTTP front door and the websocket upgrade path.
//!
//! Every accepted connection starts as HTTP/1.1. Requests carrying
//! `Upgrade: websocket` are answered with `101 Switching Protocols`
//! (whatever their target) and the stream is handed over as a websocket.
//! Anything else gets the canned responder: `200 OK` for `/`, `404 Not
//! Found` for other targets, `400 Bad Request` for requests that do not
//! parse, honoring `Connection: keep-alive`.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{
        handshake::derive_accept_key,
        protocol::{Role, WebSocketConfig},
    },
    WebSocketStream,
};

/// Upper bound on a request head; larger heads drop the connection without a
/// response.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Maximum size of one websocket message accepted from a client.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Canned body served to plain-HTTP clients.
const CANNED_BODY: &str = "FeelsBadMan\r\n";

const BAD_REQUEST_BODY: &str = "<html><body><h1>400 Bad Request</h1></body></html>";

/// Serve plain HTTP on `stream` until the peer upgrades or the conversation
/// ends.
///
/// Returns the upgraded websocket, or `None` when the connection was a pure
/// HTTP exchange (including malformed requests answered with 400).
pub(crate) async fn serve(
    mut stream: TcpStream,
    peer: &SocketAddr,
) -> io::Result<Option<WebSocketStream<TcpStream>>> {
    let mut buffer = Vec::new();

    loop {
        let head = match read_request_head(&mut stream, &mut buffer).await? {
            HeadOutcome::Closed => return Ok(None),
            HeadOutcome::TooLarge => {
                tracing::warn!(%peer, "request head too large, dropping the connection");
                return Ok(None);
            }
            HeadOutcome::Head(head) => head,
        };

        let Some(request) = Request::parse(&head) else {
            tracing::debug!(%peer, "malformed request");
            write_response(&mut stream, "400 Bad Request", "text/html; charset=utf-8", BAD_REQUEST_BODY, false)
                .await?;
            return Ok(None);
        };

        if request.is_upgrade() {
            tracing::debug!(%peer, target = %request.target, "websocket upgrade request");
            return upgrade(stream, &request).await;
        }

        let status = if request.target == "/" { "200 OK" } else { "404 Not Found" };
        write_response(
            &mut stream,
            status,
            "text/plain; charset=utf-8",
            CANNED_BODY,
            request.keep_alive,
        )
        .await?;

        if !request.keep_alive {
            return Ok(None);
        }
    }
}

async fn upgrade(
    mut stream: TcpStream,
    request: &Request,
) -> io::Result<Option<WebSocketStream<TcpStream>>> {
    let Some(key) = request.header("sec-websocket-key") else {
        write_response(&mut stream, "400 Bad Request", "text/html; charset=utf-8", BAD_REQUEST_BODY, false)
            .await?;
        return Ok(None);
    };

    let accept = derive_accept_key(key.as_bytes());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;

    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(MAX_MESSAGE_SIZE);

    Ok(Some(WebSocketStream::from_raw_socket(stream, Role::Server, Some(config)).await))
}

enum HeadOutcome {
    /// One complete request head, terminator included.
    Head(String),
    /// The peer closed before sending a complete head.
    Closed,
    /// The head exceeded [`MAX_REQUEST_HEAD`].
    TooLarge,
}

/// Read one request head from `stream` into `buffer`.
///
/// `buffer` persists across keep-alive requests; bytes past the head stay in
/// it for the next call.
async fn read_request_head(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> io::Result<HeadOutcome> {
    loop {
        if let Some(end) = find_head_end(buffer) {
            let rest = buffer.split_off(end);
            let head = std::mem::replace(buffer, rest);
            // Non-UTF-8 heads fall through to the 400 path via the parser.
            return Ok(HeadOutcome::Head(String::from_utf8_lossy(&head).into_owned()));
        }
        if buffer.len() > MAX_REQUEST_HEAD {
            return Ok(HeadOutcome::TooLarge);
        }

        let mut chunk = [0u8; 1024];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(HeadOutcome::Closed);
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n").map(|pos| pos + 4)
}

/// A parsed request head.
#[derive(Debug)]
struct Request {
    target: String,
    keep_alive: bool,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Parse a request head. `None` means the request is malformed.
    fn parse(head: &str) -> Option<Self> {
        let mut lines = head.split("\r\n");

        let request_line = lines.next()?;
        let mut parts = request_line.split(' ');
        let method = parts.next()?;
        let target = parts.next()?;
        let version = parts.next()?;
        if parts.next().is_some() || method.is_empty() || target.is_empty() {
            return None;
        }
        if version != "HTTP/1.1" && version != "HTTP/1.0" {
            return None;
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':')?;
            if name.is_empty() || name.contains(' ') {
                return None;
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_owned()));
        }

        let request = Self { target: target.to_owned(), keep_alive: false, headers };
        let keep_alive = match request.header("connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            // Upgrade requests carry `Connection: Upgrade`.
            _ => version == "HTTP/1.1",
        };

        Some(Self { keep_alive, ..request })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, value)| value.as_str())
    }

    fn is_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
    keep_alive: bool,
) -> io::Result<()> {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Server: arena\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: {connection}\r\n\r\n\
         {body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await
}
