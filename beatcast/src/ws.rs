//! Minimal WebSocket client for the agent's push channel.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::types::Frame;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Accepts ws:// or wss:// URLs; a bare HOST:PORT gets ws:// and /ws.
pub fn normalize_url(input: &str) -> anyhow::Result<Url> {
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("ws://{input}/ws")
    };
    let url = Url::parse(&candidate)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => anyhow::bail!("unsupported scheme '{other}', expected ws or wss"),
    }
}

pub async fn connect(url: &Url) -> anyhow::Result<WsStream> {
    let (ws, _) = connect_async(url.as_str()).await?;
    Ok(ws)
}

// Next decodable frame; None once the agent closes the connection.
pub async fn next_frame(ws: &mut WsStream) -> Option<Frame> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(json)) => {
                if let Ok(frame) = serde_json::from_str::<Frame>(&json) {
                    return Some(frame);
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
    None
}
