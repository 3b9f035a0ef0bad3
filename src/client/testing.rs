//! Loopback fixtures shared by the client tests.

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use crate::backend::StatusBackend;
use crate::config::Settings;
use crate::error::{ClientError, Result};
use crate::protocol::{ControlMessage, TOKEN_HEADER};

pub const TEST_TOKEN: &str = "tok_test";

pub fn test_settings(server_addr: &str, local_addr: &str) -> Settings {
    let mut settings = Settings::new(server_addr, TEST_TOKEN);
    settings.local_addr = local_addr.to_string();
    settings.tls = false;
    settings.retry_delay = Duration::from_millis(100);
    settings
}

/// Plain `ws://` relay stand-in
pub struct ControlServer {
    pub listener: TcpListener,
    pub addr: String,
}

impl ControlServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        Self { listener, addr }
    }
}

/// Accept one control channel, returning it with the token header it carried.
pub async fn accept_control(
    listener: &TcpListener,
) -> (WebSocketStream<TcpStream>, Option<String>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut token = None;
    let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
        token = req
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        Ok(resp)
    })
    .await
    .unwrap();
    (ws, token)
}

pub async fn recv_control(ws: &mut WebSocketStream<TcpStream>) -> ControlMessage {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return ControlMessage::decode(text.as_bytes()).unwrap()
            }
            Some(Ok(_)) => continue,
            other => panic!("control channel ended: {other:?}"),
        }
    }
}

pub async fn send_control(ws: &mut WebSocketStream<TcpStream>, msg: &ControlMessage) {
    ws.send(msg.to_ws().unwrap()).await.unwrap();
}

pub async fn close_with_reason(ws: &mut WebSocketStream<TcpStream>, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: reason.to_string().into(),
    };
    ws.close(Some(frame)).await.unwrap();
}

/// Local service stand-in that echoes every connection back
pub async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut read, mut write) = stream.into_split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
            });
        }
    });
    addr
}

/// An address nothing is listening on
pub async fn unused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

pub struct MockBackend {
    status: Mutex<std::result::Result<bool, String>>,
    announcement: Mutex<std::result::Result<String, String>>,
    status_calls: AtomicUsize,
    set_calls: Mutex<Vec<(String, bool)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Ok(false)),
            announcement: Mutex::new(Ok(String::new())),
            status_calls: AtomicUsize::new(0),
            set_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: std::result::Result<bool, String>) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_announcement(&self, announcement: std::result::Result<String, String>) {
        *self.announcement.lock().unwrap() = announcement;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> Vec<(String, bool)> {
        self.set_calls.lock().unwrap().clone()
    }
}

impl StatusBackend for MockBackend {
    fn announcement(&self) -> BoxFuture<'_, Result<String>> {
        let result = self
            .announcement
            .lock()
            .unwrap()
            .clone()
            .map_err(ClientError::Backend);
        future::ready(result).boxed()
    }

    fn connection_status<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<bool>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.status.lock().unwrap().clone().map_err(ClientError::Backend);
        future::ready(result).boxed()
    }

    fn set_disconnected<'a>(
        &'a self,
        token: &'a str,
        disconnected: bool,
    ) -> BoxFuture<'a, Result<()>> {
        self.set_calls
            .lock()
            .unwrap()
            .push((token.to_string(), disconnected));
        future::ready(Ok(())).boxed()
    }
}
