use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::error::{ClientError, Result};

/// Header carrying the token on the control channel upgrade request
pub const TOKEN_HEADER: &str = "x-rtun-token";

/// Identity reported to the server at the start of every session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub os: String,
    pub arch: String,
    pub version: String,
}

impl ClientInfo {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A control message in either direction.
///
/// `Report` and `Disconnect` are client-originated; `Connect` and `WanAddr`
/// come from the server. Tags this build does not know about decode to
/// `Unknown` so newer servers never break the receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Report(ClientInfo),
    Connect(String),
    WanAddr(String),
    Disconnect,
    Unknown { kind: String, data: Vec<u8> },
}

/// On-the-wire frame
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    data: String,
}

const REPORT: &str = "report";
const CONNECT: &str = "connect";
const WAN_ADDR: &str = "wan_addr";
const DISCONNECT: &str = "disconnect";

impl ControlMessage {
    pub fn kind(&self) -> &str {
        match self {
            ControlMessage::Report(_) => REPORT,
            ControlMessage::Connect(_) => CONNECT,
            ControlMessage::WanAddr(_) => WAN_ADDR,
            ControlMessage::Disconnect => DISCONNECT,
            ControlMessage::Unknown { kind, .. } => kind,
        }
    }

    fn payload(&self) -> Result<Vec<u8>> {
        Ok(match self {
            ControlMessage::Report(info) => serde_json::to_vec(info)?,
            ControlMessage::Connect(addr) | ControlMessage::WanAddr(addr) => {
                addr.as_bytes().to_vec()
            }
            ControlMessage::Disconnect => Vec::new(),
            ControlMessage::Unknown { data, .. } => data.clone(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let frame = Frame {
            kind: self.kind().to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(self.payload()?),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    pub fn to_ws(&self) -> Result<Message> {
        Ok(Message::Text(self.to_json()?))
    }

    /// Decode a JSON frame (text or binary WebSocket payload).
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let frame: Frame = serde_json::from_slice(raw)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(frame.data.as_bytes())
            .map_err(|e| ClientError::Protocol(format!("bad payload for {}: {}", frame.kind, e)))?;

        Ok(match frame.kind.as_str() {
            REPORT => ControlMessage::Report(serde_json::from_slice(&data)?),
            CONNECT => ControlMessage::Connect(payload_string(&frame.kind, data)?),
            WAN_ADDR => ControlMessage::WanAddr(payload_string(&frame.kind, data)?),
            DISCONNECT => ControlMessage::Disconnect,
            _ => ControlMessage::Unknown {
                kind: frame.kind,
                data,
            },
        })
    }
}

fn payload_string(kind: &str, data: Vec<u8>) -> Result<String> {
    String::from_utf8(data)
        .map_err(|_| ClientError::Protocol(format!("{} payload is not valid UTF-8", kind)))
}
