//! Wire protocol: message vocabulary, JSON codec, and length-delimited
//! framing over a byte stream.

use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::model::TaskRecord;

/// The exhaustive message vocabulary exchanged between workers and the
/// dispatcher. Unknown wire bytes decode to a `serde_json` error, which
/// callers treat as a protocol violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    Registration { sender: String },
    Ack { sender: String },
    RequestTask { sender: String },
    NoTask { sender: String },
    NewTask { sender: String, body: TaskRecord },
    ResultReady { sender: String, body: TaskRecord },
}

impl Message {
    pub fn sender(&self) -> &str {
        match self {
            Message::Registration { sender }
            | Message::Ack { sender }
            | Message::RequestTask { sender }
            | Message::NoTask { sender }
            | Message::NewTask { sender, .. }
            | Message::ResultReady { sender, .. } => sender,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Builds the length-delimited frame codec used for every TCP connection in
/// the fabric: one frame carries exactly one JSON-encoded `Message`.
pub fn framing_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .new_codec()
}
