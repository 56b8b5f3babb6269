//! Thin helpers for sending and receiving a `Message` over a length-framed
//! TCP connection. Shared by the dispatcher's push/pull connection handlers
//! and the worker runtime so both sides speak the same framing discipline.

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::{TaskFabError, TaskFabResult};
use crate::message::{framing_codec, Message};

pub type MessageFramed = Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>;

pub fn framed(stream: TcpStream) -> MessageFramed {
    Framed::new(stream, framing_codec())
}

pub async fn send_message<S>(sink: &mut S, msg: &Message) -> TaskFabResult<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
{
    let bytes = msg.encode()?;
    sink.send(Bytes::from(bytes))
        .await
        .map_err(|e| TaskFabError::transport(e.to_string()))
}

/// `Ok(None)` means the peer closed the connection cleanly.
pub async fn recv_message<S>(stream: &mut S) -> TaskFabResult<Option<Message>>
where
    S: Stream<Item = Result<bytes::BytesMut, std::io::Error>> + Unpin,
{
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(Message::decode(&bytes)?)),
        Some(Err(e)) => Err(TaskFabError::transport(e.to_string())),
        None => Ok(None),
    }
}
