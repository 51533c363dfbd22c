// Tournament feed: decodes server frames and forwards them to the event loop.
//
// Frames are newline-delimited JSON. The binary reads them from stdin; any
// other transport only needs to produce a `Stream` of text frames.

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tourney_core::protocol::TournamentMessage;

/// Events emitted by the feed to the application layer.
#[derive(Debug)]
pub enum FeedEvent {
    /// The feed source was opened.
    Connected { source: String },
    /// The feed reached end of input or failed to read.
    Disconnected,
    /// A decoded server message.
    Message(Box<TournamentMessage>),
    /// A frame that could not be decoded. The feed stops after sending this.
    Rejected(DecodeError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not a tournament message envelope: {0}")]
    Malformed(serde_json::Error),

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Decode one JSON frame into a message, distinguishing unknown message
/// types from known types with a bad payload.
pub fn decode_message(text: &str) -> Result<TournamentMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    if !TournamentMessage::KINDS.contains(&envelope.kind.as_str()) {
        return Err(DecodeError::UnknownType(envelope.kind));
    }
    serde_json::from_str(text).map_err(|source| DecodeError::InvalidPayload {
        kind: envelope.kind,
        source,
    })
}

/// Read frames from `reader` until end of input, forwarding events through
/// `tx`. Sends `Connected` first and `Disconnected` last.
pub async fn run<R>(reader: R, tx: mpsc::Sender<FeedEvent>, source: &str) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    info!("Reading tournament feed from {source}");
    if tx
        .send(FeedEvent::Connected {
            source: source.to_string(),
        })
        .await
        .is_err()
    {
        return Ok(());
    }

    let frames = Box::pin(line_frames(reader));
    if process_frame_stream(frames, &tx, source).await.is_err() {
        return Ok(());
    }

    let _ = tx.send(FeedEvent::Disconnected).await;
    Ok(())
}

/// Adapt a buffered reader into a stream of lines.
pub fn line_frames<R>(reader: R) -> impl Stream<Item = std::io::Result<String>>
where
    R: AsyncBufRead + Unpin,
{
    stream::unfold(reader.lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(e), lines)),
        }
    })
}

/// Decode text frames from any [`Stream`] and forward them through `tx`.
///
/// Blank frames are skipped. Processing stops at the first read error or the
/// first frame that fails to decode; the decode failure is forwarded as
/// [`FeedEvent::Rejected`]. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
pub async fn process_frame_stream<St, E>(
    mut stream: St,
    tx: &mpsc::Sender<FeedEvent>,
    source: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<String, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                warn!("Feed read error from {source}: {e}");
                break;
            }
        };
        if text.trim().is_empty() {
            continue;
        }

        match decode_message(&text) {
            Ok(message) => {
                debug!("Decoded {} from {source}", message.kind());
                if tx.send(FeedEvent::Message(Box::new(message))).await.is_err() {
                    return Err(());
                }
            }
            Err(e) => {
                warn!("Rejected frame from {source}: {e}");
                if tx.send(FeedEvent::Rejected(e)).await.is_err() {
                    return Err(());
                }
                break;
            }
        }
    }
    Ok(())
}
