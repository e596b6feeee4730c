//! Frame dispatch: turns a session's pending changes into outbound messages.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use sysstat_protocol::DaemonMessage;

use crate::session::{ClientSession, Frame};

/// Transport side of one connected client.
///
/// Sends must not block: the daemon actor calls them from inside a tick.
/// An error means the peer is gone or cannot keep up, and the daemon tears
/// the client down.
pub trait FrameSink: Send {
    fn send(&self, message: DaemonMessage) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("peer outbox is full")]
    Full,

    #[error("peer disconnected")]
    Closed,
}

impl FrameSink for mpsc::Sender<DaemonMessage> {
    fn send(&self, message: DaemonMessage) -> Result<(), SinkError> {
        self.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl FrameSink for mpsc::UnboundedSender<DaemonMessage> {
    fn send(&self, message: DaemonMessage) -> Result<(), SinkError> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| SinkError::Closed)
    }
}

/// Builds the messages for a frame: metadata first, then values.
///
/// Empty halves produce no message.
pub fn frame_messages(frame: Frame) -> Vec<DaemonMessage> {
    let mut messages = Vec::with_capacity(2);

    if !frame.metadata.is_empty() {
        messages.push(DaemonMessage::metadata_changed(frame.metadata));
    }
    if !frame.values.is_empty() {
        messages.push(DaemonMessage::new_sensor_data(frame.values));
    }

    messages
}

/// Sends a session's pending frame to its sink.
///
/// Both pending buffers are cleared whether or not anything is sent.
/// Returns the number of messages sent.
pub fn flush(session: &mut ClientSession, sink: &dyn FrameSink) -> Result<usize, SinkError> {
    let messages = frame_messages(session.take_frame());
    let count = messages.len();

    for message in messages {
        sink.send(message)?;
    }

    Ok(count)
}
