use super::protocol::BridgeRequest;
use crate::Error;
use tokio::sync::mpsc;

/// Outbound half of a bridge: delivers requests to the host.
///
/// Responses come back on a separate channel and are fed to
/// [`BridgeClient::listen`](crate::BridgeClient::listen) or
/// [`BridgeClient::handle_frame`](crate::BridgeClient::handle_frame).
pub trait BridgeTransport: Send + Sync + 'static {
    /// Posts `request` without waiting for its response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the host cannot be reached.
    fn post(&self, request: &BridgeRequest) -> crate::Result<()>;
}

/// Transport writing JSON frames into an in-process channel.
///
/// The receiving end is typically a [`BridgeHost`](crate::BridgeHost) or a
/// task forwarding frames to another process.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// A transport together with the receiver of its frames.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl BridgeTransport for ChannelTransport {
    fn post(&self, request: &BridgeRequest) -> crate::Result<()> {
        let frame = request.to_frame()?;
        self.tx.send(frame).map_err(|_| Error::Transport {
            reason: "bridge host channel closed".to_string(),
        })
    }
}
