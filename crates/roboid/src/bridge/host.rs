use super::protocol::{BridgeRequest, BridgeResponse};
use crate::LocalClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serves bridge requests with a [`LocalClient`].
///
/// This is the component living on the far side of a bridge: it decodes
/// request frames, generates the artifact through the local pool (with its
/// caching and coalescing) and encodes the response.
#[derive(Clone)]
pub struct BridgeHost {
    client: LocalClient,
}

impl BridgeHost {
    pub fn new(client: LocalClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LocalClient {
        &self.client
    }

    /// Answers a single request. Invalid requests and generation failures
    /// become [`BridgeResponse::Rejected`].
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let id = request.id.clone();
        let outcome = match request.job() {
            Ok(job) => self.client.generate(job).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(artifact) => BridgeResponse::Resolved {
                id,
                detail: artifact.to_payload(),
            },
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Rejecting bridge request {id}: {e}");
                BridgeResponse::Rejected {
                    id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Answers one JSON frame.
    ///
    /// Returns `None` for frames that cannot be decoded: without an id there
    /// is nobody to reply to.
    pub async fn handle_frame(&self, frame: &str) -> Option<String> {
        let request = match BridgeRequest::from_frame(frame) {
            Ok(request) => request,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Dropping undecodable bridge frame: {_e}");
                return None;
            }
        };

        Self::encode(&self.handle(request).await)
    }

    /// Encodes `response` as a frame, or `None` (logged) if that fails.
    pub fn encode(response: &BridgeResponse) -> Option<String> {
        match response.to_frame() {
            Ok(frame) => Some(frame),
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to encode bridge response: {_e}");
                None
            }
        }
    }

    /// Reads request frames until `frames` closes or `shutdown` fires,
    /// answering each on `responses`.
    ///
    /// Requests are handled concurrently, so responses may leave in a
    /// different order than their requests arrived.
    pub async fn serve(
        self,
        mut frames: mpsc::UnboundedReceiver<String>,
        responses: mpsc::UnboundedSender<String>,
        shutdown: CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let host = self.clone();
            let responses = responses.clone();
            tokio::spawn(async move {
                if let Some(reply) = host.handle_frame(&frame).await {
                    let _ = responses.send(reply);
                }
            });
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Bridge host stopped reading requests");
    }
}
