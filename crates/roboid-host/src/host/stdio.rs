//! JSON-lines transport over a pair of byte streams.
//!
//! Every input line is one [`BridgeRequest`] frame and every output line one
//! [`BridgeResponse`] frame. Requests are handled concurrently; the worker
//! pool behind the [`BridgeHost`] bounds the actual rendering work, so
//! responses are written in completion order, not request order.
//!
//! Reading stops at end of input or when the shutdown token fires. At end of
//! input every accepted request is answered before the pool is stopped; on
//! shutdown the pool is stopped first, which rejects queued requests.

use super::telemetry;
use roboid::{BridgeHost, BridgeRequest};
use std::time::Instant;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

pub async fn serve<R, W>(
    host: BridgeHost,
    input: R,
    output: W,
    log_requests: bool,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses, rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_frames(output, rx));
    let tracker = TaskTracker::new();
    let mut lines = input.lines();

    let interrupted = loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break true,
            line = lines.next_line() => line?,
        };
        let Some(frame) = line else {
            break false;
        };
        if frame.trim().is_empty() {
            continue;
        }

        let host = host.clone();
        let responses = responses.clone();
        tracker.spawn(async move {
            if let Some(reply) = respond(&host, &frame, log_requests).await {
                let _ = responses.send(reply);
            }
        });
    };

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Stopped reading requests ({}), {} still in flight",
        if interrupted { "shutdown" } else { "end of input" },
        tracker.len()
    );

    tracker.close();
    if interrupted {
        stop_pool(&host).await;
        tracker.wait().await;
    } else {
        tracker.wait().await;
        stop_pool(&host).await;
    }

    drop(responses);
    writer.await??;
    Ok(())
}

async fn stop_pool(host: &BridgeHost) {
    if let Err(_e) = host.client().shutdown().await {
        #[cfg(feature = "tracing")]
        tracing::error!("Error during pool shutdown: {:?}", _e);
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Pool stopped: {:?}", host.client().stats());
}

async fn respond(host: &BridgeHost, frame: &str, log_requests: bool) -> Option<String> {
    telemetry::increment_requests();

    let request = match BridgeRequest::from_frame(frame) {
        Ok(request) => request,
        Err(_e) => {
            telemetry::increment_request_errors();
            #[cfg(feature = "tracing")]
            tracing::warn!("Dropping undecodable request frame: {_e}");
            return None;
        }
    };

    if log_requests {
        #[cfg(feature = "tracing")]
        tracing::info!("Request {} ({:?} {})", request.id, request.kind, request.detail);
    }

    telemetry::increment_requests_inflight();
    let start = Instant::now();
    let response = host.handle(request).await;
    telemetry::decrement_requests_inflight();
    telemetry::record_request_duration(start.elapsed().as_secs_f64() * 1_000.0);

    if response.is_rejected() {
        telemetry::increment_request_errors();
    }
    if log_requests {
        #[cfg(feature = "tracing")]
        log_outcome(&response);
    }

    BridgeHost::encode(&response)
}

#[cfg(feature = "tracing")]
fn log_outcome(response: &roboid::BridgeResponse) {
    use roboid::BridgeResponse;

    match response {
        BridgeResponse::Resolved { id, .. } => tracing::info!("Resolved {id}"),
        BridgeResponse::Rejected { id, reason } => tracing::info!("Rejected {id}: {reason}"),
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(
    mut output: W,
    mut frames: mpsc::UnboundedReceiver<String>,
) -> std::io::Result<()> {
    while let Some(frame) = frames.recv().await {
        output.write_all(frame.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roboid::{BridgeResponse, CorrelationId, IdenticonEngine, LocalClient, PoolConfig};
    use tokio::io::AsyncReadExt;

    fn host() -> BridgeHost {
        BridgeHost::new(LocalClient::spawn(
            IdenticonEngine::new(),
            PoolConfig::default().with_pool_size(2),
        ))
    }

    async fn run(input: &str) -> Vec<BridgeResponse> {
        let (output, mut reader) = tokio::io::duplex(1 << 20);
        serve(host(), input.as_bytes(), output, true, CancellationToken::new())
            .await
            .unwrap();

        let mut written = String::new();
        reader.read_to_string(&mut written).await.unwrap();
        written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_every_decodable_line() {
        let input = concat!(
            r#"{"id":1,"category":"roboidentities","type":"roboname","detail":"seedX"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"id":"b","category":"roboidentities","type":"robohash","detail":"seedX;80"}"#,
            "\n",
            r#"{"id":3,"category":"roboidentities","type":"robohash","detail":"seedX;81"}"#,
            "\n",
        );

        let mut responses = run(input).await;
        assert_eq!(responses.len(), 3);
        responses.sort_by_key(|r| r.id().to_string());

        assert!(matches!(
            &responses[0],
            BridgeResponse::Resolved { id: CorrelationId::Counter(1), .. }
        ));
        assert!(matches!(
            &responses[1],
            BridgeResponse::Rejected { id: CorrelationId::Counter(3), .. }
        ));
        assert!(matches!(
            &responses[2],
            BridgeResponse::Resolved { id: CorrelationId::Uuid(id), .. } if id == "b"
        ));
    }

    #[tokio::test]
    async fn duplicate_requests_get_identical_answers() {
        let line = r#"{"id":7,"category":"roboidentities","type":"robohash","detail":"same;256"}"#;
        let input = format!("{line}\n{line}\n{line}\n");

        let responses = run(&input).await;
        assert_eq!(responses.len(), 3);
        assert!(responses.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn cancelled_before_reading_writes_nothing() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let (output, mut reader) = tokio::io::duplex(1024);
        let (_keep_open, input) = tokio::io::duplex(1024);

        serve(
            host(),
            tokio::io::BufReader::new(input),
            output,
            false,
            shutdown,
        )
        .await
        .unwrap();

        let mut written = String::new();
        reader.read_to_string(&mut written).await.unwrap();
        assert!(written.is_empty());
    }
}
