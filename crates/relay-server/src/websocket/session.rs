//! `WebSocket` session lifecycle: one subscriber from upgrade to teardown.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{Instrument, debug, info, instrument, warn};

use super::subscriber::{CloseReason, Subscriber};
use crate::errors::HubError;
use crate::hub::Hub;
use crate::ingress::PublishSource;
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, DISCONNECTIONS_TOTAL,
};
use crate::rate_limit::RateLimiter;

type SessionResult = Result<CloseReason, HubError>;

/// Upper bound on the close handshake. A peer that stopped reading will
/// not take the close frame either.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Run a session over an upgraded socket.
pub async fn serve_socket(
    socket: WebSocket,
    subscriber: Arc<Subscriber>,
    outbound: mpsc::Receiver<Bytes>,
    hub: Arc<Hub>,
) -> SessionResult {
    let (sink, stream) = socket.split();
    run_session(sink, stream, subscriber, outbound, hub).await
}

/// Run a session for an already registered subscriber.
///
/// 1. Activates the subscriber (fails if it was closed while accepting)
/// 2. Spawns the write loop (outbound queue, lifetime cap, close frames)
/// 3. Spawns the read loop (per-connection limiter, frames to ingress)
/// 4. The first loop to finish decides the outcome; the other is cancelled
/// 5. Unregisters and closes the subscriber
#[instrument(skip_all, fields(conn_id = %subscriber.conn_id(), peer = %subscriber.id))]
pub async fn run_session<S, R>(
    mut sink: S,
    stream: R,
    subscriber: Arc<Subscriber>,
    outbound: mpsc::Receiver<Bytes>,
    hub: Arc<Hub>,
) -> SessionResult
where
    S: Sink<Message, Error = axum::Error> + Send + Unpin + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Send + Unpin + 'static,
{
    let write_timeout = hub.config().write_timeout();
    if let Err(e) = subscriber.activate() {
        debug!("subscriber closed before activation");
        let reason = subscriber.close_reason().unwrap_or(CloseReason::Shutdown);
        close_sink(&mut sink, reason, write_timeout).await;
        let _ = hub.release(&subscriber);
        return Err(e);
    }

    info!("subscriber connected");
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);

    let mut writer = tokio::spawn(
        write_loop(
            sink,
            outbound,
            subscriber.clone(),
            write_timeout,
            hub.config().max_session(),
        )
        .in_current_span(),
    );
    let mut reader =
        tokio::spawn(read_loop(stream, subscriber.clone(), hub.clone()).in_current_span());

    let outcome = tokio::select! {
        res = &mut writer => {
            let outcome = settle(res, &subscriber);
            let _ = subscriber.close(terminal_reason(&outcome));
            let _ = reader.await;
            outcome
        }
        res = &mut reader => {
            let outcome = settle(res, &subscriber);
            let _ = subscriber.close(terminal_reason(&outcome));
            let _ = writer.await;
            outcome
        }
    };

    let _ = hub.release(&subscriber);
    counter!(DISCONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(CONNECTION_DURATION_SECONDS).record(subscriber.age().as_secs_f64());
    match &outcome {
        Ok(reason) => info!(%reason, dropped = subscriber.drop_count(), "subscriber disconnected"),
        Err(e) => warn!(error = %e, "subscriber session failed"),
    }
    outcome
}

/// Cancellation means another party closed the session; report its reason.
fn settle(res: Result<SessionResult, JoinError>, subscriber: &Subscriber) -> SessionResult {
    match res {
        Ok(Err(HubError::Cancelled)) => {
            Ok(subscriber.close_reason().unwrap_or(CloseReason::Shutdown))
        }
        Ok(outcome) => outcome,
        Err(e) => Err(HubError::Task(e)),
    }
}

fn terminal_reason(outcome: &SessionResult) -> CloseReason {
    match outcome {
        Ok(reason) => *reason,
        Err(_) => CloseReason::Failed,
    }
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Bytes>,
    subscriber: Arc<Subscriber>,
    write_timeout: Duration,
    lifetime: Duration,
) -> SessionResult
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let deadline = tokio::time::sleep(lifetime);
    tokio::pin!(deadline);

    let reason = loop {
        let next = tokio::select! {
            biased;
            () = subscriber.cancelled() => break cancelled_reason(&subscriber),
            () = &mut deadline => {
                debug!(lifetime_secs = lifetime.as_secs(), "session lifetime reached");
                let _ = subscriber.close(CloseReason::Expired);
                break subscriber.close_reason().unwrap_or(CloseReason::Expired);
            }
            next = outbound.recv() => next,
        };
        let Some(payload) = next else {
            break subscriber.close_reason().unwrap_or(CloseReason::Shutdown);
        };
        // An eviction must not wait behind a send the peer is not reading.
        tokio::select! {
            biased;
            () = subscriber.cancelled() => break cancelled_reason(&subscriber),
            res = send_with_timeout(&mut sink, to_message(payload), write_timeout) => res?,
        }
    };

    close_sink(&mut sink, reason, write_timeout).await;
    Ok(reason)
}

fn cancelled_reason(subscriber: &Subscriber) -> CloseReason {
    let _ = subscriber.close(CloseReason::Shutdown);
    subscriber.close_reason().unwrap_or(CloseReason::Shutdown)
}

async fn read_loop<R>(mut stream: R, subscriber: Arc<Subscriber>, hub: Arc<Hub>) -> SessionResult
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let limiter = RateLimiter::from_config(&hub.config().connection_limit);
    let cancel = subscriber.cancel_token();

    loop {
        limiter.acquire(&cancel).await?;

        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HubError::Cancelled),
            frame = stream.next() => frame,
        };
        let payload = match frame {
            None => return Ok(CloseReason::PeerClosed),
            Some(Err(e)) => return Err(HubError::Transport(e)),
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Close(frame))) => return peer_close(frame),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
        };

        let published = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HubError::Cancelled),
            res = hub.publish(PublishSource::Connection, &subscriber.id, payload) => res,
        };
        match published {
            Ok(report) => debug!(
                delivered = report.delivered,
                evicted = report.evicted,
                "frame broadcast"
            ),
            Err(HubError::PayloadTooLarge { size, limit }) => {
                warn!(size, limit, "dropping oversized frame");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Normal and going-away closes end cleanly; anything else is an error.
fn peer_close(frame: Option<CloseFrame>) -> SessionResult {
    let Some(frame) = frame else {
        return Err(HubError::UnexpectedClose {
            code: close_code::STATUS,
            reason: String::new(),
        });
    };
    match frame.code {
        close_code::NORMAL | close_code::AWAY => Ok(CloseReason::PeerClosed),
        code => Err(HubError::UnexpectedClose {
            code,
            reason: frame.reason.as_str().to_owned(),
        }),
    }
}

/// Text frame for UTF-8 payloads, binary otherwise.
fn to_message(payload: Bytes) -> Message {
    if let Ok(text) = std::str::from_utf8(&payload) {
        return Message::Text(text.to_owned().into());
    }
    Message::Binary(payload)
}

async fn send_with_timeout<S>(
    sink: &mut S,
    message: Message,
    write_timeout: Duration,
) -> Result<(), HubError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match tokio::time::timeout(write_timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(error = %e, "send failed");
            Err(HubError::Transport(e))
        }
        Err(_) => {
            warn!(timeout = ?write_timeout, "send timed out");
            Err(HubError::SendTimeout(write_timeout))
        }
    }
}

/// Best-effort close handshake, bounded by the write timeout and
/// [`CLOSE_GRACE`], whichever is shorter.
async fn close_sink<S>(sink: &mut S, reason: CloseReason, write_timeout: Duration)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let closing = async {
        if reason != CloseReason::PeerClosed {
            let frame = CloseFrame {
                code: reason.close_code(),
                reason: Utf8Bytes::from_static(reason.description()),
            };
            sink.send(Message::Close(Some(frame))).await?;
        }
        sink.close().await
    };
    match tokio::time::timeout(write_timeout.min(CLOSE_GRACE), closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close handshake failed"),
        Err(_) => debug!("close handshake timed out"),
    }
}
