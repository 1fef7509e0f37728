//! Subscriber WebSocket Server
//!
//! Accepts subscriber sockets on `GET /` and `GET /ws`. Each socket is
//! registered with the connection registry for its lifetime; the socket
//! task forwards the connection's outbound queue as text frames and
//! disconnects when the client closes, the socket errors, or the server
//! shuts down.
//!
//! Inbound client frames are read only to notice closes; their content is
//! ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::ServerError;
use super::registry::{InMemoryConnectionRegistry, Registration};

#[derive(Debug)]
struct SubscriberState {
    registry: Arc<InMemoryConnectionRegistry>,
    cancel: CancellationToken,
}

/// WebSocket server for trade subscribers.
#[derive(Debug)]
pub struct SubscriberServer {
    port: u16,
    state: Arc<SubscriberState>,
}

impl SubscriberServer {
    /// Create a server bound to `port` once run.
    #[must_use]
    pub fn new(
        port: u16,
        registry: Arc<InMemoryConnectionRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            port,
            state: Arc::new(SubscriberState { registry, cancel }),
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server stops with an
    /// error.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the server stops with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let cancel = self.state.cancel.clone();
        let app = Router::new()
            .route("/", get(upgrade_handler))
            .route("/ws", get(upgrade_handler))
            .with_state(self.state);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Subscriber WebSocket server listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Subscriber WebSocket server stopped");
        Ok(())
    }
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SubscriberState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<SubscriberState>) {
    let Registration {
        id, mut receiver, ..
    } = state.registry.connect();
    let (mut sink, mut inbound) = socket.split();

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            outbound = receiver.recv() => {
                let Some(payload) = outbound else { break };
                if let Err(e) = sink.send(Message::Text(payload.as_ref().into())).await {
                    tracing::debug!(connection_id = %id, error = %e, "Subscriber write failed");
                    break;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %id, error = %e, "Subscriber read failed");
                    break;
                }
            },
        }
    }

    state.registry.disconnect(&id);
}
