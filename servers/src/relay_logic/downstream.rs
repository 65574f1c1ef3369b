use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use lib_common::error::{RelayError, RelayResult};
use lib_common::{ConnectionLifecycle, DataSource, Subscriber};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// A websocket connection seen through the registry's eyes.
///
/// Sends are queued on an unbounded channel drained by the connection's
/// writer task, so they never block the broadcaster.
pub struct WsSubscriber {
    id: String,
    sender: mpsc::UnboundedSender<Message>,
    open: AtomicBool,
}

impl WsSubscriber {
    pub fn new(id: String) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscriber = Arc::new(Self {
            id,
            sender,
            open: AtomicBool::new(true),
        });
        (subscriber, receiver)
    }

    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Subscriber for WsSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    fn send(&self, message: &str) -> RelayResult<()> {
        self.sender
            .send(Message::Text(message.to_string().into()))
            .map_err(|_| RelayError::Delivery {
                subscriber: self.id.clone(),
                reason: "connection writer has stopped".to_string(),
            })
    }
}

pub struct DownstreamState<D: DataSource> {
    lifecycle: ConnectionLifecycle<D>,
    shutdown: broadcast::Sender<()>,
}

impl<D: DataSource> Clone for DownstreamState<D> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

pub fn router<D: DataSource>(lifecycle: ConnectionLifecycle<D>, shutdown: broadcast::Sender<()>) -> Router {
    Router::new()
        .route("/", get(ws_handler::<D>))
        .route("/ws", get(ws_handler::<D>))
        .route("/health", get(health_handler))
        .with_state(DownstreamState { lifecycle, shutdown })
}

pub async fn bind(port: u16) -> anyhow::Result<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Downstream server listening on {}", addr);
    Ok(listener)
}

pub async fn run<D: DataSource>(
    listener: tokio::net::TcpListener,
    lifecycle: ConnectionLifecycle<D>,
    shutdown: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let mut stop = shutdown.subscribe();
    axum::serve(listener, router(lifecycle, shutdown))
        .with_graceful_shutdown(async move {
            stop.recv().await.ok();
            tracing::info!("Downstream server shutting down.");
        })
        .await?;
    Ok(())
}

async fn ws_handler<D: DataSource>(ws: WebSocketUpgrade, State(state): State<DownstreamState<D>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn handle_socket<D: DataSource>(socket: WebSocket, state: DownstreamState<D>) {
    let client_id = format!("client-{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
    let mut shutdown = state.shutdown.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (subscriber, mut outbound) = WsSubscriber::new(client_id.clone());
    tracing::info!("Client {} connected", client_id);

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break; // client disconnected
            }
        }
        let _ = ws_tx.close().await;
    });

    // Admission pushes the initial snapshot through the writer above.
    state.lifecycle.on_connect(subscriber.clone()).await;

    // Server to client only; inbound frames are drained and ignored.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown.recv() => break,
        }
    }

    subscriber.mark_closed();
    state.lifecycle.on_disconnect(&client_id);
    drop(subscriber);
    writer.abort();
    tracing::info!("Client {} disconnected", client_id);
}
