use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::client::ComfyClient;
use crate::endpoint::Endpoint;
use crate::error::{ComfyError, Result};
use crate::logging::Logger;
use crate::subscription::ObserverRegistry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the client's WebSocket channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or explicitly disconnected.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames are being delivered to observers.
    Open,
    /// The channel ended (server close, transport error, or failed handshake).
    Closed,
}

/// The session's slot for at most one connection.
#[derive(Debug)]
pub(crate) struct Link {
    current: Mutex<Option<Connection>>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Default for Link {
    fn default() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            current: Mutex::new(None),
            state: Arc::new(state),
        }
    }
}

/// One open WebSocket plus the task reading from it.
#[derive(Debug)]
struct Connection {
    observers: Arc<ObserverRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    async fn open(
        request: Request,
        state: Arc<watch::Sender<ConnectionState>>,
        logger: Arc<dyn Logger>,
        close_timeout: Duration,
    ) -> Result<Self> {
        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;

        let observers = ObserverRegistry::new();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        state.send_replace(ConnectionState::Open);

        let reader = tokio::spawn(read_loop(
            ws,
            shutdown_rx,
            observers.clone(),
            state,
            logger,
            close_timeout,
        ));

        Ok(Self {
            observers,
            shutdown: Some(shutdown_tx),
            reader: Some(reader),
        })
    }

    /// Send a close frame and wait for the reader task to finish.
    async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

/// Deliver text frames to observers until shutdown or the channel ends.
///
/// Dropping the shutdown sender counts as a shutdown request, so a
/// connection dropped without `close()` still sends its close frame.
async fn read_loop(
    mut ws: WsStream,
    mut shutdown: oneshot::Receiver<()>,
    observers: Arc<ObserverRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    logger: Arc<dyn Logger>,
    close_timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let handshake = async {
                    ws.close(None).await?;
                    while let Some(frame) = ws.next().await {
                        frame?;
                    }
                    Ok::<_, tokio_tungstenite::tungstenite::Error>(())
                };
                match tokio::time::timeout(close_timeout, handshake).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => logger.debug(&format!("WebSocket close handshake ended with: {}", e)),
                    Err(_) => logger.warn("Timed out waiting for the WebSocket close reply"),
                }
                break;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => observers.dispatch(&text),
                Some(Ok(Message::Binary(bytes))) => {
                    logger.debug(&format!("Discarding {} byte binary frame", bytes.len()));
                }
                Some(Ok(Message::Close(frame))) => {
                    logger.info(&format!("Server closed the WebSocket: {:?}", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    logger.error(&format!("WebSocket error: {}", e));
                    break;
                }
                None => break,
            }
        }
    }

    state.send_replace(ConnectionState::Closed);
    observers.close();
    logger.info("WebSocket closed");
}

impl ComfyClient {
    /// Open the WebSocket, closing any connection that is already open.
    ///
    /// Resolves once the attempt has finished: `Open` when the handshake
    /// succeeded, `Closed` when it failed (the failure is logged, not
    /// returned). `Err` only covers URL or header construction problems.
    pub async fn connect(&self) -> Result<ConnectionState> {
        let request = self.ws_request()?;
        let mut current = self.link.current.lock().await;

        if let Some(previous) = current.take() {
            self.logger.info("Closing the existing WebSocket before reconnecting");
            previous.close().await;
        }

        self.link.state.send_replace(ConnectionState::Connecting);
        let url = request.uri().to_string();
        match Connection::open(
            request,
            self.link.state.clone(),
            self.logger.clone(),
            self.config().close_timeout,
        )
        .await
        {
            Ok(connection) => {
                self.logger.info(&format!("WebSocket connected to {}", url));
                *current = Some(connection);
                Ok(ConnectionState::Open)
            }
            Err(e) => {
                self.logger.warn(&format!("WebSocket connection to {} failed: {}", url, e));
                self.link.state.send_replace(ConnectionState::Closed);
                Ok(ConnectionState::Closed)
            }
        }
    }

    /// Close the WebSocket if there is one. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        let mut current = self.link.current.lock().await;
        if let Some(connection) = current.take() {
            connection.close().await;
            self.link.state.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Current state of the WebSocket channel.
    pub fn connection_state(&self) -> ConnectionState {
        *self.link.state.borrow()
    }

    /// Observers of the open connection, or `NotConnected`.
    pub(crate) async fn open_observers(&self) -> Result<Arc<ObserverRegistry>> {
        let current = self.link.current.lock().await;
        match current.as_ref() {
            Some(connection) if self.connection_state() == ConnectionState::Open => {
                Ok(connection.observers.clone())
            }
            _ => Err(ComfyError::NotConnected),
        }
    }

    fn ws_request(&self) -> Result<Request> {
        let url = Endpoint::Ws.ws_url(self.config())?;
        let mut request = url.as_str().into_client_request()?;
        if let Some(auth) = self.config().authorization() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| ComfyError::InvalidConfig(format!("Bad credentials: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}
