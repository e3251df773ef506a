//! Manages the single TCP connection to the projector's serial bridge.
//!
//! Does not have any awareness of command semantics. The link only
//! understands sending one request frame and reading back one reply line;
//! see [`crate::commands`] for what the frames mean.
//!
//! The underlying channel is a serial line behind a TCP bridge, so only one
//! exchange may be on the wire at a time. Callers submit exchanges through a
//! cloneable [`DeviceLink`] handle; the link task works through them in
//! submission order and finishes each exchange before starting the next, so
//! concurrent callers can never interleave frames or receive another
//! caller's reply.
//!
//! After a transport failure (timeout, closed socket, i/o error) the task
//! drops the connection and redials on the next exchange. Dropping on
//! timeout also discards any late reply still in flight, which would
//! otherwise be misattributed to the next exchange.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tokio::time::{timeout, Duration};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::LinkError;
use crate::wire::{Request, WireCodec};

// CHANNEL MESSAGES -------------------------------------------------------------------------------

/// Channel message type sent from [`DeviceLink`] handles to the link task.
///
/// One message per exchange: the request frame to send, and a oneshot sender
/// for routing the raw reply line (or the link failure) back to the caller.
#[derive(Debug)]
struct Exchange {
    request: Request,
    reply_tx: oneshot::Sender<Result<String, LinkError>>,
}

// ------------------------------------------------------------------------------------------------

const EXCHANGE_QUEUE_SIZE: usize = 32;

/// Connection settings for the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// `host:port` of the serial bridge.
    pub addr: String,
    /// How long a connection attempt may take.
    pub connect_timeout: Duration,
    /// How long to wait for the reply to a sent request.
    pub response_timeout: Duration,
}

impl LinkConfig {
    /// Settings for `addr` with 5 second connect and response timeouts.
    pub fn new(addr: impl Into<String>) -> Self {
        LinkConfig {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_millis(5000),
        }
    }

    /// Replaces the response timeout.
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }
}

// ================================================================================================
// DeviceLink

/// Cloneable handle to the task owning the projector connection.
#[derive(Debug, Clone)]
pub struct DeviceLink {
    exchange_tx: mpsc::Sender<Exchange>,
    cancel: CancellationToken,
}

impl DeviceLink {
    /// Starts the link task and returns a handle to it.
    ///
    /// The task dials the bridge immediately; a failed first attempt is not
    /// fatal (the next exchange redials). The task runs until every handle
    /// is dropped or [`DeviceLink::shut_down`] is called.
    pub fn start(config: LinkConfig) -> DeviceLink {
        let (exchange_tx, mut exchange_rx) = mpsc::channel::<Exchange>(EXCHANGE_QUEUE_SIZE);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        task::spawn(async move {
            let mut conn = match DeviceLink::connect(&config).await {
                Ok(framed) => Some(framed),
                Err(e) => {
                    error!("Initial connection attempt failed: {e}");
                    None
                }
            };

            loop {
                select! {
                    _ = task_cancel.cancelled() => {
                        info!("Link shut down request received");
                        break;
                    },

                    exchange = exchange_rx.recv() => {
                        let Some(Exchange { request, reply_tx }) = exchange else {
                            debug!("All link handles dropped");
                            break;
                        };

                        let result = DeviceLink::run_exchange(&mut conn, &config, request).await;

                        // A dead or silent connection cannot be trusted for the
                        // next exchange; drop it so the next one redials.
                        if matches!(
                            result,
                            Err(LinkError::Timeout(_) | LinkError::Closed | LinkError::Io(_))
                        ) {
                            conn = None;
                        }

                        let _ = reply_tx.send(result);
                    },
                }
            }

            if let Some(mut framed) = conn {
                let _ = framed.close().await;
            }

            info!("Device link has shut down");
        });

        DeviceLink {
            exchange_tx,
            cancel,
        }
    }

    /// Sends one request frame and waits for its reply line.
    ///
    /// Exchanges from concurrent callers are queued and run strictly one at
    /// a time, in submission order.
    pub async fn exchange(&self, request: Request) -> Result<String, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.exchange_tx
            .send(Exchange { request, reply_tx })
            .await
            .map_err(|_| LinkError::Gone)?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(LinkError::Gone),
        }
    }

    /// Asks the link task to close the connection and stop.
    pub fn shut_down(&self) {
        self.cancel.cancel();
    }

    // --------------------------------------------------------------------------------------------
    // Private

    /// Runs one exchange, dialing first if there is no live connection.
    async fn run_exchange(
        conn: &mut Option<Framed<TcpStream, WireCodec>>,
        config: &LinkConfig,
        request: Request,
    ) -> Result<String, LinkError> {
        let framed = match conn {
            Some(framed) => framed,
            None => conn.insert(DeviceLink::connect(config).await?),
        };

        debug!("Sending frame: {request}");
        framed.send(request).await.map_err(LinkError::Io)?;

        match timeout(config.response_timeout, framed.next()).await {
            Ok(Some(Ok(line))) => {
                debug!("Received reply line: {line}");
                Ok(line)
            }
            Ok(Some(Err(e))) => Err(LinkError::Io(e)),
            Ok(None) => Err(LinkError::Closed),
            Err(_) => Err(LinkError::Timeout(config.response_timeout)),
        }
    }

    /// Dials the bridge (with timeout) and frames the stream.
    async fn connect(config: &LinkConfig) -> Result<Framed<TcpStream, WireCodec>, LinkError> {
        info!("Connecting to projector bridge at {}", config.addr);

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&config.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(LinkError::Connect(e)),
            Err(_) => return Err(LinkError::ConnectTimeout(config.connect_timeout)),
        };

        // Frames are a handful of bytes; don't let Nagle hold them back.
        let _ = stream.set_nodelay(true);

        info!("Connected to projector bridge at {}", config.addr);

        Ok(Framed::new(stream, WireCodec))
    }
}

// =================================================================
// Tests
