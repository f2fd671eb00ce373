//! The per-connection run loop.
//!
//! [`XmppStream`] drives a single connection: it (re)starts the stream,
//! pulls elements off the transport, dispatches them through the element
//! multiplexer, writes the handlers' replies, and honors the
//! restart/close flags. Processing is strictly sequential; the only
//! concurrency is the outbound channel that lets collaborators (such as a
//! router holding a [`StreamWriter`]) push elements into the connection
//! between inbound stanzas.

use std::io;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use quill_xmpp::{Element, ProtocolError, Stanza, StreamErrorCond, STREAM_CLOSE};

use crate::stream::{ElementMux, FeatureGenerator, Properties, Status, XmlTransport};

/// Default idle threshold before a connection is treated as dead.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

enum Outbound {
    Element(Element),
    Close,
}

/// A cloneable handle for writing into a running stream from outside the
/// dispatch path.
#[derive(Clone)]
pub struct StreamWriter {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl StreamWriter {
    /// Queues an element for writing. Returns `false` when the stream is
    /// gone.
    pub fn write_element(&self, el: Element) -> bool {
        self.tx.send(Outbound::Element(el)).is_ok()
    }

    /// Queues a stanza for writing.
    pub fn write_stanza(&self, stanza: Stanza) -> bool {
        self.tx.send(Outbound::Element(stanza.into_element())).is_ok()
    }

    /// Asks the stream to close cleanly.
    pub fn close(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }
}

#[cfg(test)]
impl StreamWriter {
    /// A writer not connected to any stream; sends report failure.
    pub(crate) fn detached() -> StreamWriter {
        let (tx, _rx) = mpsc::unbounded_channel();
        StreamWriter { tx }
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter").finish_non_exhaustive()
    }
}

/// The stream runtime: transport + properties + dispatch tree.
pub struct XmppStream {
    transport: XmlTransport,
    props: Properties,
    mux: ElementMux,
    features: Vec<Box<dyn FeatureGenerator>>,
    outgoing_tx: mpsc::UnboundedSender<Outbound>,
    outgoing_rx: mpsc::UnboundedReceiver<Outbound>,
    idle_timeout: Duration,
}

impl XmppStream {
    /// Assembles a stream. Handler and feature registration must be final:
    /// the multiplexer and generators are moved in and cannot be changed
    /// once [`XmppStream::run`] is called.
    pub fn new(
        transport: XmlTransport,
        props: Properties,
        mux: ElementMux,
        features: Vec<Box<dyn FeatureGenerator>>,
    ) -> XmppStream {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        XmppStream {
            transport,
            props,
            mux,
            features,
            outgoing_tx,
            outgoing_rx,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Overrides the idle threshold.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> XmppStream {
        self.idle_timeout = idle_timeout;
        self
    }

    /// A handle for writing into this stream from other tasks.
    pub fn writer(&self) -> StreamWriter {
        StreamWriter {
            tx: self.outgoing_tx.clone(),
        }
    }

    /// The current connection state.
    pub fn properties(&self) -> &Properties {
        &self.props
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ProtocolError> {
        self.props.status.insert(Status::RESTART);
        let mut deadline = Instant::now() + self.idle_timeout;

        loop {
            if self.props.status.contains(Status::RESTART) {
                match self.restart().await {
                    RestartOutcome::Started => {
                        self.props.status.clear(Status::RESTART);
                        deadline = Instant::now() + self.idle_timeout;
                    }
                    RestartOutcome::Retry => continue,
                    RestartOutcome::Finished(result) => return result,
                }
            }

            tokio::select! {
                res = self.transport.next() => {
                    deadline = Instant::now() + self.idle_timeout;
                    match res {
                        Ok(el) => {
                            if let Some(result) = self.dispatch(&el).await {
                                return result;
                            }
                        }
                        Err(ProtocolError::RequireRestart) => {
                            debug!("transport upgraded, restarting stream");
                            self.props.status.insert(Status::RESTART);
                        }
                        Err(ProtocolError::StreamClosed) => {
                            info!("peer closed the stream");
                            return self.shutdown().await;
                        }
                        Err(e) if e.is_syntax() => {
                            warn!(error = %e, "malformed xml on stream");
                            return self.fail_bad_format(e).await;
                        }
                        Err(e) => {
                            debug!(error = %e, "connection lost");
                            self.transport.close().await;
                            self.props.status.insert(Status::CLOSED);
                            return Err(e);
                        }
                    }
                }

                Some(out) = self.outgoing_rx.recv() => {
                    match out {
                        Outbound::Element(el) => self.transport.write_element(&el).await?,
                        Outbound::Close => {
                            info!("close requested by writer");
                            return self.shutdown().await;
                        }
                    }
                }

                _ = tokio::time::sleep_until(deadline) => {
                    info!(idle_secs = self.idle_timeout.as_secs(), "idle timeout");
                    self.transport.close().await;
                    self.props.status.insert(Status::CLOSED);
                    return Err(ProtocolError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "idle connection",
                    )));
                }
            }
        }
    }

    /// Rebuilds the feature list and redoes the header exchange.
    async fn restart(&mut self) -> RestartOutcome {
        self.props.features.clear();
        for generator in &mut self.features {
            if let Some(feature) = generator.generate_feature() {
                self.props.features.push(feature);
            }
        }

        match self.transport.start(&mut self.props).await {
            Ok(false) => RestartOutcome::Started,
            Ok(true) => {
                // Header error already answered (host mismatch).
                RestartOutcome::Finished(self.shutdown().await)
            }
            Err(ProtocolError::RequireRestart) => RestartOutcome::Retry,
            Err(ProtocolError::StreamClosed) => RestartOutcome::Finished(self.shutdown().await),
            Err(e) if e.is_syntax() => RestartOutcome::Finished(self.fail_bad_format(e).await),
            Err(e @ ProtocolError::Io(_)) | Err(e @ ProtocolError::HeaderNotSet) => {
                self.transport.close().await;
                self.props.status.insert(Status::CLOSED);
                RestartOutcome::Finished(Err(e))
            }
            Err(e) => {
                warn!(error = %e, "stream start failed, retrying");
                RestartOutcome::Retry
            }
        }
    }

    /// Routes one inbound element and acts on the handler output.
    /// `Some(result)` means the loop is done.
    async fn dispatch(&mut self, el: &Element) -> Option<Result<(), ProtocolError>> {
        let mux = &mut self.mux;
        let props = &mut self.props;
        let output =
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                mux.dispatch(el, props)
            })) {
                Ok(output) => output,
                Err(_) => {
                    error!(tag = %el.name, "handler panicked");
                    let _ = self
                        .transport
                        .write_element(&StreamErrorCond::InternalServerError.to_element())
                        .await;
                    return Some(self.shutdown().await);
                }
            };

        for el in &output.elements {
            if let Err(e) = self.transport.write_element(el).await {
                return Some(Err(e));
            }
        }
        if let Some(change) = &output.change {
            for generator in &mut self.features {
                generator.update(change);
            }
        }
        if output.restart {
            self.props.status.insert(Status::RESTART);
        }
        if output.close {
            return Some(self.shutdown().await);
        }
        None
    }

    /// Answers a well-formedness violation and tears the stream down.
    async fn fail_bad_format(&mut self, cause: ProtocolError) -> Result<(), ProtocolError> {
        let _ = self
            .transport
            .write_element(&StreamErrorCond::BadFormat.to_element())
            .await;
        let _ = self.shutdown().await;
        Err(cause)
    }

    /// Writes the stream close tag and drops the connection.
    async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        let _ = self.transport.write_raw(STREAM_CLOSE.as_bytes()).await;
        self.props.status.insert(Status::CLOSED);
        self.transport.close().await;
        Ok(())
    }
}

enum RestartOutcome {
    /// Header exchange done, feature list written; read on.
    Started,
    /// Start must be attempted again (upgrade mid-start, bad header).
    Retry,
    /// The connection is finished.
    Finished(Result<(), ProtocolError>),
}
