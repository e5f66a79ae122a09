//! Multiplexed session over a single connection
//!
//! A [`Session`] owns two background tasks: a reader that decodes frames
//! and routes them to streams, and a writer that serializes every
//! outbound frame onto the connection. Handles are cheap to clone and all
//! refer to the same session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::{Frame, FrameCodec};
use crate::config::{Mode, MuxConfig, DEFAULT_WINDOW};
use crate::error::MuxError;
use crate::frame::{Flags, FrameType, GoAwayCode, StreamId};
use crate::stream::{lock, MuxStream, StreamState};

/// How long the writer keeps trying to flush queued frames after close
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

struct SessionState {
    next_stream_id: u32,
    streams: HashMap<StreamId, Arc<Mutex<StreamState>>>,
    pings: HashMap<u32, oneshot::Sender<()>>,
    inbound: Option<mpsc::UnboundedSender<StreamId>>,
    closed: bool,
}

/// State shared by session handles, streams and the driver tasks
pub(crate) struct Shared {
    mode: Mode,
    pub(crate) config: MuxConfig,
    state: Mutex<SessionState>,
    outbound: mpsc::UnboundedSender<Frame>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<StreamId>>,
    closed: CancellationToken,
    ping_seq: AtomicU32,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    /// Queue a frame for the writer task
    pub(crate) fn send(&self, frame: Frame) -> Result<(), MuxError> {
        self.outbound.send(frame).map_err(|_| MuxError::SessionClosed)
    }

    pub(crate) fn remove_stream(&self, id: StreamId) {
        self.lock_state().streams.remove(&id);
    }

    /// Mark the session dead and release everything waiting on it
    fn terminate(&self) {
        let streams = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.inbound = None;
            state.pings.clear();
            std::mem::take(&mut state.streams)
        };

        for stream in streams.values() {
            let mut stream = lock(stream);
            stream.session_closed = true;
            stream.wake_all();
        }
        self.closed.cancel();
    }

    fn handle_frame(&self, frame: Frame) -> Result<(), MuxError> {
        trace!(
            frame_type = ?frame.header.frame_type,
            flags = frame.flags().bits(),
            stream = %frame.stream_id(),
            length = frame.header.length,
            "frame received"
        );

        match frame.header.frame_type {
            FrameType::Data | FrameType::WindowUpdate => self.handle_stream_frame(frame),
            FrameType::Ping => {
                let opaque = frame.header.length;
                if frame.flags().contains(Flags::SYN) {
                    self.send(Frame::ping(Flags::ACK, opaque))
                } else {
                    if frame.flags().contains(Flags::ACK) {
                        if let Some(waiter) = self.lock_state().pings.remove(&opaque) {
                            let _ = waiter.send(());
                        }
                    }
                    Ok(())
                }
            }
            FrameType::GoAway => Err(MuxError::RemoteGoAway(frame.header.length)),
        }
    }

    fn handle_stream_frame(&self, frame: Frame) -> Result<(), MuxError> {
        let id = frame.stream_id();
        let flags = frame.flags();

        if flags.contains(Flags::SYN) && !self.accept_incoming(id)? {
            return Ok(());
        }

        let Some(stream) = self.lock_state().streams.get(&id).cloned() else {
            // Stream already released locally
            return Ok(());
        };
        let mut stream = lock(&stream);

        match frame.header.frame_type {
            FrameType::Data => {
                let len = frame.body.len() as u32;
                if len > stream.recv_window {
                    return Err(MuxError::FlowControlViolation(id));
                }
                stream.recv_window -= len;
                if !frame.body.is_empty() {
                    stream.recv_buf.push_back(frame.body);
                    stream.wake_reader();
                }
            }
            _ => {
                stream.send_window = stream.send_window.saturating_add(frame.header.length);
                stream.wake_writer();
            }
        }

        if flags.contains(Flags::FIN) {
            stream.read_closed = true;
            stream.wake_reader();
        }
        if flags.contains(Flags::RST) {
            stream.reset = true;
            stream.wake_all();
        }
        Ok(())
    }

    /// Register a stream opened by the peer; false when it was refused
    fn accept_incoming(&self, id: StreamId) -> Result<bool, MuxError> {
        if self.mode == Mode::Client {
            debug!(stream = %id, "refusing peer-initiated stream");
            self.send(Frame::window_update(id, Flags::RST, 0))?;
            return Ok(false);
        }
        if id == StreamId::SESSION || !id.is_client() {
            return Err(MuxError::InvalidStreamId(id));
        }

        let mut state = self.lock_state();
        if state.streams.contains_key(&id) {
            return Err(MuxError::InvalidStreamId(id));
        }
        if state.streams.len() >= self.config.max_streams {
            warn!(stream = %id, limit = self.config.max_streams, "stream limit reached, resetting");
            self.send(Frame::window_update(id, Flags::RST, 0))?;
            return Ok(false);
        }

        let stream = StreamState::new(self.config.receive_window, DEFAULT_WINDOW);
        state.streams.insert(id, Arc::new(Mutex::new(stream)));
        self.send(Frame::window_update(
            id,
            Flags::ACK,
            self.config.receive_window - DEFAULT_WINDOW,
        ))?;
        if let Some(inbound) = &state.inbound {
            let _ = inbound.send(id);
        }
        Ok(true)
    }
}

/// Handle to a multiplexed session
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Start a session over `io`
    ///
    /// Spawns the reader and writer tasks on the current runtime. The
    /// session ends when the connection fails, the peer sends go away,
    /// or [`Session::close`] is called.
    pub fn new<T>(io: T, mode: Mode, config: MuxConfig) -> Result<Self, MuxError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let max_body = config.receive_window as usize;

        let shared = Arc::new(Shared {
            mode,
            state: Mutex::new(SessionState {
                next_stream_id: match mode {
                    Mode::Client => 1,
                    Mode::Server => 2,
                },
                streams: HashMap::new(),
                pings: HashMap::new(),
                inbound: (mode == Mode::Server).then_some(inbound_tx),
                closed: false,
            }),
            config,
            outbound: outbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: CancellationToken::new(),
            ping_seq: AtomicU32::new(0),
        });

        let (reader, writer) = tokio::io::split(io);
        tokio::spawn(read_loop(
            shared.clone(),
            FramedRead::new(reader, FrameCodec::new(max_body)),
        ));
        tokio::spawn(write_loop(
            shared.clone(),
            FramedWrite::new(writer, FrameCodec::new(max_body)),
            outbound_rx,
        ));

        Ok(Self { shared })
    }

    /// Open a new outbound stream
    pub fn open_stream(&self) -> Result<MuxStream, MuxError> {
        let mut state = self.shared.lock_state();
        if state.closed {
            return Err(MuxError::SessionClosed);
        }
        if state.streams.len() >= self.shared.config.max_streams {
            return Err(MuxError::TooManyStreams(state.streams.len()));
        }

        let id = StreamId::new(state.next_stream_id);
        state.next_stream_id = state
            .next_stream_id
            .checked_add(2)
            .ok_or(MuxError::TooManyStreams(state.streams.len()))?;

        let stream = Arc::new(Mutex::new(StreamState::new(
            self.shared.config.receive_window,
            DEFAULT_WINDOW,
        )));
        state.streams.insert(id, stream.clone());
        drop(state);

        let delta = self.shared.config.receive_window - DEFAULT_WINDOW;
        if let Err(e) = self.shared.send(Frame::window_update(id, Flags::SYN, delta)) {
            self.shared.remove_stream(id);
            return Err(e);
        }

        trace!(stream = %id, "stream opened");
        Ok(MuxStream::new(id, stream, self.shared.clone()))
    }

    /// Wait for the next stream opened by the peer
    ///
    /// Only server-mode sessions accept streams; on a client session this
    /// returns [`MuxError::SessionClosed`] immediately.
    pub async fn accept(&self) -> Result<MuxStream, MuxError> {
        let mut inbound = self.shared.inbound_rx.lock().await;
        loop {
            let id = inbound.recv().await.ok_or(MuxError::SessionClosed)?;
            let stream = self.shared.lock_state().streams.get(&id).cloned();
            if let Some(stream) = stream {
                return Ok(MuxStream::new(id, stream, self.shared.clone()));
            }
        }
    }

    /// Send a ping and wait for the answer, returning the round-trip time
    pub async fn ping(&self) -> Result<Duration, MuxError> {
        let opaque = self.shared.ping_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.lock_state();
            if state.closed {
                return Err(MuxError::SessionClosed);
            }
            state.pings.insert(opaque, tx);
        }

        let started = Instant::now();
        if let Err(e) = self.shared.send(Frame::ping(Flags::SYN, opaque)) {
            self.shared.lock_state().pings.remove(&opaque);
            return Err(e);
        }

        let timeout = self.shared.config.ping_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(_)) => Err(MuxError::SessionClosed),
            Err(_) => {
                self.shared.lock_state().pings.remove(&opaque);
                Err(MuxError::PingTimeout(timeout))
            }
        }
    }

    /// Close the session, telling the peer we are going away
    ///
    /// Idempotent. Every stream observes the session as closed.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.shared.send(Frame::go_away(GoAwayCode::Normal));
        self.shared.terminate();
    }

    /// Whether the session has ended
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Resolves once the session has ended for any reason
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    /// Number of streams currently open
    pub fn stream_count(&self) -> usize {
        self.shared.lock_state().streams.len()
    }

    pub fn mode(&self) -> Mode {
        self.shared.mode
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.shared.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut frames: FramedRead<R, FrameCodec>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            next = frames.next() => next,
            _ = shared.closed.cancelled() => break,
        };

        match next {
            Some(Ok(frame)) => match shared.handle_frame(frame) {
                Ok(()) => {}
                Err(MuxError::RemoteGoAway(code)) => {
                    debug!(code, "peer sent go away");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "protocol violation, closing session");
                    let _ = shared.send(Frame::go_away(GoAwayCode::ProtocolError));
                    break;
                }
            },
            Some(Err(MuxError::Io(e))) => {
                debug!(error = %e, "session read failed");
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "malformed frame, closing session");
                let _ = shared.send(Frame::go_away(GoAwayCode::ProtocolError));
                break;
            }
            None => {
                debug!("connection closed by peer");
                break;
            }
        }
    }
    shared.terminate();
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    mut sink: FramedWrite<W, FrameCodec>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let result = tokio::select! {
                    biased;
                    result = sink.send(frame) => result,
                    _ = shared.closed.cancelled() => break,
                };
                if let Err(e) = result {
                    debug!(error = %e, "session write failed");
                    shared.terminate();
                    return;
                }
            }
            _ = shared.closed.cancelled() => break,
        }
    }

    // Push out anything queued before the close, go away included
    let drain = async {
        while let Ok(frame) = outbound.try_recv() {
            sink.feed(frame).await?;
        }
        sink.close().await
    };
    if let Err(e) = tokio::time::timeout(FLUSH_TIMEOUT, drain)
        .await
        .unwrap_or(Ok(()))
    {
        debug!(error = %e, "flush on close failed");
    }
    shared.terminate();
}
