//! Logical streams carried by a session

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::codec::Frame;
use crate::frame::{Flags, StreamId};
use crate::session::Shared;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-stream state shared between the session reader and the stream handle
#[derive(Debug)]
pub(crate) struct StreamState {
    /// Received payload not yet read by the application
    pub recv_buf: VecDeque<Bytes>,
    /// Credit the peer still has for sending to us
    pub recv_window: u32,
    /// Bytes consumed by the reader and not yet returned to the peer
    pub pending_credit: u32,
    /// Credit we still have for sending to the peer
    pub send_window: u32,
    /// Peer sent FIN
    pub read_closed: bool,
    /// We sent FIN
    pub write_closed: bool,
    /// RST seen in either direction
    pub reset: bool,
    /// Owning session is gone
    pub session_closed: bool,
    pub read_waker: Option<Waker>,
    pub write_waker: Option<Waker>,
}

impl StreamState {
    pub fn new(recv_window: u32, send_window: u32) -> Self {
        Self {
            recv_buf: VecDeque::new(),
            recv_window,
            pending_credit: 0,
            send_window,
            read_closed: false,
            write_closed: false,
            reset: false,
            session_closed: false,
            read_waker: None,
            write_waker: None,
        }
    }

    pub fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    pub fn wake_writer(&mut self) {
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }

    pub fn wake_all(&mut self) {
        self.wake_reader();
        self.wake_writer();
    }
}

/// A bidirectional byte stream multiplexed over a session
///
/// Reading returns EOF once the peer half-closes or the session ends.
/// Dropping the handle resets the stream if the peer has not finished
/// sending, otherwise it half-closes our side.
pub struct MuxStream {
    id: StreamId,
    state: Arc<Mutex<StreamState>>,
    shared: Arc<Shared>,
}

impl MuxStream {
    pub(crate) fn new(id: StreamId, state: Arc<Mutex<StreamState>>, shared: Arc<Shared>) -> Self {
        Self { id, state, shared }
    }

    /// Identifier of this stream within its session
    pub fn id(&self) -> StreamId {
        self.id
    }
}

impl fmt::Debug for MuxStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxStream").field("id", &self.id).finish()
    }
}

impl AsyncRead for MuxStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = lock(&self.state);

        if !state.recv_buf.is_empty() {
            let mut copied = 0usize;
            while buf.remaining() > 0 {
                let Some(chunk) = state.recv_buf.front_mut() else {
                    break;
                };
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                chunk.advance(n);
                if chunk.is_empty() {
                    state.recv_buf.pop_front();
                }
                copied += n;
            }

            state.pending_credit += copied as u32;
            let window = self.shared.config.receive_window;
            if state.pending_credit >= window / 2 && !state.read_closed && !state.reset {
                let delta = std::mem::take(&mut state.pending_credit);
                state.recv_window += delta;
                let _ = self
                    .shared
                    .send(Frame::window_update(self.id, Flags::NONE, delta));
            }
            return Poll::Ready(Ok(()));
        }

        if state.reset {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("{} was reset", self.id),
            )));
        }
        if state.read_closed || state.session_closed {
            return Poll::Ready(Ok(()));
        }

        state.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MuxStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = lock(&self.state);

        if state.reset {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("{} was reset", self.id),
            )));
        }
        if state.write_closed || state.session_closed {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if state.send_window == 0 {
            state.write_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf
            .len()
            .min(state.send_window as usize)
            .min(self.shared.config.max_frame_size);
        state.send_window -= n as u32;
        drop(state);

        self.shared
            .send(Frame::data(self.id, Flags::NONE, Bytes::copy_from_slice(&buf[..n])))
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Frames are handed to the session writer as soon as they are produced
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut state = lock(&self.state);
        if !state.write_closed && !state.reset && !state.session_closed {
            state.write_closed = true;
            drop(state);
            let _ = self
                .shared
                .send(Frame::window_update(self.id, Flags::FIN, 0));
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for MuxStream {
    fn drop(&mut self) {
        let flags = {
            let mut state = lock(&self.state);
            if state.reset || state.session_closed {
                None
            } else if !state.read_closed {
                state.reset = true;
                Some(Flags::RST)
            } else if !state.write_closed {
                state.write_closed = true;
                Some(Flags::FIN)
            } else {
                None
            }
        };

        if let Some(flags) = flags {
            let _ = self.shared.send(Frame::window_update(self.id, flags, 0));
        }
        self.shared.remove_stream(self.id);
    }
}
