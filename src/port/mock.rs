//! In-memory stand-in for the serial link, driven by a scripted device model.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::Channel;
use crate::error::Result;
use crate::protocol::{Opcode, PACKET_LENGTH};

const POLL: Duration = Duration::from_millis(1);

type Responder = Box<dyn FnMut(&mut Vec<u8>) -> Vec<u8> + Send>;

struct MockState {
    input: VecDeque<u8>,
    request: Vec<u8>,
    written: Vec<u8>,
    responder: Responder,
    read_error: Option<io::ErrorKind>,
    timeout: Duration,
}

/// The responder sees every byte written but not yet consumed, drains what
/// it understands and returns the device's reply. Reads block until input
/// arrives or the timeout elapses, as on a serial port.
#[derive(Clone)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    read_chunk: usize,
    write_chunk: usize,
    latency: Duration,
}

impl MockChannel {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&mut Vec<u8>) -> Vec<u8> + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(MockState {
                input: VecDeque::new(),
                request: Vec::new(),
                written: Vec::new(),
                responder: Box::new(responder),
                read_error: None,
                timeout: Duration::from_millis(50),
            })),
            read_chunk: usize::MAX,
            write_chunk: usize::MAX,
            latency: Duration::ZERO,
        }
    }

    /// A robot that echoes framed requests and answers the identification
    /// query with `info`.
    pub fn robot(info: &str) -> Self {
        Self::new(robot_responder(info.as_bytes().to_vec(), Vec::new()))
    }

    /// Like [`MockChannel::robot`], streaming `image` for each capture.
    pub fn robot_with_image(info: &str, image: Vec<u8>) -> Self {
        Self::new(robot_responder(info.as_bytes().to_vec(), image))
    }

    pub fn with_read_chunk(mut self, n: usize) -> Self {
        self.read_chunk = n;
        self
    }

    pub fn with_write_chunk(mut self, n: usize) -> Self {
        self.write_chunk = n;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.state.lock().input.extend(bytes);
    }

    /// Delivers `bytes` from another thread once `delay` has passed, like a
    /// reply that arrives after its reader gave up.
    pub fn push_input_after(&self, bytes: &[u8], delay: Duration) {
        let state = Arc::clone(&self.state);
        let bytes = bytes.to_vec();
        thread::spawn(move || {
            thread::sleep(delay);
            state.lock().input.extend(bytes);
        });
    }

    pub fn pending_input(&self) -> usize {
        self.state.lock().input.len()
    }

    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.state.lock().read_error = Some(kind);
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    pub fn last_frame(&self) -> Option<[u8; PACKET_LENGTH]> {
        let state = self.state.lock();
        let written = &state.written;
        if written.len() < PACKET_LENGTH {
            return None;
        }
        written[written.len() - PACKET_LENGTH..].try_into().ok()
    }
}

/// Echoes every 9-byte frame, answers `GET_INFO` with `info` and the one-byte
/// `GET_IMAGE` request with `image`.
pub fn robot_responder(
    info: Vec<u8>,
    image: Vec<u8>,
) -> impl FnMut(&mut Vec<u8>) -> Vec<u8> + Send + 'static {
    move |request: &mut Vec<u8>| {
        let mut reply = Vec::new();
        loop {
            match request.first() {
                Some(&op) if op == Opcode::GetImage as u8 => {
                    request.remove(0);
                    reply.extend_from_slice(&image);
                }
                Some(&op) if op == Opcode::GetInfo as u8 && request.len() >= PACKET_LENGTH => {
                    request.drain(..PACKET_LENGTH);
                    reply.extend_from_slice(&info);
                }
                Some(_) if request.len() >= PACKET_LENGTH => {
                    reply.extend(request.drain(..PACKET_LENGTH));
                }
                _ => return reply,
            }
        }
    }
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let started = Instant::now();
        loop {
            let mut state = self.state.lock();
            if let Some(kind) = state.read_error.take() {
                return Err(io::Error::new(kind, "injected"));
            }

            if !state.input.is_empty() {
                let n = buf.len().min(self.read_chunk).min(state.input.len());
                for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }

            let timeout = state.timeout;
            drop(state);
            if started.elapsed() >= timeout {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
            }
            thread::sleep(POLL);
        }
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.write_chunk);
        {
            let mut state = self.state.lock();
            let state = &mut *state;
            state.written.extend_from_slice(&buf[..n]);
            state.request.extend_from_slice(&buf[..n]);
            let reply = (state.responder)(&mut state.request);
            state.input.extend(reply);
        }
        if n < buf.len() {
            thread::yield_now();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for MockChannel {
    fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.state.lock().timeout = timeout;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.state.lock().input.clear();
        Ok(())
    }

    fn clear_output(&mut self) -> Result<()> {
        Ok(())
    }

    fn try_clone_channel(&self) -> Result<Self> {
        Ok(self.clone())
    }
}
