use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use log::debug;
use serialport::{ClearBuffer, SerialPort};

use crate::error::{DriverError, Result};

/// Byte transport underneath the driver.
pub trait Channel: Read + Write + Send {
    fn timeout(&self) -> Duration;
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
    fn clear_input(&mut self) -> Result<()>;
    fn clear_output(&mut self) -> Result<()>;

    /// Second handle onto the same device, used by the emergency stop.
    fn try_clone_channel(&self) -> Result<Self>
    where
        Self: Sized;
}

impl Channel for Box<dyn SerialPort> {
    fn timeout(&self) -> Duration {
        SerialPort::timeout(self.as_ref())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        Ok(SerialPort::set_timeout(self.as_mut(), timeout)?)
    }

    fn clear_input(&mut self) -> Result<()> {
        Ok(self.clear(ClearBuffer::Input)?)
    }

    fn clear_output(&mut self) -> Result<()> {
        Ok(self.clear(ClearBuffer::Output)?)
    }

    fn try_clone_channel(&self) -> Result<Self> {
        Ok(self.try_clone()?)
    }
}

/// Overrides the read timeout of a channel until dropped.
pub struct TimeoutGuard<'a, C: Channel> {
    channel: &'a mut C,
    previous: Duration,
}

impl<'a, C: Channel> TimeoutGuard<'a, C> {
    pub fn new(channel: &'a mut C, timeout: Duration) -> Result<Self> {
        let previous = channel.timeout();
        channel.set_timeout(timeout)?;
        Ok(Self { channel, previous })
    }
}

impl<C: Channel> Deref for TimeoutGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.channel
    }
}

impl<C: Channel> DerefMut for TimeoutGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.channel
    }
}

impl<C: Channel> Drop for TimeoutGuard<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.channel.set_timeout(self.previous) {
            debug!("restoring timeout failed: {}", e);
        }
    }
}

pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Reads exactly `buffer.len()` bytes, accumulating partial reads until the
/// channel's current timeout has elapsed.
pub fn read_exact<C: Channel + ?Sized>(channel: &mut C, buffer: &mut [u8]) -> Result<()> {
    let deadline = Instant::now() + channel.timeout();
    let mut received = 0;

    while received < buffer.len() {
        match channel.read(&mut buffer[received..]) {
            Ok(0) => {}
            Ok(n) => received += n,
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(e.into()),
        }

        if received < buffer.len() && Instant::now() >= deadline {
            return Err(DriverError::Timeout {
                expected: buffer.len(),
                received,
            });
        }
    }

    debug!("recv {:02X?}", buffer);
    Ok(())
}

/// Reads up to and including the next `\n`, stopping early at `max` bytes or
/// when the timeout elapses. Whatever arrived is returned, possibly nothing.
pub fn read_line<C: Channel + ?Sized>(channel: &mut C, max: usize) -> Result<Vec<u8>> {
    let deadline = Instant::now() + channel.timeout();
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < max && Instant::now() < deadline {
        match channel.read(&mut byte) {
            Ok(0) => {}
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    debug!("recv line {:?}", String::from_utf8_lossy(&line));
    Ok(line)
}

/// Reads and throws away whatever the device is still sending, until the
/// line goes quiet for `quiet` or `limit` bytes have been dropped.
pub fn drain_input<C: Channel>(channel: &mut C, quiet: Duration, limit: usize) -> Result<usize> {
    let mut channel = TimeoutGuard::new(channel, quiet)?;
    let mut buffer = [0u8; 256];
    let mut dropped = 0;

    while dropped < limit {
        match channel.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => dropped += n,
            Err(e) if is_timeout(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if dropped > 0 {
        debug!("drained {} stale bytes", dropped);
    }
    Ok(dropped)
}

pub fn flush<C: Channel + ?Sized>(channel: &mut C) -> Result<()> {
    channel.clear_input()?;
    channel.clear_output()
}
