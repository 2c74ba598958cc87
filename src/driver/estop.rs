use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::Result;
use crate::port::Channel;
use crate::protocol::{encode, Opcode};

struct Shared<C> {
    channel: Mutex<Option<C>>,
    tripped: AtomicBool,
}

/// Sends `SET_MOTORS_OFF` over a second handle to the port without waiting
/// for the command guard. The frame may land in the middle of an exchange
/// that is in flight; the driver discards the stray acknowledgement before
/// its next command.
pub struct EmergencyStop<C: Channel> {
    shared: Arc<Shared<C>>,
}

impl<C: Channel> Clone for EmergencyStop<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Channel> EmergencyStop<C> {
    pub(crate) fn new(channel: Option<C>) -> Self {
        Self {
            shared: Arc::new(Shared {
                channel: Mutex::new(channel),
                tripped: AtomicBool::new(false),
            }),
        }
    }

    /// Returns whether the stop frame was written. Never blocks and never
    /// fails; problems are logged.
    pub fn trigger(&self) -> bool {
        let mut guard = match self.shared.channel.try_lock() {
            Some(guard) => guard,
            None => {
                debug!("emergency stop already in progress");
                return false;
            }
        };

        let channel = match guard.as_mut() {
            Some(channel) => channel,
            None => {
                debug!("emergency stop ignored, driver closed");
                return false;
            }
        };

        match send_stop(channel) {
            Ok(()) => {
                self.shared.tripped.store(true, Ordering::SeqCst);
                info!("emergency stop sent");
                true
            }
            Err(e) => {
                warn!("emergency stop failed: {}", e);
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.shared.channel.lock().is_some()
    }

    /// Releases the second handle.
    pub(crate) fn disarm(&self) {
        self.shared.channel.lock().take();
    }

    pub(crate) fn take_tripped(&self) -> bool {
        self.shared.tripped.swap(false, Ordering::SeqCst)
    }
}

fn send_stop<C: Channel>(channel: &mut C) -> Result<()> {
    let frame = encode(Opcode::SetMotorsOff, &[])?;
    channel.write_all(&frame)?;
    channel.flush()?;
    Ok(())
}
