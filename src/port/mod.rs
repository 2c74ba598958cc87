#[cfg(not(target_os = "linux"))]
mod generic;
#[cfg(target_os = "linux")]
mod linux;

mod channel;
#[cfg(test)]
pub(crate) mod mock;

#[cfg(not(target_os = "linux"))]
use generic::is_port_open;
#[cfg(target_os = "linux")]
use linux::is_port_open;

pub(crate) use channel::is_timeout;
pub use channel::{drain_input, flush, read_exact, read_line, Channel, TimeoutGuard};
pub use serialport::SerialPort;

use core::time::Duration;
use log::{debug, warn};
use std::fmt;
use serialport::{self, DataBits, Parity, SerialPortType, StopBits};
use std::thread;
use thiserror::Error;

use crate::error::{DriverError, Result};

#[derive(Error, Debug)]
pub enum OpenPortError {
    #[error("no scribbler compatible ports found")]
    NoCompatiblePort,
    #[error("{port_name:?} busy")]
    PortBusy { port_name: String },
}

#[derive(PartialEq)]
struct UsbId(u16, u16);

static COMPATIBLE_IDS: &[UsbId] = &[
    UsbId(0x0403, 0x6001), // FTDI FT232R (Parallax USB serial adapter)
    UsbId(0x067b, 0x2303), // Prolific PL2303 serial cable
    UsbId(0x1a86, 0x7523), // QinHeng Electronics HL-340 USB-Serial adapter
];

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub baudrate: u32,
    /// Open even if another process holds the device
    pub force: bool,
    pub attempts: usize,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            baudrate: 38400,
            force: false,
            attempts: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

fn connection_error(
    port: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> DriverError {
    DriverError::Connection {
        port: port.to_string(),
        source: source.into(),
    }
}

/// Opens the serial link to the robot. `auto` picks the first known
/// USB-serial bridge or Bluetooth port.
pub fn open_port(port_name: &str, options: &OpenOptions) -> Result<Box<dyn SerialPort>> {
    let true_name: String = if port_name == "auto" {
        guess_port().map_err(|e| connection_error(port_name, e))?
    } else {
        port_name.to_string()
    };

    if !options.force && is_port_open(&true_name) {
        return Err(connection_error(
            &true_name,
            OpenPortError::PortBusy {
                port_name: true_name.clone(),
            },
        ));
    }

    let port = retry_open(&true_name, options, || do_open_port(&true_name, options))
        .map_err(|e| connection_error(&true_name, e))?;
    debug!("open_port OK: {} @ {} baud", &true_name, options.baudrate);
    Ok(port)
}

/// Calls `open` up to `options.attempts` times (at least once), sleeping
/// `options.backoff` between failures. The last error is returned.
fn retry_open<T, E: fmt::Display>(
    port_name: &str,
    options: &OpenOptions,
    mut open: impl FnMut() -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let attempts = options.attempts.max(1);
    let mut attempt = 1;

    loop {
        match open() {
            Ok(port) => return Ok(port),
            Err(e) => {
                warn!("open {} attempt {}/{} failed: {}", port_name, attempt, attempts, e);
                if attempt >= attempts {
                    return Err(e);
                }
                attempt += 1;
                thread::sleep(options.backoff);
            }
        }
    }
}

fn do_open_port(port_name: &str, options: &OpenOptions) -> serialport::Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(port_name, options.baudrate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(options.timeout)
        .open()?;

    // A directly connected Scribbler 2 resets when DTR is asserted.
    port.write_data_terminal_ready(false)?;
    Ok(port)
}

fn guess_port() -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> {
    serialport::available_ports()?
        .into_iter()
        .filter(|info| match &info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                COMPATIBLE_IDS.contains(&UsbId(usb_info.vid, usb_info.pid))
            }
            SerialPortType::BluetoothPort => !is_port_open(&info.port_name),
            SerialPortType::PciPort | SerialPortType::Unknown => false,
        })
        .map(|info| info.port_name)
        .next()
        .ok_or_else(|| OpenPortError::NoCompatiblePort.into())
}
