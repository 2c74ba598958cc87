use std::io::{Read, Write};
use std::ops::Index;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{DriverError, Result};
use crate::info::Resolution;
use crate::port::{drain_input, is_timeout, Channel, TimeoutGuard};
use crate::protocol::{encode_raw, Opcode};

const CHUNK: usize = 4096;

/// Time allowed for a whole frame: twice the raw wire time at `baudrate`
/// (10 bits per byte) plus a fixed margin.
pub fn transfer_budget(pixels: usize, baudrate: u32) -> Duration {
    let wire = pixels as f64 * 10.0 / f64::from(baudrate.max(1));
    Duration::from_secs_f64(wire * 2.0) + Duration::from_secs(5)
}

/// Requests a frame and collects `width * height` bytes. The camera streams
/// in bursts, so each read waits at most `chunk_timeout`; the transfer as a
/// whole fails once `deadline` has passed.
pub fn read_image<C: Channel>(
    channel: &mut C,
    resolution: Resolution,
    chunk_timeout: Duration,
    deadline: Duration,
) -> Result<Vec<u8>> {
    let size = resolution.pixels();
    let request = encode_raw(Opcode::GetImage, &[])?;

    let mut channel = TimeoutGuard::new(channel, chunk_timeout)?;
    debug!("send {:02X?}", request);
    channel.write_all(&request)?;

    let started = Instant::now();
    let mut data = Vec::with_capacity(size);
    let mut chunk = [0u8; CHUNK];

    while data.len() < size {
        if started.elapsed() >= deadline {
            return Err(DriverError::ImageTransfer {
                expected: size,
                received: data.len(),
            });
        }

        let want = (size - data.len()).min(CHUNK);
        match channel.read(&mut chunk[..want]) {
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) if is_timeout(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    debug!("image complete, {} bytes in {:?}", size, started.elapsed());

    let extra = drain_input(&mut *channel, chunk_timeout * 5, 50_000)?;
    if extra > 0 {
        warn!("discarded {} bytes trailing the image", extra);
    }

    Ok(data)
}

/// Single channel image, row major, upright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Image {
    /// Builds the upright image from wire order. The camera is mounted
    /// upside down, so the frame is rotated by 180 degrees: rows and columns
    /// both reversed, which for a row-major buffer is a plain reversal.
    pub fn from_wire(mut raw: Vec<u8>, width: usize, height: usize) -> Result<Self> {
        if raw.len() != width * height {
            return Err(DriverError::ImageTransfer {
                expected: width * height,
                received: raw.len(),
            });
        }

        raw.reverse();
        Ok(Self {
            width,
            height,
            pixels: raw,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.pixels.chunks_exact(self.width.max(1))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Binary PGM (P5) encoding.
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut out = format!("P5\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }
}

/// `image[row][column]`
impl Index<usize> for Image {
    type Output = [u8];

    fn index(&self, row: usize) -> &[u8] {
        &self.pixels[row * self.width..(row + 1) * self.width]
    }
}
