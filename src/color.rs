//! YUV <-> RGB conversion for the dongle camera.
//!
//! Standalone helpers for callers that decode colour data themselves; the
//! driver's own capture path ([`ScribblerDriver::take_picture`]) is
//! single-channel and does not go through here.
//!
//! Each channel is computed in floating point, truncated toward zero and then
//! clamped to a byte, matching the dongle's own conversion.
//!
//! [`ScribblerDriver::take_picture`]: crate::ScribblerDriver::take_picture

fn to_byte(v: f64) -> u8 {
    (v.trunc() as i64).clamp(0, 255) as u8
}

pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let (y, u, v) = (f64::from(y), f64::from(u) - 128.0, f64::from(v) - 128.0);

    [
        to_byte(y + 1.4075 * v),
        to_byte(y - 0.3455 * u - 0.7169 * v),
        to_byte(y + 1.7790 * u),
    ]
}

pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));

    [
        to_byte(0.299 * r + 0.587 * g + 0.114 * b),
        to_byte(-0.169 * r - 0.332 * g + 0.500 * b + 128.0),
        to_byte(0.500 * r - 0.419 * g - 0.0813 * b + 128.0),
    ]
}

/// Converts a packed YUYV buffer (two pixels per `Y0 U Y1 V` quad) to
/// interleaved RGB.
pub fn yuyv_to_rgb(buffer: &[u8]) -> Vec<u8> {
    buffer
        .chunks_exact(4)
        .flat_map(|quad| {
            let [y0, u, y1, v] = [quad[0], quad[1], quad[2], quad[3]];
            let first = yuv_to_rgb(y0, u, v);
            let second = yuv_to_rgb(y1, u, v);
            first.into_iter().chain(second)
        })
        .collect()
}
