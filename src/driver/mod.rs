//! Command/response driver for a Scribbler robot behind a Fluke dongle.
//!
//! Every exchange holds the session lock from the first byte written until
//! the last byte of the reply is read, so frames from concurrent callers are
//! never interleaved on the wire. The emergency stop is the only writer that
//! bypasses the lock.

mod config;
mod estop;
pub mod fields;

pub use config::DriverConfig;
pub use estop::EmergencyStop;
pub use fields::{
    parse_number, Field, FieldSpecError, Forwardness, LedTarget, Position, Reading, Setting,
    Side, Volume,
};

use std::io::Write;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use num_traits::FromPrimitive;
use parking_lot::Mutex;

use crate::error::{DriverError, EncodingError, Result};
use crate::image::{read_image, Image};
use crate::info::{ConnectionInfo, Resolution};
use crate::motion::{self, check_finite, MotionState};
use crate::port::{
    drain_input, flush, open_port, read_exact, read_line, Channel, SerialPort, TimeoutGuard,
};
use crate::protocol::{
    decode_ack, encode, encode_info_request, encode_raw, i16_operands, i32_operands,
    u16_operands, Ack, Opcode, BEGIN_PATH, BY, DEG, END_PATH, PACKET_LENGTH, TO,
};
use fields::{Command, Query};

const INFO_LINE_MAX: usize = 256;
const DRAIN_LIMIT: usize = 50_000;
const RESYNC_QUIET: Duration = Duration::from_millis(50);
const ECHO_SETTLE: Duration = Duration::from_millis(250);
const CAMERA_SETTLE: Duration = Duration::from_millis(150);

/// Duration of a whole note at the default tempo.
pub const WHOLE_NOTE: Duration = Duration::from_millis(545);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl DriverState {
    pub fn can_become(self, next: DriverState) -> bool {
        use DriverState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Closed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMode {
    /// Relative to the current pose
    By,
    /// Absolute
    To,
}

impl MoveMode {
    fn flag(self) -> u8 {
        match self {
            MoveMode::By => BY,
            MoveMode::To => TO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Degrees,
    Radians,
    /// The robot's own angle units
    Native,
}

/// A tone of `beats` whole notes, optionally a two-frequency chord.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub frequency: u16,
    pub frequency2: Option<u16>,
    pub beats: f64,
}

impl Note {
    pub fn new(frequency: u16, beats: f64) -> Self {
        Self {
            frequency,
            frequency2: None,
            beats,
        }
    }

    pub fn chord(frequency: u16, frequency2: u16, beats: f64) -> Self {
        Self {
            frequency,
            frequency2: Some(frequency2),
            beats,
        }
    }
}

fn exchange<C: Channel>(channel: &mut C, frame: &[u8; PACKET_LENGTH]) -> Result<Ack> {
    debug!("send {:02X?}", frame);
    channel.write_all(frame)?;

    let mut buffer = [0u8; PACKET_LENGTH];
    read_exact(channel, &mut buffer)?;
    let ack = decode_ack(&buffer)?;
    if ack.opcode() != frame[0] {
        warn!(
            "acknowledgement {:02X?} ({:?}) does not echo opcode {}",
            ack.as_bytes(),
            Opcode::from_u8(ack.opcode()),
            frame[0]
        );
    }
    Ok(ack)
}

fn send_raw<C: Channel>(channel: &mut C, opcode: Opcode, operands: &[i64]) -> Result<()> {
    let request = encode_raw(opcode, operands)?;
    debug!("send {:02X?}", request);
    channel.write_all(&request)?;
    Ok(())
}

/// Identification handshake. The first reply after a reset is unreliable,
/// so the query is sent twice and only the second answer is parsed.
fn query_info<C: Channel>(channel: &mut C, config: &DriverConfig) -> Result<ConnectionInfo> {
    let mut channel = TimeoutGuard::new(channel, config.handshake_timeout)?;
    drain_input(&mut *channel, config.drain_quiet, DRAIN_LIMIT)?;

    let request = encode_info_request();
    debug!("send {:02X?}", request);
    channel.write_all(&request)?;
    read_line(&mut *channel, INFO_LINE_MAX)?;

    thread::sleep(config.settle_delay);

    channel.write_all(&request)?;
    let line = read_line(&mut *channel, INFO_LINE_MAX)?;
    // ISO-8859-1
    let text: String = line.iter().map(|&b| char::from(b)).collect();
    Ok(ConnectionInfo::parse(&text)?)
}

struct Session<C> {
    channel: Option<C>,
    state: DriverState,
    motion: MotionState,
    /// A reply may still be in flight; drain before the next exchange.
    stale: bool,
}

impl<C: Channel> Session<C> {
    fn transition(&mut self, next: DriverState) {
        debug_assert!(self.state.can_become(next));
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn channel(&mut self) -> Result<&mut C> {
        self.channel.as_mut().ok_or(DriverError::Closed)
    }

    fn exchange(&mut self, frame: &[u8; PACKET_LENGTH]) -> Result<Ack> {
        exchange(self.channel()?, frame)
    }

    fn query(&mut self, query: &Query) -> Result<Vec<u8>> {
        let channel = self.channel()?;
        if query.echoed {
            exchange(channel, &encode(query.opcode, &query.operands)?)?;
        } else {
            send_raw(channel, query.opcode, &query.operands)?;
        }

        let mut payload = vec![0u8; query.len];
        read_exact(channel, &mut payload)?;
        Ok(payload)
    }

    fn command(&mut self, command: &Command) -> Result<()> {
        let channel = self.channel()?;
        if command.framed {
            exchange(channel, &encode(command.opcode, &command.operands)?)?;
        } else {
            send_raw(channel, command.opcode, &command.operands)?;
        }
        Ok(())
    }

    fn resync(&mut self, limit: usize) -> Result<()> {
        drain_input(self.channel()?, RESYNC_QUIET, limit)?;
        self.stale = false;
        Ok(())
    }

    /// Best effort motors-off after an interrupted exchange.
    fn halt(&mut self) {
        self.motion = MotionState::default();

        let result = self.channel().and_then(|channel| {
            drain_input(channel, RESYNC_QUIET, DRAIN_LIMIT)?;
            exchange(channel, &encode(Opcode::SetMotorsOff, &[])?)
        });
        if let Err(e) = result {
            warn!("stopping motors after interrupt failed: {}", e);
        }
    }
}

/// Driver for one robot connection. Safe to share between threads; commands
/// are serialised in the order the lock is acquired.
pub struct ScribblerDriver<C: Channel = Box<dyn SerialPort>> {
    session: Mutex<Session<C>>,
    info: ConnectionInfo,
    resolution: Resolution,
    config: DriverConfig,
    estop: EmergencyStop<C>,
}

impl ScribblerDriver<Box<dyn SerialPort>> {
    /// Opens `port_name` (or `auto`) and performs the handshake.
    pub fn open(port_name: &str, config: DriverConfig) -> Result<Self> {
        info!("connecting to {} @ {} baud", port_name, config.baudrate);
        let port = open_port(port_name, &config.open_options())?;
        Self::with_channel(port, config)
    }
}

impl<C: Channel> ScribblerDriver<C> {
    /// Runs the handshake over an already open channel.
    pub fn with_channel(channel: C, config: DriverConfig) -> Result<Self> {
        let mut session = Session {
            channel: Some(channel),
            state: DriverState::Disconnected,
            motion: MotionState::default(),
            stale: false,
        };
        session.transition(DriverState::Connecting);

        let info = match session
            .channel()
            .and_then(|channel| query_info(channel, &config))
        {
            Ok(info) => info,
            Err(e) => {
                session.transition(DriverState::Disconnected);
                return Err(e);
            }
        };

        let channel = session.channel()?;
        channel.set_timeout(config.command_timeout)?;
        let estop = match channel.try_clone_channel() {
            Ok(clone) => EmergencyStop::new(Some(clone)),
            Err(e) => {
                warn!("emergency stop unavailable: {}", e);
                EmergencyStop::new(None)
            }
        };

        let resolution = info.resolution();
        info!(
            "connected, fluke {} camera {}x{}",
            info.firmware(),
            resolution.width,
            resolution.height
        );
        session.transition(DriverState::Connected);

        Ok(Self {
            session: Mutex::new(session),
            info,
            resolution,
            config,
            estop,
        })
    }

    fn with_session<T>(&self, op: impl FnOnce(&mut Session<C>) -> Result<T>) -> Result<T> {
        let mut session = self.session.lock();
        match session.state {
            DriverState::Connected => {}
            DriverState::Closed => return Err(DriverError::Closed),
            DriverState::Disconnected | DriverState::Connecting => {
                return Err(DriverError::NotConnected)
            }
        }

        if self.estop.take_tripped() {
            debug!("resync after emergency stop");
            session.motion = MotionState::default();
            session.stale = true;
        }
        if session.stale {
            session.resync(self.resync_limit())?;
        }

        let result = op(&mut *session);
        if let Err(e) = &result {
            if e.is_interrupt() {
                warn!("exchange interrupted, stopping motors");
                session.halt();
            } else if e.leaves_stale_input() {
                debug!("{}, resync before the next exchange", e);
                session.stale = true;
            }
        }
        result
    }

    /// Enough to swallow an abandoned camera frame.
    fn resync_limit(&self) -> usize {
        DRAIN_LIMIT.max(2 * self.resolution.pixels())
    }

    pub fn state(&self) -> DriverState {
        self.session.lock().state
    }

    /// Identification captured during the handshake.
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Fixed for the life of the connection.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn motion(&self) -> MotionState {
        self.session.lock().motion
    }

    /// Handle for stopping the motors from another thread or a signal
    /// handler while a command is in flight.
    pub fn emergency_stop_handle(&self) -> EmergencyStop<C> {
        self.estop.clone()
    }

    /// Sends one framed command and returns its acknowledgement.
    pub fn command(&self, opcode: Opcode, operands: &[i64]) -> Result<Ack> {
        let frame = encode(opcode, operands)?;
        self.with_session(|session| session.exchange(&frame))
    }

    /// Repeats the identification query.
    pub fn get_info(&self) -> Result<ConnectionInfo> {
        self.with_session(|session| query_info(session.channel()?, &self.config))
    }

    pub fn get(&self, field: Field) -> Result<Reading> {
        let (queries, decode) = field.plan();
        let mut attempt = 0;

        loop {
            let result = self.with_session(|session| {
                let mut payload = Vec::new();
                for query in &queries {
                    payload.extend(session.query(query)?);
                }
                Ok(payload)
            });

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(
                        "reading {:?} failed: {}, retry {}/{}",
                        field, e, attempt, self.config.retries
                    );
                }
                result => return result.map(|payload| Reading::decode(&payload, decode)),
            }
        }
    }

    pub fn set(&self, setting: &Setting) -> Result<()> {
        let commands = setting.commands()?;

        self.with_session(|session| {
            for command in &commands {
                session.command(command)?;
            }

            match setting {
                Setting::EchoMode(_) => {
                    thread::sleep(ECHO_SETTLE);
                    flush(session.channel()?)?;
                }
                Setting::CamParam { .. }
                | Setting::WhiteBalance(_)
                | Setting::GainControl(_)
                | Setting::ExposureControl(_) => {
                    thread::sleep(CAMERA_SETTLE);
                }
                _ => {}
            }
            Ok(())
        })
    }

    /// Drives with `translate` and `rotate` in [-1, 1]; out of range wheel
    /// speeds are clamped.
    pub fn move_robot(&self, translate: f64, rotate: f64) -> Result<()> {
        check_finite(&[translate, rotate])?;

        let motion = MotionState { translate, rotate };
        let frame = encode(Opcode::SetMotors, &motion.power().operands())?;

        self.with_session(|session| {
            session.exchange(&frame)?;
            session.motion = motion;
            Ok(())
        })
    }

    /// Drives with individual wheel velocities in [-1, 1].
    pub fn motors(&self, left: f64, right: f64) -> Result<()> {
        check_finite(&[left, right])?;
        let (translate, rotate) = motion::motors(left, right);
        self.move_robot(translate, rotate)
    }

    pub fn stop(&self) -> Result<()> {
        let frame = encode(Opcode::SetMotorsOff, &[])?;

        self.with_session(|session| {
            session.exchange(&frame)?;
            session.motion = MotionState::default();
            Ok(())
        })
    }

    /// Plays a tone. The robot acknowledges once the tone has finished.
    pub fn beep(&self, duration: Duration, frequency: u16, frequency2: Option<u16>) -> Result<()> {
        let millis = u16::try_from(duration.as_millis()).map_err(|_| {
            EncodingError::OperandOutOfRange {
                index: 0,
                value: i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
            }
        })?;

        let mut operands = u16_operands(millis).to_vec();
        operands.extend(u16_operands(frequency));
        let opcode = match frequency2 {
            Some(frequency2) => {
                operands.extend(u16_operands(frequency2));
                Opcode::SetSpeaker2
            }
            None => Opcode::SetSpeaker,
        };
        let frame = encode(opcode, &operands)?;
        let timeout = self.config.command_timeout + duration;

        self.with_session(|session| {
            let mut channel = TimeoutGuard::new(session.channel()?, timeout)?;
            exchange(&mut *channel, &frame).map(|_| ())
        })
    }

    pub fn play_note(&self, note: &Note, whole_note: Duration) -> Result<()> {
        let seconds = whole_note.as_secs_f64() * note.beats;
        let duration = Duration::try_from_secs_f64(seconds)
            .map_err(|_| EncodingError::InvalidDuration(seconds))?;
        self.beep(duration, note.frequency, note.frequency2)
    }

    pub fn play_song(&self, song: &[Note], whole_note: Duration) -> Result<()> {
        song.iter()
            .try_for_each(|note| self.play_note(note, whole_note))
    }

    /// Turns by or to `angle`. Angles are rounded to whole units.
    pub fn turn(&self, angle: f64, mode: MoveMode, unit: AngleUnit) -> Result<()> {
        check_finite(&[angle])?;

        let (value, flag) = match unit {
            AngleUnit::Degrees => (angle, mode.flag() | DEG),
            AngleUnit::Radians => (angle.to_degrees(), mode.flag() | DEG),
            AngleUnit::Native => (angle, mode.flag()),
        };

        let mut operands = vec![i64::from(flag)];
        operands.extend(i16_operands(to_i16(value, 1)?));
        self.command(Opcode::SetTurn, &operands).map(|_| ())
    }

    pub fn move_xy(&self, x: i16, y: i16, mode: MoveMode) -> Result<()> {
        let mut operands = vec![i64::from(mode.flag())];
        operands.extend(i16_operands(x));
        operands.extend(i16_operands(y));
        self.command(Opcode::SetMove, &operands).map(|_| ())
    }

    pub fn arc(&self, x: i16, y: i16, radius: i16, mode: MoveMode) -> Result<()> {
        let mut operands = vec![i64::from(mode.flag())];
        operands.extend(i16_operands(x));
        operands.extend(i16_operands(y));
        operands.extend(i16_operands(radius));
        self.command(Opcode::SetArc, &operands).map(|_| ())
    }

    /// Overwrites the odometry position.
    pub fn set_position(&self, x: i32, y: i32) -> Result<()> {
        let mut operands = i32_operands(x).to_vec();
        operands.extend(i32_operands(y));
        self.command(Opcode::SetPosn, &operands).map(|_| ())
    }

    pub fn set_angle(&self, angle: i32) -> Result<()> {
        self.command(Opcode::SetAngle, &i32_operands(angle))
            .map(|_| ())
    }

    pub fn begin_path(&self, speed: u16) -> Result<()> {
        self.path(BEGIN_PATH, speed)
    }

    pub fn end_path(&self, speed: u16) -> Result<()> {
        self.path(END_PATH, speed)
    }

    fn path(&self, marker: u8, speed: u16) -> Result<()> {
        let mut operands = vec![i64::from(marker)];
        operands.extend(u16_operands(speed));
        self.command(Opcode::SetPath, &operands).map(|_| ())
    }

    /// Captures one camera frame, upright.
    pub fn take_picture(&self) -> Result<Image> {
        let resolution = self.resolution;
        let deadline = self.config.image_deadline_for(resolution);

        let raw = self.with_session(|session| {
            read_image(
                session.channel()?,
                resolution,
                self.config.image_chunk_timeout,
                deadline,
            )
        })?;
        Image::from_wire(raw, resolution.width, resolution.height)
    }

    /// Releases the port. Further commands fail with
    /// [`DriverError::Closed`]; closing again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.state == DriverState::Closed {
            return Ok(());
        }

        self.estop.disarm();
        let result = match session.channel.take() {
            Some(mut channel) => channel.flush().map_err(DriverError::from),
            None => Ok(()),
        };
        session.transition(DriverState::Closed);
        info!("connection closed");
        result
    }
}

impl<C: Channel> Drop for ScribblerDriver<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("closing connection failed: {}", e);
        }
    }
}

fn to_i16(value: f64, index: usize) -> std::result::Result<i16, EncodingError> {
    let rounded = value.round();
    if rounded < f64::from(i16::MIN) || rounded > f64::from(i16::MAX) {
        Err(EncodingError::OperandOutOfRange {
            index,
            value: rounded as i64,
        })
    } else {
        Ok(rounded as i16)
    }
}
