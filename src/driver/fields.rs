use itertools::Itertools;
use lazy_static::lazy_static;
use num_traits::Num;
use regex::Regex;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use crate::error::EncodingError;
use crate::protocol::{cam, Opcode};

#[derive(Error, Debug)]
pub enum FieldSpecError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("invalid argument '{arg}' for {field}")]
    BadArgument { field: String, arg: String },
}

/// Accepts `0x`/`0b` prefixed or decimal numbers.
pub fn parse_number<T>(input: &str) -> Result<T, T::FromStrRadixErr>
where
    T: Num,
{
    if let Some(hex) = input.strip_prefix("0x") {
        T::from_str_radix(hex, 16)
    } else if let Some(bin) = input.strip_prefix("0b") {
        T::from_str_radix(bin, 2)
    } else {
        T::from_str_radix(input, 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedTarget {
    Left,
    Center,
    Right,
    All,
}

impl FromStr for Position {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "left" => Ok(Position::Left),
            "center" | "middle" => Ok(Position::Center),
            "right" => Ok(Position::Right),
            _ => Err(()),
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            _ => Err(()),
        }
    }
}

impl FromStr for LedTarget {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "all" => Ok(LedTarget::All),
            _ => s.parse::<Position>().map(|p| match p {
                Position::Left => LedTarget::Left,
                Position::Center => LedTarget::Center,
                Position::Right => LedTarget::Right,
            }),
        }
    }
}

/// How a query's payload is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decode {
    Bytes,
    /// Big-endian 16-bit words
    Words,
    /// Big-endian signed 32-bit values
    Ints,
    /// Single byte at the given offset
    ByteAt(usize),
    /// NUL padded text
    Text,
    /// Battery voltage from a 16-bit reading
    Volts,
}

/// One request/response pair on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Query {
    pub opcode: Opcode,
    pub operands: Vec<i64>,
    /// The robot echoes the 9-byte request before the payload; dongle-side
    /// queries are sent unframed and answer with the payload only.
    pub echoed: bool,
    pub len: usize,
}

impl Query {
    fn robot(opcode: Opcode, len: usize) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
            echoed: true,
            len,
        }
    }

    fn dongle(opcode: Opcode, operands: Vec<i64>, len: usize) -> Self {
        Self {
            opcode,
            operands,
            echoed: false,
            len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    All,
    Light(Option<Position>),
    Ir(Option<Side>),
    Line(Option<Side>),
    Stall,
    Name,
    Password,
    State,
    Data,
    /// Odometry x, y
    Location,
    Angle,
    Microphone,
    Distance(Side),
    Battery,
    DongleIr(Position),
    CamParam(u8),
}

impl Field {
    /// Wire exchanges needed for the field, concatenated payloads decoded
    /// with the returned layout.
    pub(crate) fn plan(&self) -> (Vec<Query>, Decode) {
        use Opcode::*;

        match *self {
            Field::All => (vec![Query::robot(GetAll, 11)], Decode::Bytes),
            Field::Light(None) => (vec![Query::robot(GetLightAll, 6)], Decode::Words),
            Field::Light(Some(p)) => {
                let opcode = match p {
                    Position::Left => GetLightLeft,
                    Position::Center => GetLightCenter,
                    Position::Right => GetLightRight,
                };
                (vec![Query::robot(opcode, 2)], Decode::Words)
            }
            Field::Ir(None) => (vec![Query::robot(GetIrAll, 2)], Decode::Bytes),
            Field::Ir(Some(Side::Left)) => (vec![Query::robot(GetIrLeft, 1)], Decode::Bytes),
            Field::Ir(Some(Side::Right)) => (vec![Query::robot(GetIrRight, 1)], Decode::Bytes),
            Field::Line(None) => (vec![Query::robot(GetLineAll, 2)], Decode::Bytes),
            Field::Line(Some(Side::Left)) => (vec![Query::robot(GetLineLeft, 1)], Decode::Bytes),
            Field::Line(Some(Side::Right)) => {
                (vec![Query::robot(GetLineRight, 1)], Decode::Bytes)
            }
            Field::Stall => (vec![Query::robot(GetAll, 11)], Decode::ByteAt(10)),
            Field::Name => (
                vec![Query::robot(GetName1, 8), Query::robot(GetName2, 8)],
                Decode::Text,
            ),
            Field::Password => (
                vec![Query::robot(GetPass1, 8), Query::robot(GetPass2, 8)],
                Decode::Text,
            ),
            Field::State => (vec![Query::robot(GetState, 2)], Decode::Bytes),
            Field::Data => (vec![Query::robot(GetData, 8)], Decode::Bytes),
            Field::Location => (vec![Query::robot(GetPosn, 8)], Decode::Ints),
            Field::Angle => (vec![Query::robot(GetAngle, 4)], Decode::Ints),
            Field::Microphone => (vec![Query::robot(GetMicEnv, 4)], Decode::Ints),
            Field::Distance(side) => {
                let mut query = Query::robot(GetDistance, 2);
                query.operands = vec![side as i64];
                (vec![query], Decode::Words)
            }
            Field::Battery => (vec![Query::dongle(GetBattery, vec![], 2)], Decode::Volts),
            Field::DongleIr(p) => {
                let opcode = match p {
                    Position::Left => GetDongleLIr,
                    Position::Center => GetDongleCIr,
                    Position::Right => GetDongleRIr,
                };
                (vec![Query::dongle(opcode, vec![], 2)], Decode::Words)
            }
            Field::CamParam(address) => (
                vec![Query::dongle(GetCamParam, vec![i64::from(address)], 1)],
                Decode::Bytes,
            ),
        }
    }
}

lazy_static! {
    static ref SPEC_RE: Regex = Regex::new(r"^\s*([a-z][a-z-]*)(?:\s+(.*?))?\s*$").unwrap();
}

fn split_spec(input: &str) -> Result<(String, Vec<String>), FieldSpecError> {
    let input = input.to_lowercase();
    let captures = SPEC_RE
        .captures(&input)
        .ok_or_else(|| FieldSpecError::UnknownField(input.clone()))?;

    let name = captures[1].to_string();
    let args = captures
        .get(2)
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Ok((name, args))
}

fn bad_arg(field: &str, args: &[String]) -> FieldSpecError {
    FieldSpecError::BadArgument {
        field: field.to_string(),
        arg: args.join(" "),
    }
}

fn optional<T: FromStr>(field: &str, args: &[String]) -> Result<Option<T>, FieldSpecError> {
    match args {
        [] => Ok(None),
        [arg] => arg.parse().map(Some).map_err(|_| bad_arg(field, args)),
        _ => Err(bad_arg(field, args)),
    }
}

fn required<T: FromStr>(field: &str, args: &[String]) -> Result<T, FieldSpecError> {
    optional(field, args)?.ok_or_else(|| bad_arg(field, args))
}

fn number<T: Num>(field: &str, args: &[String], arg: &str) -> Result<T, FieldSpecError> {
    parse_number(arg).map_err(|_| bad_arg(field, args))
}

fn none(field: &str, args: &[String], value: Field) -> Result<Field, FieldSpecError> {
    if args.is_empty() {
        Ok(value)
    } else {
        Err(bad_arg(field, args))
    }
}

/// Parses e.g. `light`, `light left`, `cam-param 0x12`.
impl FromStr for Field {
    type Err = FieldSpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_spec(input)?;
        let field = name.as_str();

        match field {
            "all" => none(field, &args, Field::All),
            "light" => Ok(Field::Light(optional(field, &args)?)),
            "ir" => Ok(Field::Ir(optional(field, &args)?)),
            "line" => Ok(Field::Line(optional(field, &args)?)),
            "stall" => none(field, &args, Field::Stall),
            "name" => none(field, &args, Field::Name),
            "password" => none(field, &args, Field::Password),
            "state" => none(field, &args, Field::State),
            "data" => none(field, &args, Field::Data),
            "location" | "position" => none(field, &args, Field::Location),
            "angle" => none(field, &args, Field::Angle),
            "microphone" | "mic" => none(field, &args, Field::Microphone),
            "distance" => Ok(Field::Distance(required(field, &args)?)),
            "battery" => none(field, &args, Field::Battery),
            "dongle-ir" => Ok(Field::DongleIr(required(field, &args)?)),
            "cam-param" => match args.as_slice() {
                [address] => Ok(Field::CamParam(number(field, &args, address)?)),
                _ => Err(bad_arg(field, &args)),
            },
            _ => Err(FieldSpecError::UnknownField(name)),
        }
    }
}

/// Decoded query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Bytes(Vec<u8>),
    Words(Vec<u16>),
    Ints(Vec<i32>),
    Text(String),
    Volts(f64),
}

/// Battery reading counts per volt.
const BATTERY_SCALE: f64 = 20.9813;

impl Reading {
    pub(crate) fn decode(payload: &[u8], decode: Decode) -> Reading {
        match decode {
            Decode::Bytes => Reading::Bytes(payload.to_vec()),
            Decode::Words => Reading::Words(
                payload
                    .chunks_exact(2)
                    .map(|w| u16::from_be_bytes([w[0], w[1]]))
                    .collect(),
            ),
            Decode::Ints => Reading::Ints(
                payload
                    .chunks_exact(4)
                    .map(|w| i32::from_be_bytes([w[0], w[1], w[2], w[3]]))
                    .collect(),
            ),
            Decode::ByteAt(offset) => {
                Reading::Bytes(payload.get(offset).copied().into_iter().collect())
            }
            Decode::Text => Reading::Text(
                payload
                    .iter()
                    .take_while(|&&b| b != 0)
                    .map(|&b| b as char)
                    .collect(),
            ),
            Decode::Volts => {
                let raw = payload
                    .get(..2)
                    .map(|w| u16::from_be_bytes([w[0], w[1]]))
                    .unwrap_or_default();
                Reading::Volts(f64::from(raw) / BATTERY_SCALE)
            }
        }
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Bytes(v) => v.iter().join(" ").fmt(f),
            Reading::Words(v) => v.iter().join(" ").fmt(f),
            Reading::Ints(v) => v.iter().join(" ").fmt(f),
            Reading::Text(s) => s.fmt(f),
            Reading::Volts(v) => write!(f, "{:.2}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volume {
    Loud,
    Quiet,
    Percent(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwardness {
    Scribbler,
    Fluke,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    Led(LedTarget, bool),
    Name(String),
    Password(String),
    Volume(Volume),
    Forwardness(Forwardness),
    EchoMode(bool),
    Data([u8; 8]),
    WhiteBalance(bool),
    IrPower(u8),
    DimmerLed(u8),
    DongleLed(bool),
    GainControl(bool),
    ExposureControl(bool),
    CamParam { address: u8, value: u8 },
}

/// A command the driver sends for a setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Command {
    pub opcode: Opcode,
    pub operands: Vec<i64>,
    /// Framed and acknowledged by the robot, or sent raw to the dongle.
    pub framed: bool,
}

impl Command {
    fn robot(opcode: Opcode, operands: Vec<i64>) -> Self {
        Self {
            opcode,
            operands,
            framed: true,
        }
    }

    fn dongle(opcode: Opcode, operands: Vec<i64>) -> Self {
        Self {
            opcode,
            operands,
            framed: false,
        }
    }
}

const TEXT_HALF: usize = 8;

/// Splits text into two NUL padded 8-byte halves. Characters are sent as
/// single Latin-1 bytes.
fn text_halves(text: &str) -> Result<[Vec<i64>; 2], EncodingError> {
    let codes: Vec<i64> = text.chars().map(|c| c as u32 as i64).collect();
    if codes.len() > 2 * TEXT_HALF {
        return Err(EncodingError::TextTooLong {
            len: codes.len(),
            max: 2 * TEXT_HALF,
        });
    }
    if let Some(index) = codes.iter().position(|&c| c > 0xFF) {
        return Err(EncodingError::OperandOutOfRange {
            index,
            value: codes[index],
        });
    }

    let mut padded = codes;
    padded.resize(2 * TEXT_HALF, 0);
    let second = padded.split_off(TEXT_HALF);
    Ok([padded, second])
}

impl Setting {
    pub(crate) fn commands(&self) -> Result<Vec<Command>, EncodingError> {
        use Opcode::*;

        let commands = match self {
            Setting::Led(target, on) => {
                let opcode = match (target, on) {
                    (LedTarget::Left, true) => SetLedLeftOn,
                    (LedTarget::Left, false) => SetLedLeftOff,
                    (LedTarget::Center, true) => SetLedCenterOn,
                    (LedTarget::Center, false) => SetLedCenterOff,
                    (LedTarget::Right, true) => SetLedRightOn,
                    (LedTarget::Right, false) => SetLedRightOff,
                    (LedTarget::All, true) => SetLedAllOn,
                    (LedTarget::All, false) => SetLedAllOff,
                };
                vec![Command::robot(opcode, vec![])]
            }
            Setting::Name(name) => {
                let [first, second] = text_halves(name)?;
                vec![
                    Command::robot(SetName1, first),
                    Command::robot(SetName2, second),
                ]
            }
            Setting::Password(password) => {
                let [first, second] = text_halves(password)?;
                vec![
                    Command::robot(SetPass1, first),
                    Command::robot(SetPass2, second),
                ]
            }
            Setting::Volume(Volume::Loud) => vec![Command::robot(SetLoud, vec![])],
            Setting::Volume(Volume::Quiet) => vec![Command::robot(SetQuiet, vec![])],
            Setting::Volume(Volume::Percent(p)) => {
                if *p > 100 {
                    return Err(EncodingError::OperandOutOfRange {
                        index: 0,
                        value: i64::from(*p),
                    });
                }
                vec![Command::robot(SetVolume, vec![i64::from(*p)])]
            }
            Setting::Forwardness(f) => {
                let flag = match f {
                    Forwardness::Scribbler => 0,
                    Forwardness::Fluke => 1,
                };
                vec![Command::dongle(SetForwardness, vec![flag])]
            }
            Setting::EchoMode(on) => vec![Command::robot(SetEchoMode, vec![*on as i64])],
            Setting::Data(data) => vec![Command::robot(
                SetData,
                data.iter().map(|&b| i64::from(b)).collect(),
            )],
            Setting::WhiteBalance(true) => vec![Command::dongle(SetWhiteBalance, vec![])],
            Setting::WhiteBalance(false) => vec![Command::dongle(SetNoWhiteBalance, vec![])],
            Setting::IrPower(power) => vec![Command::dongle(SetDongleIr, vec![i64::from(*power)])],
            Setting::DimmerLed(value) => {
                vec![Command::dongle(SetDimmerLed, vec![i64::from(*value)])]
            }
            Setting::DongleLed(true) => vec![Command::dongle(SetDongleLedOn, vec![])],
            Setting::DongleLed(false) => vec![Command::dongle(SetDongleLedOff, vec![])],
            Setting::GainControl(on) => {
                let value = if *on {
                    cam::COMB_GAIN_CONTROL_ON
                } else {
                    cam::COMB_GAIN_CONTROL_OFF
                };
                vec![Command::dongle(
                    SetCamParam,
                    vec![i64::from(cam::COMB), i64::from(value)],
                )]
            }
            Setting::ExposureControl(on) => {
                let value = if *on {
                    cam::COMB_EXPOSURE_CONTROL_ON
                } else {
                    cam::COMB_EXPOSURE_CONTROL_OFF
                };
                vec![Command::dongle(
                    SetCamParam,
                    vec![i64::from(cam::COMB), i64::from(value)],
                )]
            }
            Setting::CamParam { address, value } => vec![Command::dongle(
                SetCamParam,
                vec![i64::from(*address), i64::from(*value)],
            )],
        };
        Ok(commands)
    }
}

fn on_off(field: &str, args: &[String], arg: &str) -> Result<bool, FieldSpecError> {
    match arg {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        _ => Err(bad_arg(field, args)),
    }
}

/// Parses e.g. `led all on`, `name bot1`, `volume 40`, `cam-param 0x12 0x14`.
impl FromStr for Setting {
    type Err = FieldSpecError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (name, args) = split_spec(input)?;
        let field = name.as_str();

        match (field, args.as_slice()) {
            ("led", [target, state]) => Ok(Setting::Led(
                target.parse().map_err(|_| bad_arg(field, &args))?,
                on_off(field, &args, state)?,
            )),
            ("name", [text]) => Ok(Setting::Name(text.clone())),
            ("password", [text]) => Ok(Setting::Password(text.clone())),
            ("volume", [level]) => match level.as_str() {
                "loud" | "on" => Ok(Setting::Volume(Volume::Loud)),
                "quiet" | "off" => Ok(Setting::Volume(Volume::Quiet)),
                _ => Ok(Setting::Volume(Volume::Percent(number(field, &args, level)?))),
            },
            ("forwardness", [direction]) => match direction.as_str() {
                "scribbler" | "scribbler-forward" => Ok(Setting::Forwardness(Forwardness::Scribbler)),
                "fluke" | "fluke-forward" => Ok(Setting::Forwardness(Forwardness::Fluke)),
                _ => Err(bad_arg(field, &args)),
            },
            ("echo", [state]) => Ok(Setting::EchoMode(on_off(field, &args, state)?)),
            ("data", values) if values.len() == 8 => {
                let mut data = [0u8; 8];
                for (slot, value) in data.iter_mut().zip(values) {
                    *slot = number(field, &args, value)?;
                }
                Ok(Setting::Data(data))
            }
            ("white-balance", [state]) => Ok(Setting::WhiteBalance(on_off(field, &args, state)?)),
            ("ir-power", [power]) => Ok(Setting::IrPower(number(field, &args, power)?)),
            ("dimmer-led", [value]) => Ok(Setting::DimmerLed(number(field, &args, value)?)),
            ("dongle-led", [state]) => Ok(Setting::DongleLed(on_off(field, &args, state)?)),
            ("gain-control", [state]) => Ok(Setting::GainControl(on_off(field, &args, state)?)),
            ("exposure-control", [state]) => {
                Ok(Setting::ExposureControl(on_off(field, &args, state)?))
            }
            ("cam-param", [address, value]) => Ok(Setting::CamParam {
                address: number(field, &args, address)?,
                value: number(field, &args, value)?,
            }),
            (
                "led" | "name" | "password" | "volume" | "forwardness" | "echo" | "data"
                | "white-balance" | "ir-power" | "dimmer-led" | "dongle-led" | "gain-control"
                | "exposure-control" | "cam-param",
                _,
            ) => Err(bad_arg(field, &args)),
            _ => Err(FieldSpecError::UnknownField(name)),
        }
    }
}
