use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::Index;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::protocol::decode_info;

/// Dongle firmware version, compared component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion(pub u32, pub u32, pub u32);

impl FirmwareVersion {
    pub fn major(&self) -> u32 {
        self.0
    }
}

impl Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// Missing trailing components read as zero, so `"3.2"` is `3.2.0`.
impl FromStr for FirmwareVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ProtocolError::NoFirmwareInfo)?;

        match parts.as_slice() {
            [major] => Ok(FirmwareVersion(*major, 0, 0)),
            [major, minor] => Ok(FirmwareVersion(*major, *minor, 0)),
            [major, minor, patch] => Ok(FirmwareVersion(*major, *minor, *patch)),
            _ => Err(ProtocolError::NoFirmwareInfo),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: usize,
    pub height: usize,
}

impl Resolution {
    pub const HIGH: Resolution = Resolution {
        width: 1280,
        height: 800,
    };
    pub const LOW: Resolution = Resolution {
        width: 256,
        height: 192,
    };

    /// 3.x dongles carry the high resolution camera.
    pub fn for_firmware(version: FirmwareVersion) -> Self {
        if version >= FirmwareVersion(3, 0, 0) {
            Resolution::HIGH
        } else {
            Resolution::LOW
        }
    }

    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// Capabilities reported by the identification handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    fields: BTreeMap<String, String>,
    firmware: FirmwareVersion,
}

impl ConnectionInfo {
    pub fn from_fields(fields: BTreeMap<String, String>) -> Result<Self, ProtocolError> {
        let firmware = fields
            .get("fluke")
            .ok_or(ProtocolError::NoFirmwareInfo)?
            .parse::<FirmwareVersion>()?;
        Ok(Self { fields, firmware })
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        Self::from_fields(decode_info(line)?)
    }

    pub fn firmware(&self) -> FirmwareVersion {
        self.firmware
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::for_firmware(self.firmware)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl<'a> Index<&'a str> for ConnectionInfo {
    type Output = str;

    fn index(&self, key: &'a str) -> &str {
        &self.fields[key]
    }
}
