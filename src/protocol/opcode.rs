use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt::Display;

/// Size of every framed request and of the robot's acknowledgement.
pub const PACKET_LENGTH: usize = 9;

/// Operand of `SET_PATH`.
pub const BEGIN_PATH: u8 = 0;
pub const END_PATH: u8 = 1;

/// Movement sub-mode flags, or-ed into the first operand of
/// `SET_MOVE`, `SET_ARC` and `SET_TURN`.
pub const BY: u8 = 4;
pub const TO: u8 = 2;
pub const DEG: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Opcode {
    SoftReset = 33,

    GetPass1 = 50,
    GetPass2 = 51,
    SetPass1 = 55,
    SetPass2 = 56,

    GetName2 = 64,
    GetAll = 65,
    GetAllBinary = 66,
    GetLightLeft = 67,
    GetLightCenter = 68,
    GetLightRight = 69,
    GetLightAll = 70,
    GetIrLeft = 71,
    GetIrRight = 72,
    GetIrAll = 73,
    GetLineLeft = 74,
    GetLineRight = 75,
    GetLineAll = 76,
    GetState = 77,
    GetName1 = 78,
    GetStall = 79,
    GetInfo = 80,
    GetData = 81,
    /// Segmented, run-length encoded image
    GetRle = 82,
    /// Full camera frame
    GetImage = 83,
    GetWindow = 84,
    GetDongleLIr = 85,
    GetDongleCIr = 86,
    GetDongleRIr = 87,
    GetWindowLight = 88,
    GetBattery = 89,
    GetSerialMem = 90,
    GetScribProgram = 91,
    GetCamParam = 92,
    GetBlob = 95,

    SetSingleData = 96,
    SetData = 97,
    SetEchoMode = 98,
    SetLedLeftOn = 99,
    SetLedLeftOff = 100,
    SetLedCenterOn = 101,
    SetLedCenterOff = 102,
    SetLedRightOn = 103,
    SetLedRightOff = 104,
    SetLedAllOn = 105,
    SetLedAllOff = 106,
    SetLedAll = 107,
    SetMotorsOff = 108,
    SetMotors = 109,
    SetName1 = 110,
    SetLoud = 111,
    SetQuiet = 112,
    SetSpeaker = 113,
    SetSpeaker2 = 114,
    SetDongleLedOn = 116,
    SetDongleLedOff = 117,
    SetRle = 118,
    SetName2 = 119,
    SetDongleIr = 120,
    SetSerialMem = 121,
    SetScribProgram = 122,
    SetStartProgram = 123,
    SetResetScribbler = 124,
    SetSerialErase = 125,
    SetDimmerLed = 126,
    SetWindow = 127,
    SetForwardness = 128,
    SetWhiteBalance = 129,
    SetNoWhiteBalance = 130,
    SetCamParam = 131,

    GetJpegGrayHeader = 135,
    GetJpegGrayScan = 136,
    GetJpegColorHeader = 137,
    GetJpegColorScan = 138,
    SetPassNBytes = 139,
    GetPassNBytes = 140,
    GetPassBytesUntil = 141,
    GetVersion = 142,

    GetIrMessage = 150,
    SendIrMessage = 151,
    SetIrEmitters = 152,
    SetStartProgram2 = 153,
    SetResetScribbler2 = 154,
    SetScribBatch = 155,
    GetRobotId = 156,

    /// Volume in percent
    SetVolume = 160,
    SetPath = 161,
    /// type, x (i16), y (i16)
    SetMove = 162,
    /// type, x (i16), y (i16), radius (i16)
    SetArc = 163,
    /// type, angle (i16)
    SetTurn = 164,
    GetPosn = 165,
    /// x (i32), y (i32)
    SetPosn = 166,
    GetAngle = 167,
    /// angle (i32)
    SetAngle = 168,
    GetMicEnv = 169,
    GetMotorStats = 170,
    GetEncoders = 171,
    /// side, type, threshold
    GetIrEx = 172,
    /// side, type, threshold
    GetLineEx = 173,
    /// side
    GetDistance = 175,
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, *self as u8)
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

/// Camera register addresses and defaults, used with `GET_CAM_PARAM` /
/// `SET_CAM_PARAM`.
pub mod cam {
    pub const PID: u8 = 0x0A;
    pub const PID_DEFAULT: u8 = 0x76;
    pub const VER: u8 = 0x0B;
    pub const VER_DEFAULT: u8 = 0x48;
    pub const BRT: u8 = 0x06;
    pub const BRT_DEFAULT: u8 = 0x80;
    pub const EXP: u8 = 0x10;
    pub const EXP_DEFAULT: u8 = 0x41;

    pub const COMA: u8 = 0x12;
    pub const COMA_DEFAULT: u8 = 0x14;
    pub const COMA_WHITE_BALANCE_ON: u8 = COMA_DEFAULT | (1 << 2);
    pub const COMA_WHITE_BALANCE_OFF: u8 = COMA_DEFAULT & !(1 << 2);

    pub const COMB: u8 = 0x13;
    pub const COMB_DEFAULT: u8 = 0xA3;
    pub const COMB_GAIN_CONTROL_ON: u8 = COMB_DEFAULT | (1 << 1);
    pub const COMB_GAIN_CONTROL_OFF: u8 = COMB_DEFAULT & !(1 << 1);
    pub const COMB_EXPOSURE_CONTROL_ON: u8 = COMB_DEFAULT | 1;
    pub const COMB_EXPOSURE_CONTROL_OFF: u8 = COMB_DEFAULT & !1;
}
