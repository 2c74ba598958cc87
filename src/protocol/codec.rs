use std::collections::BTreeMap;

use super::{EncodingError, Opcode, ProtocolError, PACKET_LENGTH};

const MAX_OPERANDS: usize = PACKET_LENGTH - 1;

fn check_operands(operands: &[i64]) -> Result<(), EncodingError> {
    if operands.len() > MAX_OPERANDS {
        return Err(EncodingError::TooManyOperands(operands.len()));
    }

    match operands.iter().position(|value| !(0..=0xFF).contains(value)) {
        Some(index) => Err(EncodingError::OperandOutOfRange {
            index,
            value: operands[index],
        }),
        None => Ok(()),
    }
}

fn encode_filled(
    opcode: Opcode,
    operands: &[i64],
    fill: u8,
) -> Result<[u8; PACKET_LENGTH], EncodingError> {
    check_operands(operands)?;

    let mut frame = [fill; PACKET_LENGTH];
    frame[0] = opcode.into();
    for (slot, &value) in frame[1..].iter_mut().zip(operands) {
        *slot = value as u8;
    }
    Ok(frame)
}

/// Builds the 9-byte request frame: opcode, operands, zero padding.
pub fn encode(opcode: Opcode, operands: &[i64]) -> Result<[u8; PACKET_LENGTH], EncodingError> {
    encode_filled(opcode, operands, 0)
}

/// The identification request is padded with spaces, not zeros.
pub fn encode_info_request() -> [u8; PACKET_LENGTH] {
    let mut frame = [b' '; PACKET_LENGTH];
    frame[0] = Opcode::GetInfo.into();
    frame
}

/// Dongle-side commands are sent unframed: opcode and operands only.
pub fn encode_raw(opcode: Opcode, operands: &[i64]) -> Result<Vec<u8>, EncodingError> {
    check_operands(operands)?;

    let mut buffer = Vec::with_capacity(1 + operands.len());
    buffer.push(opcode.into());
    buffer.extend(operands.iter().map(|&value| value as u8));
    Ok(buffer)
}

/// Big-endian two's complement split of a signed 16-bit operand.
pub fn i16_operands(value: i16) -> [i64; 2] {
    let [hi, lo] = value.to_be_bytes();
    [hi.into(), lo.into()]
}

pub fn u16_operands(value: u16) -> [i64; 2] {
    let [hi, lo] = value.to_be_bytes();
    [hi.into(), lo.into()]
}

pub fn i32_operands(value: i32) -> [i64; 4] {
    let [b0, b1, b2, b3] = value.to_be_bytes();
    [b0.into(), b1.into(), b2.into(), b3.into()]
}

/// Fixed-length acknowledgement. Its content is command specific; most
/// commands simply echo the request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack([u8; PACKET_LENGTH]);

impl Ack {
    pub fn opcode(&self) -> u8 {
        self.0[0]
    }

    pub fn payload(&self) -> &[u8] {
        &self.0[1..]
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_LENGTH] {
        &self.0
    }
}

pub fn decode_ack(buffer: &[u8]) -> Result<Ack, ProtocolError> {
    let frame: [u8; PACKET_LENGTH] = buffer
        .try_into()
        .map_err(|_| ProtocolError::AckLength(buffer.len()))?;
    Ok(Ack(frame))
}

/// Parses the identification line, e.g. `pfluke:3.0.1,battery:95\n`.
pub fn decode_info(line: &str) -> Result<BTreeMap<String, String>, ProtocolError> {
    let line = line.trim_end_matches(&['\r', '\n', '\0'][..]);
    let line = line
        .strip_prefix('p')
        .or_else(|| line.strip_prefix('P'))
        .unwrap_or(line);

    line.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
            None => Err(ProtocolError::MalformedInfo(pair.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_motors() {
        let reference: [u8; 9] = [109, 200, 100, 0, 0, 0, 0, 0, 0];
        assert_eq!(encode(Opcode::SetMotors, &[200, 100]).unwrap(), reference);
    }

    #[test]
    fn encode_full_frame() {
        let frame = encode(Opcode::SetName1, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(frame, [110, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn encode_rejects_bad_operands() {
        assert!(matches!(
            encode(Opcode::SetMotors, &[256]),
            Err(EncodingError::OperandOutOfRange {
                index: 0,
                value: 256
            })
        ));
        assert!(matches!(
            encode(Opcode::SetMotors, &[0, -1]),
            Err(EncodingError::OperandOutOfRange { index: 1, value: -1 })
        ));
        assert!(matches!(
            encode(Opcode::SetData, &[0; 9]),
            Err(EncodingError::TooManyOperands(9))
        ));
        assert!(matches!(
            encode_raw(Opcode::SetDongleIr, &[300]),
            Err(EncodingError::OperandOutOfRange { .. })
        ));
    }

    #[test]
    fn ack_of_encoded_frame() {
        for (opcode, operands) in [
            (Opcode::SetMotorsOff, vec![]),
            (Opcode::SetMotors, vec![0, 255]),
            (Opcode::SetSpeaker2, vec![1, 2, 3, 4, 5, 6]),
            (Opcode::SetData, vec![255; 8]),
        ] {
            let frame = encode(opcode, &operands).unwrap();
            let ack = decode_ack(&frame).unwrap();
            assert_eq!(ack.as_bytes().len(), PACKET_LENGTH);
            assert_eq!(ack.opcode(), opcode as u8);
        }
    }

    #[test]
    fn ack_length_checked() {
        assert!(matches!(
            decode_ack(&[109, 0, 0]),
            Err(ProtocolError::AckLength(3))
        ));
        assert!(matches!(
            decode_ack(&[0; 10]),
            Err(ProtocolError::AckLength(10))
        ));
    }

    #[test]
    fn info_request_padding() {
        assert_eq!(&encode_info_request(), b"P        ");
    }

    #[test]
    fn multibyte_operands() {
        assert_eq!(i16_operands(-90), [0xFF, 0xA6]);
        assert_eq!(i16_operands(300), [0x01, 0x2C]);
        assert_eq!(u16_operands(440), [0x01, 0xB8]);
        assert_eq!(i32_operands(-2), [0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn info_with_prefix() {
        let info = decode_info("pfluke:3.0.1,battery:95").unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info["fluke"], "3.0.1");
        assert_eq!(info["battery"], "95");
    }

    #[test]
    fn info_without_prefix() {
        let info = decode_info("fluke:2.1.0\r\n").unwrap();
        assert_eq!(info["fluke"], "2.1.0");
    }

    #[test]
    fn info_malformed_pair() {
        assert!(matches!(
            decode_info("fluke:2.1.0,garbage"),
            Err(ProtocolError::MalformedInfo(pair)) if pair == "garbage"
        ));
    }

    #[test]
    fn info_empty() {
        assert!(decode_info("").unwrap().is_empty());
        assert!(decode_info("p\n").unwrap().is_empty());
    }
}
