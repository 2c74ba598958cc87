mod codec;
mod opcode;

pub use codec::{
    decode_ack, decode_info, encode, encode_info_request, encode_raw, i16_operands,
    i32_operands, u16_operands, Ack,
};
pub use opcode::{cam, Opcode, BEGIN_PATH, BY, DEG, END_PATH, PACKET_LENGTH, TO};

pub use crate::error::{EncodingError, ProtocolError};
