//! Modbus RTU protocol definitions and frame codec
//!
//! This module contains the wire-level building blocks of the stack: the
//! CRC16 checksum, request encoders for the three supported function codes,
//! and decoding for both directions (master parsing responses, slave parsing
//! requests). No protocol library is used; the codec is implemented here.

use crate::error::{RtuError, RtuResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modbus address type (0-65535)
pub type Address = u16;

/// Modbus unit identifier (1-247)
pub type UnitId = u8;

/// Coil "on" value word for function 0x05
pub const COIL_ON: u16 = 0xFF00;

/// Coil "off" value word for function 0x05
pub const COIL_OFF: u16 = 0x0000;

/// Supported Modbus function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read Coils (0x01)
    ReadCoils = 0x01,
    /// Read Holding Registers (0x03)
    ReadHoldingRegisters = 0x03,
    /// Write Single Coil (0x05)
    WriteSingleCoil = 0x05,
}

impl FunctionCode {
    /// Convert from u8 to FunctionCode
    pub fn from_u8(value: u8) -> RtuResult<Self> {
        match value {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x05 => Ok(FunctionCode::WriteSingleCoil),
            _ => Err(RtuError::invalid_function(value)),
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a read function
    pub fn is_read_function(self) -> bool {
        matches!(
            self,
            FunctionCode::ReadCoils | FunctionCode::ReadHoldingRegisters
        )
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCode::ReadCoils => "Read Coils",
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::WriteSingleCoil => "Write Single Coil",
        };
        write!(f, "{} (0x{:02X})", name, *self as u8)
    }
}

/// Modbus exception codes the slave can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
}

impl ExceptionCode {
    /// Convert from u8 to ExceptionCode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ExceptionCode::IllegalFunction),
            0x02 => Some(ExceptionCode::IllegalDataAddress),
            0x03 => Some(ExceptionCode::IllegalDataValue),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => {
                "The function code received in the query is not an allowable action for the server"
            }
            ExceptionCode::IllegalDataAddress => {
                "The data address received in the query is not an allowable address for the server"
            }
            ExceptionCode::IllegalDataValue => {
                "A value contained in the query data field is not an allowable value for server"
            }
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus Exception 0x{:02X}: {}", self.to_u8(), self.description())
    }
}

/// Calculate the Modbus CRC16 of a byte sequence
///
/// Accumulator starts at 0xFFFF; each byte is XORed into the low byte,
/// then eight right shifts fold in the 0xA001 polynomial whenever the
/// shifted-out bit was set. Pure function of the input.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;

    for byte in data {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the little-endian CRC16 trailer to a frame body
pub fn append_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Verify the CRC trailer of a complete frame
///
/// The last two bytes must be the little-endian CRC16 of every preceding
/// byte. Frames shorter than four bytes cannot carry a valid trailer.
pub fn verify_crc(frame: &[u8]) -> RtuResult<()> {
    if frame.len() < 4 {
        return Err(RtuError::incomplete_frame(4, frame.len()));
    }

    let body_len = frame.len() - 2;
    let expected = crc16(&frame[..body_len]);
    let actual = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);

    if expected != actual {
        return Err(RtuError::crc_mismatch(expected, actual));
    }
    Ok(())
}

/// Encode a write-single-coil request (0x05)
///
/// Produces the full 8-byte frame: unit, function, big-endian address,
/// value word (0xFF00 on / 0x0000 off), CRC trailer.
pub fn encode_write_coil(unit_id: UnitId, address: Address, value: bool) -> Vec<u8> {
    let word = if value { COIL_ON } else { COIL_OFF };
    let mut frame = vec![unit_id, FunctionCode::WriteSingleCoil.to_u8()];
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&word.to_be_bytes());
    append_crc(frame)
}

/// Encode a read-coils request (0x01)
pub fn encode_read_coils(unit_id: UnitId, start: Address, quantity: u16) -> Vec<u8> {
    let mut frame = vec![unit_id, FunctionCode::ReadCoils.to_u8()];
    frame.extend_from_slice(&start.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    append_crc(frame)
}

/// Encode a read-holding-registers request (0x03)
pub fn encode_read_holding(unit_id: UnitId, start: Address, quantity: u16) -> Vec<u8> {
    let mut frame = vec![unit_id, FunctionCode::ReadHoldingRegisters.to_u8()];
    frame.extend_from_slice(&start.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    append_crc(frame)
}

/// Encode an exception response
///
/// The function byte is the request's function with the high bit set,
/// followed by the single exception code byte and the CRC trailer.
pub fn encode_exception(unit_id: UnitId, function: u8, code: ExceptionCode) -> Vec<u8> {
    let frame = vec![unit_id, function | 0x80, code.to_u8()];
    append_crc(frame)
}

/// Encode a read-coils success response from a bit slice
///
/// Byte count is `ceil(bits / 8)`; bits are packed low-bit first.
pub fn encode_bits_response(unit_id: UnitId, bits: &[bool]) -> Vec<u8> {
    let packed = data_utils::pack_bits(bits);
    let mut frame = vec![unit_id, FunctionCode::ReadCoils.to_u8(), packed.len() as u8];
    frame.extend_from_slice(&packed);
    append_crc(frame)
}

/// Encode a read-holding-registers success response from register words
pub fn encode_registers_response(unit_id: UnitId, words: &[u16]) -> Vec<u8> {
    let data = data_utils::registers_to_bytes(words);
    let mut frame = vec![
        unit_id,
        FunctionCode::ReadHoldingRegisters.to_u8(),
        data.len() as u8,
    ];
    frame.extend_from_slice(&data);
    append_crc(frame)
}

/// Semantic decode of a master-to-slave request frame
///
/// The last field is the quantity for read functions and the raw value
/// word for write-single-coil.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Request {
    pub unit_id: UnitId,
    pub function: u8,
    pub address: Address,
    pub value: u16,
}

impl Request {
    /// Decode one fixed-length request frame
    ///
    /// Expects exactly [`crate::REQUEST_FRAME_LEN`] bytes with a valid CRC
    /// trailer. The function code is kept raw so the dispatcher can answer
    /// unsupported codes with an exception.
    pub fn decode(frame: &[u8]) -> RtuResult<Self> {
        if frame.len() != crate::REQUEST_FRAME_LEN {
            return Err(RtuError::incomplete_frame(crate::REQUEST_FRAME_LEN, frame.len()));
        }
        verify_crc(frame)?;

        Ok(Self {
            unit_id: frame[0],
            function: frame[1],
            address: u16::from_be_bytes([frame[2], frame[3]]),
            value: u16::from_be_bytes([frame[4], frame[5]]),
        })
    }

    /// Coil state carried by a write-single-coil request
    ///
    /// Only the exact word 0xFF00 switches a coil on.
    pub fn coil_state(&self) -> bool {
        self.value == COIL_ON
    }

    /// Rebuild the success echo for a write request
    ///
    /// The echo repeats the request body with a freshly computed CRC.
    pub fn encode_echo(&self) -> Vec<u8> {
        let mut frame = vec![self.unit_id, self.function];
        frame.extend_from_slice(&self.address.to_be_bytes());
        frame.extend_from_slice(&self.value.to_be_bytes());
        append_crc(frame)
    }
}

/// Semantic decode of a slave-to-master response frame
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub unit_id: UnitId,
    pub function: u8,
    /// Payload bytes between the function code and the CRC trailer
    pub data: Vec<u8>,
}

impl Response {
    /// Decode a raw response buffer
    ///
    /// Validation order: minimum length, CRC trailer, exception bit. An
    /// exception frame surfaces as [`RtuError::Exception`] carrying the
    /// original function code and the device's exception code.
    pub fn decode(raw: &[u8]) -> RtuResult<Self> {
        if raw.len() < crate::MIN_RESPONSE_LEN {
            return Err(RtuError::incomplete_frame(crate::MIN_RESPONSE_LEN, raw.len()));
        }
        verify_crc(raw)?;

        let unit_id = raw[0];
        let function = raw[1];
        if function & 0x80 != 0 {
            return Err(RtuError::exception(function & 0x7F, raw[2]));
        }

        Ok(Self {
            unit_id,
            function,
            data: raw[2..raw.len() - 2].to_vec(),
        })
    }

    /// Parse the payload as a bit array of the requested length
    ///
    /// The first payload byte is the byte count; following bytes carry
    /// bits low-bit first. The result is truncated to `quantity` bits.
    pub fn parse_bits(&self, quantity: u16) -> RtuResult<Vec<bool>> {
        if self.data.is_empty() {
            return Err(RtuError::frame("Empty response data"));
        }

        let byte_count = self.data[0] as usize;
        if self.data.len() < 1 + byte_count {
            return Err(RtuError::frame("Incomplete bit data"));
        }

        Ok(data_utils::unpack_bits(
            &self.data[1..1 + byte_count],
            quantity as usize,
        ))
    }

    /// Parse the payload as big-endian 16-bit register words
    pub fn parse_registers(&self) -> RtuResult<Vec<u16>> {
        if self.data.is_empty() {
            return Err(RtuError::frame("Empty response data"));
        }

        let byte_count = self.data[0] as usize;
        if self.data.len() < 1 + byte_count {
            return Err(RtuError::frame("Incomplete register data"));
        }
        if byte_count % 2 != 0 {
            return Err(RtuError::frame("Invalid register data length"));
        }

        data_utils::bytes_to_registers(&self.data[1..1 + byte_count])
    }
}

/// Data conversion utilities
pub mod data_utils {
    use super::*;

    /// Convert register values to bytes (big-endian)
    pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(registers.len() * 2);
        for &register in registers {
            bytes.extend_from_slice(&register.to_be_bytes());
        }
        bytes
    }

    /// Convert bytes to register values (big-endian)
    pub fn bytes_to_registers(bytes: &[u8]) -> RtuResult<Vec<u16>> {
        if bytes.len() % 2 != 0 {
            return Err(RtuError::invalid_data("Byte array length must be even"));
        }

        let mut registers = Vec::with_capacity(bytes.len() / 2);
        for chunk in bytes.chunks(2) {
            registers.push(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        Ok(registers)
    }

    /// Pack boolean values into bytes, low-bit first
    pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
        let byte_count = (bits.len() + 7) / 8;
        let mut bytes = vec![0u8; byte_count];

        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }

        bytes
    }

    /// Unpack bytes into boolean values, low-bit first
    ///
    /// Bits beyond the provided bytes read as false.
    pub fn unpack_bits(bytes: &[u8], bit_count: usize) -> Vec<bool> {
        let mut bits = Vec::with_capacity(bit_count);

        for i in 0..bit_count {
            let byte_index = i / 8;
            if byte_index < bytes.len() {
                bits.push((bytes[byte_index] & (1 << (i % 8))) != 0);
            } else {
                bits.push(false);
            }
        }

        bits
    }
}
