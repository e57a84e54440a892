//! Modbus TCP framing for the "Read Holding Registers" exchange.
//!
//! Everything here is a pure transformation between values and wire bytes.
//! Nothing in this module performs I/O or logs.

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;

use crate::utils::error::ModbusError;

pub const FUNCTION_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const EXCEPTION_FLAG: u8 = 0x80;

pub const MODBUS_PROTOCOL_ID: u16 = 0x0000;
/// Bytes following the length field in a read request: unit id, function
/// code, start address and quantity.
pub const READ_REQUEST_LENGTH: u16 = 6;
pub const REQUEST_FRAME_LEN: usize = 12;

pub const MBAP_HEADER_LEN: usize = 7;
/// MBAP header + function code + byte count.
pub const RESPONSE_PREFIX_LEN: usize = 9;
pub const MAX_MBAP_LENGTH: u16 = 254;

pub const MIN_READ_QUANTITY: u16 = 1;
pub const MAX_READ_QUANTITY: u16 = 125;

const FUNCTION_CODE_OFFSET: usize = 7;
const BYTE_COUNT_OFFSET: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusRequest {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
    pub function_code: u8,
    pub start_address: u16,
    pub quantity: u16,
}

impl ModbusRequest {
    pub fn read_holding_registers(
        transaction_id: u16,
        unit_id: u8,
        start_address: u16,
        quantity: u16,
    ) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: READ_REQUEST_LENGTH,
            unit_id,
            function_code: FUNCTION_READ_HOLDING_REGISTERS,
            start_address,
            quantity,
        }
    }

    /// Rejects quantities a single read cannot carry. The codec itself encodes
    /// whatever it is given, so callers validate here before sending.
    pub fn validate(&self) -> Result<(), ModbusError> {
        if !(MIN_READ_QUANTITY..=MAX_READ_QUANTITY).contains(&self.quantity) {
            return Err(ModbusError::ConfigError(format!(
                "Register quantity {} outside {}..={}",
                self.quantity, MIN_READ_QUANTITY, MAX_READ_QUANTITY
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Bytes {
        let mut frame = BytesMut::with_capacity(REQUEST_FRAME_LEN);
        frame.put_u16(self.transaction_id);
        frame.put_u16(self.protocol_id);
        frame.put_u16(self.length);
        frame.put_u8(self.unit_id);
        frame.put_u8(self.function_code);
        frame.put_u16(self.start_address);
        frame.put_u16(self.quantity);
        frame.freeze()
    }

    /// Decodes a response to this request and checks that it answers it:
    /// same transaction id and exactly `quantity` registers.
    pub fn decode_response(&self, response: &[u8]) -> Result<Vec<i16>, ModbusError> {
        let registers = decode(response)?;

        let echoed = u16::from_be_bytes([response[0], response[1]]);
        if echoed != self.transaction_id {
            return Err(ModbusError::MalformedResponse(format!(
                "Transaction id mismatch: sent {}, received {}",
                self.transaction_id, echoed
            )));
        }

        if registers.len() != self.quantity as usize {
            return Err(ModbusError::MalformedResponse(format!(
                "Expected {} registers, got {}",
                self.quantity,
                registers.len()
            )));
        }

        Ok(registers)
    }
}

/// Builds the 12-byte request frame. The length field is always 6.
pub fn encode(transaction_id: u16, unit_id: u8, start_address: u16, quantity: u16) -> Bytes {
    ModbusRequest::read_holding_registers(transaction_id, unit_id, start_address, quantity).encode()
}

/// Parses a raw response into signed registers in wire order.
///
/// The register count is taken from the byte count field; matching it against
/// the requested quantity is left to the caller (see
/// [`ModbusRequest::decode_response`]).
pub fn decode(response: &[u8]) -> Result<Vec<i16>, ModbusError> {
    if response.is_empty() {
        return Err(ModbusError::NoResponse);
    }

    if response.len() < RESPONSE_PREFIX_LEN {
        return Err(ModbusError::MalformedResponse(format!(
            "Frame too short: {} bytes, need at least {}",
            response.len(),
            RESPONSE_PREFIX_LEN
        )));
    }

    let function_code = response[FUNCTION_CODE_OFFSET];
    if function_code & EXCEPTION_FLAG != 0 {
        return Err(ModbusError::ProtocolException {
            code: response[BYTE_COUNT_OFFSET],
        });
    }
    if function_code != FUNCTION_READ_HOLDING_REGISTERS {
        return Err(ModbusError::MalformedResponse(format!(
            "Unexpected function code 0x{:02X}",
            function_code
        )));
    }

    let byte_count = response[BYTE_COUNT_OFFSET] as usize;
    if byte_count % 2 != 0 {
        return Err(ModbusError::MalformedResponse(format!(
            "Odd byte count {}",
            byte_count
        )));
    }

    let end = RESPONSE_PREFIX_LEN + byte_count;
    if response.len() < end {
        return Err(ModbusError::MalformedResponse(format!(
            "Byte count {} exceeds frame: {} bytes available",
            byte_count,
            response.len() - RESPONSE_PREFIX_LEN
        )));
    }

    let mut cursor = Cursor::new(&response[RESPONSE_PREFIX_LEN..end]);
    let mut registers = Vec::with_capacity(byte_count / 2);
    for _ in 0..byte_count / 2 {
        registers.push(cursor.read_i16::<BigEndian>()?);
    }

    Ok(registers)
}

pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Server Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Server Device Busy",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Failed to Respond",
        _ => "Unknown Exception",
    }
}
