pub mod client;
pub mod protocol;

pub use client::{ModbusClientTrait, ModbusTcpClient};
pub use protocol::{decode, encode, ModbusRequest};
