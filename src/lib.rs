//! PLC to velocity command bridge
//!
//! Reads six (integer, thousandths) holding register pairs from a PLC over
//! Modbus TCP and turns them into a linear/angular velocity command that is
//! published once per polling interval.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{convert, to_float, PlcTeleopDevice, Twist, TwistReading, Vector3};
pub use modbus::{decode, encode, ModbusClientTrait, ModbusRequest, ModbusTcpClient};
pub use output::{DataFormatter, DataSender};
pub use services::{BridgeService, CycleOutcome};
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
