use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::traits::Device;
use super::velocity::{convert, Twist, VELOCITY_REGISTER_COUNT};
use crate::modbus::client::ModbusClientTrait;
use crate::utils::error::ModbusError;

/// PLC exposing a velocity command as six (integer, thousandths) register
/// pairs starting at holding register 0.
#[derive(Debug, Clone)]
pub struct PlcTeleopDevice {
    pub unit_id: u8,
    pub name: String,
    pub start_register: u16,
    pub register_count: u16,
}

impl PlcTeleopDevice {
    pub fn new(unit_id: u8, name: String) -> Self {
        Self {
            unit_id,
            name,
            start_register: 0,
            register_count: VELOCITY_REGISTER_COUNT as u16,
        }
    }

    pub fn with_register_block(mut self, start_register: u16, register_count: u16) -> Self {
        self.start_register = start_register;
        self.register_count = register_count;
        self
    }

    /// One full pipeline pass: encode, exchange, decode, convert.
    pub async fn read_twist(
        &self,
        client: &dyn ModbusClientTrait,
        transaction_id: u16,
    ) -> Result<TwistReading, ModbusError> {
        let registers = self.read_registers(client, transaction_id).await?;
        let twist = self.parse_registers(&registers)?;

        Ok(TwistReading {
            unit_id: self.unit_id,
            transaction_id,
            timestamp: Utc::now(),
            registers,
            twist,
        })
    }
}

#[async_trait]
impl Device for PlcTeleopDevice {
    fn device_type(&self) -> &str {
        "PlcTeleop"
    }

    fn unit_id(&self) -> u8 {
        self.unit_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn register_block(&self) -> (u16, u16) {
        (self.start_register, self.register_count)
    }

    fn parse_registers(&self, registers: &[i16]) -> Result<Twist, ModbusError> {
        convert(registers)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TwistReading {
    pub unit_id: u8,
    pub transaction_id: u16,
    pub timestamp: DateTime<Utc>,
    pub registers: Vec<i16>,
    pub twist: Twist,
}

impl fmt::Display for TwistReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "linear=({:.3}, {:.3}, {:.3}) angular=({:.3}, {:.3}, {:.3})",
            self.twist.linear.x,
            self.twist.linear.y,
            self.twist.linear.z,
            self.twist.angular.x,
            self.twist.angular.y,
            self.twist.angular.z
        )
    }
}
