use async_trait::async_trait;

use super::velocity::Twist;
use crate::modbus::client::ModbusClientTrait;
use crate::utils::error::ModbusError;

#[async_trait]
pub trait Device: Send + Sync {
    fn device_type(&self) -> &str;
    fn unit_id(&self) -> u8;
    fn name(&self) -> &str;

    /// Registers fetched per cycle.
    fn register_block(&self) -> (u16, u16);

    async fn read_registers(
        &self,
        client: &dyn ModbusClientTrait,
        transaction_id: u16,
    ) -> Result<Vec<i16>, ModbusError> {
        let (start, count) = self.register_block();
        client
            .read_holding_registers(transaction_id, self.unit_id(), start, count)
            .await
    }

    fn parse_registers(&self, registers: &[i16]) -> Result<Twist, ModbusError>;
}
