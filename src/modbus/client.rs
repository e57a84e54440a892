use async_trait::async_trait;
use log::{debug, info};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::protocol::{ModbusRequest, MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::utils::error::ModbusError;

#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    /// Sends one request frame and returns the raw response frame.
    async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ModbusError>;

    fn endpoint(&self) -> &str;

    async fn read_holding_registers(
        &self,
        transaction_id: u16,
        unit_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<i16>, ModbusError> {
        let request =
            ModbusRequest::read_holding_registers(transaction_id, unit_id, start_addr, count);
        request.validate()?;

        let frame = request.encode();
        debug!(
            "📤 Request [tid {}] to {}: {}",
            transaction_id,
            self.endpoint(),
            hex::encode(&frame)
        );

        let response = self.exchange(&frame).await?;
        debug!("📥 Response [tid {}]: {}", transaction_id, hex::encode(&response));

        request.decode_response(&response)
    }
}

/// Modbus TCP transport that opens a fresh connection for every exchange.
pub struct ModbusTcpClient {
    endpoint: String,
    timeout: Duration,
}

impl ModbusTcpClient {
    /// `endpoint` is a `host:port` string.
    pub fn new(endpoint: String, timeout_ms: u64) -> Self {
        info!("🔌 Modbus TCP endpoint: {} (timeout {} ms)", endpoint, timeout_ms);
        Self {
            endpoint,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    async fn exchange_inner(&self, request: &[u8]) -> Result<Vec<u8>, ModbusError> {
        let mut stream = TcpStream::connect(&self.endpoint).await.map_err(|e| {
            ModbusError::ConnectionError(format!("Failed to connect to {}: {}", self.endpoint, e))
        })?;

        stream
            .write_all(request)
            .await
            .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))?;

        read_frame(&mut stream).await
    }
}

#[async_trait]
impl ModbusClientTrait for ModbusTcpClient {
    async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ModbusError> {
        timeout(self.timeout, self.exchange_inner(request)).await?
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Reads one complete Modbus TCP frame, sized by the MBAP length field.
pub async fn read_frame<R>(stream: &mut R) -> Result<Vec<u8>, ModbusError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; MBAP_HEADER_LEN];
    let mut filled = 0;
    while filled < header.len() {
        let n = stream.read(&mut header[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                ModbusError::NoResponse
            } else {
                ModbusError::MalformedResponse(format!(
                    "Connection closed after {} header bytes",
                    filled
                ))
            });
        }
        filled += n;
    }

    // Counts the unit id (already in the header) plus the PDU.
    let length = u16::from_be_bytes([header[4], header[5]]);
    if length < 2 || length > MAX_MBAP_LENGTH {
        return Err(ModbusError::MalformedResponse(format!(
            "Invalid MBAP length field {}",
            length
        )));
    }

    let mut frame = vec![0u8; MBAP_HEADER_LEN + length as usize - 1];
    frame[..MBAP_HEADER_LEN].copy_from_slice(&header);
    stream
        .read_exact(&mut frame[MBAP_HEADER_LEN..])
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                ModbusError::MalformedResponse("Connection closed inside PDU".to_string())
            }
            _ => ModbusError::from(e),
        })?;

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_read_frame_uses_length_field() {
        let wire: Vec<u8> = vec![
            0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00, 0x02, 0xFE, 0x0C,
            0xEE, 0xEE, // next frame, must not be consumed
        ];
        let mut reader = wire.as_slice();
        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(frame.len(), 13);
        assert_eq!(reader, &[0xEEu8, 0xEE]);
    }

    #[tokio::test]
    async fn test_read_frame_empty_stream() {
        let mut reader: &[u8] = &[];
        assert!(matches!(read_frame(&mut reader).await, Err(ModbusError::NoResponse)));
    }

    #[tokio::test]
    async fn test_read_frame_truncated_pdu() {
        let mut reader: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x04, 0x00];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(ModbusError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_bad_length() {
        let mut reader: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(ModbusError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_read_holding_registers_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
            let mut response =
                vec![request[0], request[1], 0x00, 0x00, 0x00, 0x07, request[6], 0x03, 0x04];
            response.extend_from_slice(&(-3i16).to_be_bytes());
            response.extend_from_slice(&42i16.to_be_bytes());
            socket.write_all(&response).await.unwrap();
        });

        let client = ModbusTcpClient::new(format!("127.0.0.1:{}", port), 1000);
        let registers = client.read_holding_registers(77, 1, 0, 2).await.unwrap();
        assert_eq!(registers, vec![-3, 42]);
    }

    #[tokio::test]
    async fn test_closed_connection_is_no_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 12];
            socket.read_exact(&mut request).await.unwrap();
        });

        let client = ModbusTcpClient::new(format!("127.0.0.1:{}", port), 1000);
        let result = client.read_holding_registers(1, 1, 0, 12).await;
        assert!(matches!(result, Err(ModbusError::NoResponse)));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = ModbusTcpClient::new(format!("127.0.0.1:{}", port), 100);
        let result = client.read_holding_registers(1, 1, 0, 12).await;
        assert!(matches!(result, Err(ModbusError::Timeout)));
    }
}
