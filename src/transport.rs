//! ==============================================================================
//! transport.rs - serial line abstraction
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the half-duplex line the gauges sit on.
//!     abstracts away the difference between a real RS-485 adapter
//!     (`tokio-serial`) and a development machine with no gauges attached.
//!
//! contract:
//!     - send() writes one complete query
//!     - read_available() never waits: it returns whatever the port has
//!       buffered right now (possibly nothing). the caller is responsible for
//!       the settle delay between the two.
//!     - an Err from either means the port itself failed; a silent gauge is
//!       just an empty read.
//!
//! relationships:
//!     - used by: scheduler.rs
//!     - uses: tokio-serial (real port), frame.rs (simulated gauges)
//!
//! ==============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use crate::config::SerialConfig;
use crate::crc::has_valid_crc;
use crate::error::TransportError;
use crate::frame::{encode_response, GaugeAddress, FUNCTION_CODE, QUERY_FRAME_LEN};

#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    async fn read_available(&mut self) -> Result<Vec<u8>, TransportError>;
    /// release the port; later calls fail with `TransportError::Closed`
    async fn close(&mut self) -> Result<(), TransportError>;
}

// ==============================================================================================
// REAL IMPLEMENTATION (RS-485 adapter)
// ==============================================================================================

pub struct SerialTransport {
    port_name: String,
    port: Option<SerialStream>,
}

impl SerialTransport {
    /// open the port 8N1 at the configured speed
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open_native_async()
            .map_err(|source| TransportError::Open {
                port: config.port.clone(),
                source,
            })?;

        tracing::info!("Opened serial port {} at {} baud", config.port, config.baud_rate);
        Ok(Self {
            port_name: config.port.clone(),
            port: Some(port),
        })
    }

    fn port(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes).await?;
        port.flush().await?;
        Ok(())
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port()?;
        let waiting = port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; waiting];
        port.read_exact(&mut buffer).await?;
        Ok(buffer)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut port) = self.port.take() {
            port.shutdown().await?;
            tracing::info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }
}

// ==============================================================================================
// SIMULATED GAUGES (no hardware attached)
// ==============================================================================================

/// answers well-formed queries with slowly drifting pressures
///
/// gauge 1 hovers around 2.5e-3 mbar, gauge 2 around 4e-8 mbar. with
/// `miss_every = Some(n)` every n-th query goes unanswered, which exercises
/// the absent-reading path.
pub struct SimulatedTransport {
    queries: u64,
    miss_every: Option<u64>,
    pending: Vec<u8>,
    closed: bool,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        tracing::info!("Using SIMULATED gauges (no serial port opened)");
        Self {
            queries: 0,
            miss_every: None,
            pending: Vec::new(),
            closed: false,
        }
    }

    pub fn with_miss_every(mut self, n: u64) -> Self {
        self.miss_every = Some(n.max(1));
        self
    }

    fn pressure_for(&self, address: GaugeAddress) -> f32 {
        let wobble = ((self.queries as f32) * 0.37).sin() * 0.05;
        match address {
            GaugeAddress::First => 2.5e-3 * (1.0 + wobble),
            GaugeAddress::Second => 4.0e-8 * (1.0 - wobble),
        }
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.queries += 1;
        self.pending.clear();

        if self.miss_every.is_some_and(|n| self.queries % n == 0) {
            tracing::debug!("[SIM] dropping query {}", self.queries);
            return Ok(());
        }
        if bytes.len() != QUERY_FRAME_LEN || bytes[1] != FUNCTION_CODE || !has_valid_crc(bytes) {
            tracing::debug!("[SIM] ignoring malformed query");
            return Ok(());
        }

        let Some(address) = GaugeAddress::ALL.into_iter().find(|a| a.as_byte() == bytes[0]) else {
            return Ok(());
        };
        self.pending = encode_response(address, self.pressure_for(address));
        Ok(())
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(std::mem::take(&mut self.pending))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{build_query, decode_response};

    #[tokio::test]
    async fn test_simulated_gauges_answer_queries() {
        let mut transport = SimulatedTransport::new();

        transport.send(&build_query(GaugeAddress::First)).await.unwrap();
        let first = decode_response(&transport.read_available().await.unwrap()).unwrap();
        assert!(first > 1e-3 && first < 1e-2, "got {}", first);

        transport.send(&build_query(GaugeAddress::Second)).await.unwrap();
        let second = decode_response(&transport.read_available().await.unwrap()).unwrap();
        assert!(second > 1e-8 && second < 1e-7, "got {}", second);

        // answer is consumed by the read
        assert!(transport.read_available().await.unwrap().is_empty());

        // well-formed query for an address nobody is strapped to
        let mut stranger = build_query(GaugeAddress::First);
        stranger[0] = 0x03;
        let crc = crate::crc::crc16_modbus(&stranger[..stranger.len() - 2]);
        let trailer = stranger.len() - 2;
        stranger[trailer..].copy_from_slice(&crc.to_le_bytes());
        transport.send(&stranger).await.unwrap();
        assert!(transport.read_available().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_misses_and_garbage() {
        let mut transport = SimulatedTransport::new().with_miss_every(2);

        transport.send(&build_query(GaugeAddress::First)).await.unwrap();
        assert!(!transport.read_available().await.unwrap().is_empty());

        transport.send(&build_query(GaugeAddress::First)).await.unwrap();
        assert!(transport.read_available().await.unwrap().is_empty());

        transport.send(&[0x01, 0x17, 0x00]).await.unwrap();
        assert!(transport.read_available().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_transport_errors() {
        let mut transport = SimulatedTransport::new();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.send(&build_query(GaugeAddress::First)).await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(transport.read_available().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let config = SerialConfig {
            port: "/dev/gauge-station-does-not-exist".to_string(),
            ..SerialConfig::default()
        };
        assert!(matches!(
            SerialTransport::open(&config),
            Err(TransportError::Open { .. })
        ));
    }
}
