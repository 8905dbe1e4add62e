use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tokio::time::timeout;

use super::{Result, SerialError, SerialPortIO};
use crate::config::SerialConfig;

/// Pause between two `bytes_to_read` probes while waiting for data
const PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Serial link to the target board, backed by the OS port.
pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
}

impl SerialInterface {
    /// Create a disconnected interface
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: None,
        }
    }

    /// Open the configured port and start from empty buffers
    pub async fn connect(&mut self, config: &SerialConfig) -> Result<()> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(Duration::from_millis(config.open_timeout_ms))
            .open()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", config.port_name, e)))?;

        self.port = Some(port);
        self.port_name = Some(config.port_name.clone());

        // Boards tend to dump boot noise right after the port opens
        tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;
        if let Some(port) = self.port.as_mut() {
            port.clear(ClearBuffer::All)?;
        }

        log::info!("Connected to {} at {} baud", config.port_name, config.baud_rate);
        Ok(())
    }

    /// Close the port if open
    pub fn disconnect(&mut self) {
        if let Some(name) = &self.port_name {
            log::info!("Disconnecting from {}", name);
        }
        self.port = None;
        self.port_name = None;
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Name of the connected port
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(SerialError::NotConnected)
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SerialPortIO for SerialInterface {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port_mut()?;
        let bytes_written = port.write(data).map_err(SerialError::IoError)?;
        Write::flush(port).map_err(SerialError::IoError)?;
        Ok(bytes_written)
    }

    async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize> {
        let port = self.port_mut()?;

        let read_operation = async {
            loop {
                match port.bytes_to_read() {
                    Ok(0) => tokio::time::sleep(PROBE_INTERVAL).await,
                    Ok(_) => match port.read(buffer) {
                        Ok(0) => tokio::time::sleep(PROBE_INTERVAL).await,
                        Ok(bytes_read) => return Ok(bytes_read),
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => return Err(SerialError::IoError(e)),
                    },
                    Err(e) => return Err(SerialError::SerialportError(e)),
                }
            }
        };

        timeout(Duration::from_millis(timeout_ms), read_operation)
            .await
            .map_err(|_| SerialError::Timeout)?
    }

    async fn flush(&mut self) -> Result<()> {
        Write::flush(self.port_mut()?).map_err(SerialError::IoError)
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
