pub mod interface;
pub mod scripted;

pub use interface::SerialInterface;
pub use scripted::ScriptedPort;

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Port not connected")]
    NotConnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Byte transport the engine reads firmware output from.
///
/// `read_data` must return within roughly `timeout_ms`; when nothing arrived
/// it reports [`SerialError::Timeout`] rather than blocking.
#[async_trait::async_trait]
pub trait SerialPortIO: Send {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize>;
    async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize>;
    async fn flush(&mut self) -> Result<()>;
    /// Drop everything already received but not yet read
    async fn clear_input(&mut self) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: SerialPortIO + ?Sized> SerialPortIO for Box<T> {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        (**self).send_data(data).await
    }

    async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize> {
        (**self).read_data(buffer, timeout_ms).await
    }

    async fn flush(&mut self) -> Result<()> {
        (**self).flush().await
    }

    async fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input().await
    }
}
