//! Transport that replays a timed byte script against a [`ManualClock`].
//!
//! Chunks become readable once the simulated clock reaches their timestamp.
//! A read with nothing due advances the clock by the read timeout (or up to
//! the next chunk) and reports [`SerialError::Timeout`], exactly like a real
//! port that stayed silent for that long.
use std::collections::VecDeque;
use std::time::Duration;

use super::{Result, SerialError, SerialPortIO};
use crate::clock::ManualClock;

#[derive(Debug)]
struct ScriptedChunk {
    at: Duration,
    bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct ScriptedPort {
    clock: ManualClock,
    script: VecDeque<ScriptedChunk>,
    failure: Option<(Duration, String)>,
    sent: Vec<u8>,
    reads: usize,
}

impl ScriptedPort {
    /// Empty script on the given timeline
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            script: VecDeque::new(),
            failure: None,
            sent: Vec::new(),
            reads: 0,
        }
    }

    /// Queue raw bytes that become readable at `at_ms` of simulated time
    pub fn bytes_at(mut self, at_ms: u64, bytes: impl AsRef<[u8]>) -> Self {
        let at = Duration::from_millis(at_ms);
        let idx = self.script.iter().position(|c| c.at > at).unwrap_or(self.script.len());
        self.script.insert(idx, ScriptedChunk { at, bytes: bytes.as_ref().to_vec() });
        self
    }

    /// Queue one newline-terminated line
    pub fn line_at(self, at_ms: u64, line: &str) -> Self {
        self.bytes_at(at_ms, format!("{}\n", line))
    }

    /// Every read from `at_ms` on fails with an I/O error
    pub fn fail_at(mut self, at_ms: u64, message: &str) -> Self {
        self.failure = Some((Duration::from_millis(at_ms), message.to_string()));
        self
    }

    /// Everything written to the port so far
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Sent bytes as lossy UTF-8
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }

    /// Chunks not yet handed out
    pub fn pending_chunks(&self) -> usize {
        self.script.len()
    }

    /// Number of `read_data` calls so far
    pub fn reads(&self) -> usize {
        self.reads
    }

    fn failure_due(&self, now: Duration) -> Option<SerialError> {
        match &self.failure {
            Some((at, message)) if *at <= now => Some(SerialError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                message.clone(),
            ))),
            _ => None,
        }
    }

    fn take_due(&mut self, now: Duration, buffer: &mut [u8]) -> Option<usize> {
        let chunk = self.script.front_mut().filter(|c| c.at <= now)?;
        let n = chunk.bytes.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk.bytes[..n]);
        chunk.bytes.drain(..n);
        if chunk.bytes.is_empty() {
            self.script.pop_front();
        }
        Some(n)
    }
}

#[async_trait::async_trait]
impl SerialPortIO for ScriptedPort {
    async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        self.sent.extend_from_slice(data);
        Ok(data.len())
    }

    async fn read_data(&mut self, buffer: &mut [u8], timeout_ms: u64) -> Result<usize> {
        self.reads += 1;
        let now = self.clock.elapsed();
        if let Some(err) = self.failure_due(now) {
            return Err(err);
        }
        if let Some(n) = self.take_due(now, buffer) {
            return Ok(n);
        }

        // Nothing due: sleep until the next event or the read timeout
        let wait = Duration::from_millis(timeout_ms);
        let next_event = self
            .script
            .front()
            .map(|c| c.at)
            .into_iter()
            .chain(self.failure.as_ref().map(|(at, _)| *at))
            .min();
        let step = match next_event {
            Some(at) => wait.min(at.saturating_sub(now)),
            None => wait,
        };
        self.clock.advance(step);

        let now = self.clock.elapsed();
        if let Some(err) = self.failure_due(now) {
            return Err(err);
        }
        match self.take_due(now, buffer) {
            Some(n) => Ok(n),
            None => Err(SerialError::Timeout),
        }
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn clear_input(&mut self) -> Result<()> {
        let now = self.clock.elapsed();
        let before = self.script.len();
        self.script.retain(|c| c.at > now);
        if before != self.script.len() {
            log::debug!("Discarded {} stale chunk(s) from scripted port", before - self.script.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn silent_read_advances_clock_by_timeout() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock.clone());
        let mut buf = [0u8; 16];

        let err = port.read_data(&mut buf, 25).await.unwrap_err();
        assert!(matches!(err, SerialError::Timeout));
        assert_eq!(clock.elapsed(), Duration::from_millis(25));
    }

    #[tokio::test]
    async fn chunk_is_delivered_when_due() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock.clone()).line_at(30, "READY");
        let mut buf = [0u8; 16];

        assert!(matches!(port.read_data(&mut buf, 20).await, Err(SerialError::Timeout)));
        let n = port.read_data(&mut buf, 20).await.unwrap();
        assert_eq!(&buf[..n], b"READY\n");
        assert_eq!(clock.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn large_chunk_is_split_across_reads() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock).bytes_at(0, b"abcdef");
        let mut buf = [0u8; 4];

        assert_eq!(port.read_data(&mut buf, 10).await.unwrap(), 4);
        assert_eq!(port.read_data(&mut buf, 10).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(port.pending_chunks(), 0);
    }

    #[tokio::test]
    async fn clear_input_drops_only_arrived_chunks() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock.clone())
            .line_at(0, "stale")
            .line_at(100, "fresh");
        clock.advance(Duration::from_millis(10));

        port.clear_input().await.unwrap();
        assert_eq!(port.pending_chunks(), 1);
    }

    #[tokio::test]
    async fn failure_surfaces_as_io_error() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock).fail_at(15, "cable unplugged");
        let mut buf = [0u8; 4];

        assert!(matches!(port.read_data(&mut buf, 10).await, Err(SerialError::Timeout)));
        assert!(matches!(port.read_data(&mut buf, 10).await, Err(SerialError::IoError(_))));
    }
}
