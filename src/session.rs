//! One serial connection driving test cases end to end:
//! reset, emulate inputs, collect, match.
use std::path::Path;

use anyhow::Context;

use crate::clock::{Clock, SystemClock};
use crate::config::SerialConfig;
use crate::emulation::{self, EmulationError, InputSequence};
use crate::expect::{ConfigError, ExpectationDocument};
use crate::matcher::{self, MatchReport};
use crate::reception::ReceptionController;
use crate::serial::{SerialError, SerialInterface, SerialPortIO};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Emulation failed: {0}")]
    Emulation(#[from] EmulationError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Owns the transport for its lifetime. Test cases run strictly one after
/// another on it.
pub struct HilSession<P: SerialPortIO, C: Clock> {
    port: P,
    controller: ReceptionController<C>,
    clock: C,
    cases_run: usize,
}

impl HilSession<SerialInterface, SystemClock> {
    /// Open the configured hardware port
    pub async fn open(config: SerialConfig) -> Result<Self> {
        config.validate()?;
        let mut port = SerialInterface::new();
        port.connect(&config).await?;
        Ok(Self::new(port, config, SystemClock))
    }
}

impl<P: SerialPortIO, C: Clock + Clone> HilSession<P, C> {
    /// Wrap an already connected transport
    pub fn new(port: P, config: SerialConfig, clock: C) -> Self {
        Self {
            port,
            controller: ReceptionController::new(config, clock.clone()),
            clock,
            cases_run: 0,
        }
    }
}

impl<P: SerialPortIO, C: Clock> HilSession<P, C> {
    /// Get the active serial settings
    pub fn config(&self) -> &SerialConfig {
        self.controller.config()
    }

    /// Get the underlying transport
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Give the transport back, ending the session
    pub fn into_port(self) -> P {
        self.port
    }

    /// Test cases that reached the collection stage
    pub fn cases_run(&self) -> usize {
        self.cases_run
    }

    /// Run one test case. Bytes left over from earlier cases are dropped
    /// first, and the response timeout only starts once emulation is done.
    ///
    /// `Err` means the case could not be run at all. A case that ran but
    /// saw a transport failure while collecting yields a failing report.
    pub async fn run_case(&mut self, inputs: &InputSequence, expected: &ExpectationDocument) -> Result<MatchReport> {
        log::info!("Running test case '{}'", inputs.test_name);
        self.port.clear_input().await?;

        let gap = self.controller.config().action_gap();
        emulation::emulate(&mut self.port, &self.clock, inputs, gap).await?;

        let collection = self.controller.collect(&mut self.port, &expected.collection_spec()).await;
        self.cases_run += 1;

        let report = matcher::evaluate(expected, &collection);
        if report.passed() {
            log::info!("Test case '{}' PASSED", inputs.test_name);
        } else {
            log::warn!(
                "Test case '{}' FAILED ({} failure(s))",
                inputs.test_name,
                report.failure_count()
            );
        }
        Ok(report)
    }
}

/// Input and expected-value documents for one test case
#[derive(Debug, Clone)]
pub struct TestCaseFiles {
    pub inputs: InputSequence,
    pub expected: ExpectationDocument,
}

impl TestCaseFiles {
    /// Load both documents, naming the offending file on error
    pub fn load(inputs_path: impl AsRef<Path>, expected_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let inputs_path = inputs_path.as_ref();
        let expected_path = expected_path.as_ref();

        let inputs = InputSequence::load(inputs_path)
            .with_context(|| format!("Failed to load input values from {}", inputs_path.display()))?;
        let expected = ExpectationDocument::load(expected_path)
            .with_context(|| format!("Failed to load expected values from {}", expected_path.display()))?;

        Ok(Self { inputs, expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::serial::ScriptedPort;
    use std::time::Duration;

    fn config() -> SerialConfig {
        SerialConfig { action_gap_ms: 0, ..SerialConfig::default() }
    }

    #[tokio::test]
    async fn timeout_starts_after_emulation() {
        let clock = ManualClock::new();
        // The reply lands 1.1 s in, well past the 500 ms response window
        // measured from process start, but inside it when measured from the
        // end of the 1 s delay action.
        let port = ScriptedPort::new(clock.clone()).line_at(1_100, "PONG");
        let mut session = HilSession::new(port, config(), clock.clone());

        let inputs = InputSequence::from_json_str(
            r#"{"test_name": "ping", "emulation_sequence": [
                {"type": "send_serial_line", "payload": "PING"},
                {"type": "delay_ms", "duration": 1000}
            ]}"#,
        )
        .unwrap();
        let expected = ExpectationDocument::from_json_str(
            r#"{"response_timeout_ms": 500, "expected_responses": [{"type": "exact_line", "value": "PONG"}]}"#,
        )
        .unwrap();

        let report = session.run_case(&inputs, &expected).await.unwrap();
        assert!(report.passed(), "{report}");
        assert_eq!(session.port().sent_text(), "PING\n");
        assert_eq!(session.cases_run(), 1);
    }

    #[tokio::test]
    async fn stale_bytes_do_not_leak_into_the_next_case() {
        let clock = ManualClock::new();
        let port = ScriptedPort::new(clock.clone())
            .line_at(0, "OLD")
            .line_at(300, "NEW");
        let mut session = HilSession::new(port, config(), clock.clone());
        clock.advance(Duration::from_millis(10));

        let expected = ExpectationDocument::from_json_str(
            r#"{"response_timeout_ms": 400, "expected_responses": [
                {"response_id": "old", "type": "exact_line", "value": "OLD"},
                {"response_id": "new", "type": "exact_line", "value": "NEW"}
            ]}"#,
        )
        .unwrap();

        let report = session.run_case(&InputSequence::empty("reset"), &expected).await.unwrap();
        let outcomes = report.line_outcomes();
        assert!(!outcomes[0].passed);
        assert!(outcomes[1].passed);
    }

    #[tokio::test]
    async fn emulation_errors_abort_the_case() {
        struct BrokenPort;

        #[async_trait::async_trait]
        impl SerialPortIO for BrokenPort {
            async fn send_data(&mut self, _data: &[u8]) -> crate::serial::Result<usize> {
                Err(SerialError::NotConnected)
            }
            async fn read_data(&mut self, _buffer: &mut [u8], _timeout_ms: u64) -> crate::serial::Result<usize> {
                Err(SerialError::Timeout)
            }
            async fn flush(&mut self) -> crate::serial::Result<()> {
                Ok(())
            }
            async fn clear_input(&mut self) -> crate::serial::Result<()> {
                Ok(())
            }
        }

        let mut session = HilSession::new(BrokenPort, config(), ManualClock::new());
        let inputs = InputSequence::from_json_str(
            r#"{"emulation_sequence": [{"type": "send_serial_line", "payload": "X"}]}"#,
        )
        .unwrap();
        let expected = ExpectationDocument::from_json_str(r#"{"expected_responses": []}"#).unwrap();

        let err = session.run_case(&inputs, &expected).await.unwrap_err();
        assert!(matches!(err, SessionError::Emulation(EmulationError::Serial(SerialError::NotConnected))));
        assert_eq!(session.cases_run(), 0);
    }
}
