//! Input emulation: the actions sent to the device before listening starts.
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::clock::Clock;
use crate::serial::{SerialError, SerialPortIO};

#[derive(Debug, thiserror::Error)]
pub enum EmulationError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Action {index} ({action_id}): {message}")]
    InvalidAction {
        index: usize,
        action_id: String,
        message: String,
    },

    #[error("Action {index} ({action_id}): invalid hex payload: {source}")]
    InvalidHex {
        index: usize,
        action_id: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),
}

pub type Result<T> = std::result::Result<T, EmulationError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulationStep {
    /// Written with a trailing `\n`
    SendLine(String),
    SendBytes(Vec<u8>),
    Delay(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationAction {
    pub action_id: String,
    pub description: Option<String>,
    pub step: EmulationStep,
}

/// Parsed input-values document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSequence {
    pub test_name: String,
    pub actions: Vec<EmulationAction>,
}

#[derive(Debug, Deserialize)]
struct RawSequence {
    #[serde(default = "default_test_name")]
    test_name: String,
    #[serde(default)]
    emulation_sequence: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    action_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
    payload: Option<Value>,
    payload_hex: Option<String>,
    duration: Option<Value>,
}

fn default_test_name() -> String {
    "Unnamed Test".to_string()
}

impl InputSequence {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSequence = serde_json::from_str(text)?;
        let mut actions = Vec::with_capacity(raw.emulation_sequence.len());
        for (index, action) in raw.emulation_sequence.into_iter().enumerate() {
            actions.push(parse_action(index, action)?);
        }
        if actions.is_empty() {
            log::warn!("No emulation sequence in input document '{}'", raw.test_name);
        }
        Ok(Self { test_name: raw.test_name, actions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// A sequence that sends nothing
    pub fn empty(test_name: impl Into<String>) -> Self {
        Self { test_name: test_name.into(), actions: Vec::new() }
    }
}

fn parse_action(index: usize, raw: RawAction) -> Result<EmulationAction> {
    let action_id = raw.action_id.unwrap_or_else(|| format!("action_{}", index));
    let invalid = |message: String| EmulationError::InvalidAction {
        index,
        action_id: action_id.clone(),
        message,
    };

    let step = match raw.kind.as_deref() {
        Some("send_serial_line") => match raw.payload {
            Some(Value::String(text)) => EmulationStep::SendLine(text),
            // Numbers and booleans are sent as their JSON text
            Some(Value::Null) | None => return Err(invalid("'payload' missing for send_serial_line".into())),
            Some(other) => EmulationStep::SendLine(other.to_string()),
        },
        Some("send_serial_bytes") => {
            let text = raw
                .payload_hex
                .ok_or_else(|| invalid("'payload_hex' missing for send_serial_bytes".into()))?;
            let compact: String = text.split_whitespace().collect();
            let bytes = hex::decode(&compact).map_err(|source| EmulationError::InvalidHex {
                index,
                action_id: action_id.clone(),
                source,
            })?;
            EmulationStep::SendBytes(bytes)
        }
        Some("delay_ms") => {
            let millis = match raw.duration {
                Some(Value::Number(n)) => n.as_u64(),
                Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
                None => return Err(invalid("'duration' missing for delay_ms".into())),
                _ => None,
            }
            .ok_or_else(|| invalid("'duration' must be a non-negative integer".into()))?;
            EmulationStep::Delay(Duration::from_millis(millis))
        }
        Some(other) => return Err(invalid(format!("unknown action type '{}'", other))),
        None => return Err(invalid("missing 'type'".into())),
    };

    Ok(EmulationAction { action_id, description: raw.description, step })
}

/// Run every action in order, pausing `gap` after each one. Returning is
/// the signal that listening can start.
pub async fn emulate<P, C>(port: &mut P, clock: &C, sequence: &InputSequence, gap: Duration) -> Result<()>
where
    P: SerialPortIO + ?Sized,
    C: Clock,
{
    log::info!(
        "Emulating {} action(s) for '{}'",
        sequence.actions.len(),
        sequence.test_name
    );

    for action in &sequence.actions {
        match &action.step {
            EmulationStep::SendLine(line) => {
                let mut data = Vec::with_capacity(line.len() + 1);
                data.extend_from_slice(line.as_bytes());
                data.push(b'\n');
                port.send_data(&data).await?;
                log::debug!("[{}] sent line '{}'", action.action_id, line);
            }
            EmulationStep::SendBytes(bytes) => {
                port.send_data(bytes).await?;
                log::debug!("[{}] sent bytes {}", action.action_id, hex::encode(bytes));
            }
            EmulationStep::Delay(duration) => {
                log::debug!("[{}] delaying {:?}", action.action_id, duration);
                clock.sleep(*duration).await;
            }
        }
        if !gap.is_zero() {
            clock.sleep(gap).await;
        }
    }

    port.flush().await?;
    log::info!("Emulation finished for '{}'", sequence.test_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::serial::ScriptedPort;

    const SEQUENCE: &str = r#"{
        "test_name": "temperature readout",
        "emulation_sequence": [
            {"action_id": "a1", "type": "send_serial_line", "payload": "READ_TEMP"},
            {"action_id": "a2", "type": "delay_ms", "duration": 250},
            {"action_id": "a3", "type": "send_serial_bytes", "payload_hex": "DE AD be ef"},
            {"type": "send_serial_line", "payload": 42}
        ]
    }"#;

    #[test]
    fn parses_every_action_type() {
        let seq = InputSequence::from_json_str(SEQUENCE).unwrap();
        assert_eq!(seq.test_name, "temperature readout");

        let steps: Vec<_> = seq.actions.iter().map(|a| a.step.clone()).collect();
        assert_eq!(
            steps,
            vec![
                EmulationStep::SendLine("READ_TEMP".into()),
                EmulationStep::Delay(Duration::from_millis(250)),
                EmulationStep::SendBytes(vec![0xde, 0xad, 0xbe, 0xef]),
                EmulationStep::SendLine("42".into()),
            ]
        );
        assert_eq!(seq.actions[3].action_id, "action_3");
    }

    #[test]
    fn missing_sequence_is_empty() {
        let seq = InputSequence::from_json_str("{}").unwrap();
        assert_eq!(seq.test_name, "Unnamed Test");
        assert!(seq.actions.is_empty());
    }

    #[test]
    fn bad_actions_are_load_errors() {
        let missing = r#"{"emulation_sequence": [{"type": "send_serial_line"}]}"#;
        assert!(matches!(
            InputSequence::from_json_str(missing),
            Err(EmulationError::InvalidAction { index: 0, .. })
        ));

        let bad_hex = r#"{"emulation_sequence": [{"action_id": "x", "type": "send_serial_bytes", "payload_hex": "ZZ"}]}"#;
        assert!(matches!(
            InputSequence::from_json_str(bad_hex),
            Err(EmulationError::InvalidHex { .. })
        ));

        let negative = r#"{"emulation_sequence": [{"type": "delay_ms", "duration": -5}]}"#;
        assert!(InputSequence::from_json_str(negative).is_err());

        let unknown = r#"{"emulation_sequence": [{"type": "toggle_pin"}]}"#;
        let err = InputSequence::from_json_str(unknown).unwrap_err();
        assert!(err.to_string().contains("toggle_pin"));
    }

    #[tokio::test]
    async fn emulate_writes_in_order_and_advances_time() {
        let clock = ManualClock::new();
        let mut port = ScriptedPort::new(clock.clone());
        let seq = InputSequence::from_json_str(SEQUENCE).unwrap();

        emulate(&mut port, &clock, &seq, Duration::from_millis(50)).await.unwrap();

        let mut expected = b"READ_TEMP\n".to_vec();
        expected.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        expected.extend_from_slice(b"42\n");
        assert_eq!(port.sent(), expected.as_slice());
        // 250 ms delay plus a 50 ms gap after each of the four actions
        assert_eq!(clock.elapsed(), Duration::from_millis(450));
    }
}
