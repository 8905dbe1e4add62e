use std::fs;

use hilcheck_lib::emulation::EmulationStep;
use hilcheck_lib::expect::ExpectedResponses;
use hilcheck_lib::{ReceptionMode, SerialConfig, TestCaseFiles};

#[test]
fn loads_a_file_pair() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = dir.path().join("inputs.json");
    let expected = dir.path().join("expected.json");
    fs::write(
        &inputs,
        r#"{"test_name": "blink", "emulation_sequence": [
            {"action_id": "on", "type": "send_serial_line", "payload": "LED ON"},
            {"action_id": "wait", "type": "delay_ms", "duration": "20"}
        ]}"#,
    )
    .unwrap();
    fs::write(
        &expected,
        r#"{"reception_mode": "lines", "stop_condition_line": "END", "expected_responses": [
            {"response_id": "ack", "type": "exact_line", "value": "ACK LED ON"}
        ]}"#,
    )
    .unwrap();

    let case = TestCaseFiles::load(&inputs, &expected).unwrap();
    assert_eq!(case.inputs.test_name, "blink");
    assert_eq!(case.inputs.actions[0].step, EmulationStep::SendLine("LED ON".into()));
    assert_eq!(case.expected.reception_mode, ReceptionMode::Lines);
    assert!(matches!(&case.expected.expected, ExpectedResponses::Lines(rules) if rules.len() == 1));
}

#[test]
fn errors_name_the_offending_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = dir.path().join("inputs.json");
    let expected = dir.path().join("expected.json");
    fs::write(&inputs, r#"{"emulation_sequence": []}"#).unwrap();
    fs::write(&expected, r#"{"expected_responses": [{"type": "regex_match", "pattern": "("}]}"#).unwrap();

    let err = TestCaseFiles::load(&inputs, &expected).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("expected.json"), "{message}");

    let err = TestCaseFiles::load(dir.path().join("missing.json"), &expected).unwrap_err();
    assert!(format!("{:#}", err).contains("missing.json"));
}

#[test]
fn serial_config_loads_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("station.json");
    fs::write(&path, r#"{"port_name": "/dev/ttyUSB1", "idle_timeout_ms": 300}"#).unwrap();

    let config = SerialConfig::load(&path).unwrap();
    assert_eq!(config.port_name, "/dev/ttyUSB1");
    assert_eq!(config.idle_timeout_ms, Some(300));
    assert_eq!(config.baud_rate, 115200);
    assert_eq!(config.poll_interval_ms, 50);
}
