//! Serial reception loop: turns transport bytes into lines or one JSON object
//! within a bounded time window.
use std::time::Instant;

use serde_json::Value;

use super::types::*;
use crate::clock::Clock;
use crate::config::SerialConfig;
use crate::serial::{SerialError, SerialPortIO};

const READ_CHUNK: usize = 512;

pub struct ReceptionController<C: Clock> {
    config: SerialConfig,
    clock: C,
}

impl<C: Clock> ReceptionController<C> {
    /// Create a controller reading time from `clock`
    pub fn new(config: SerialConfig, clock: C) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Collect from `port` until the stop line, a complete JSON
    /// object, the idle timeout or the overall timeout, whichever comes
    /// first. The timeout clock starts when this is called.
    ///
    /// Transport failures end collection early but never discard what was
    /// already received.
    pub async fn collect<P>(&self, port: &mut P, spec: &CollectionSpec) -> Collection
    where
        P: SerialPortIO + ?Sized,
    {
        let started = self.clock.now();
        let mut metrics = ReceptionMetrics::default();
        let mut sink = match spec.mode {
            ReceptionMode::Lines => Sink::Lines(LineAccumulator::new(spec, self.config.max_partial_bytes)),
            ReceptionMode::JsonObject => Sink::Json(JsonAccumulator::default()),
        };
        let idle_timeout = match spec.mode {
            ReceptionMode::Lines => self.config.idle_timeout(),
            ReceptionMode::JsonObject => None,
        };

        let mut state = ReceptionState::Waiting;
        let mut last_data: Option<Instant> = None;
        let mut transport_error = None;
        let mut parsed: Option<Value> = None;
        let mut buf = [0u8; READ_CHUNK];

        log::info!(
            "Collecting {} for up to {:?} (stop line: {:?})",
            spec.mode.name(),
            spec.timeout,
            spec.stop_condition_line
        );

        while !state.is_terminal() {
            let now = self.clock.now();
            let elapsed = now.saturating_duration_since(started);
            if elapsed >= spec.timeout {
                state = ReceptionState::TimedOut;
                break;
            }
            if let (Some(idle), Some(last)) = (idle_timeout, last_data) {
                if now.saturating_duration_since(last) >= idle {
                    log::info!("No data for {:?}, ending collection", idle);
                    state = ReceptionState::Complete;
                    break;
                }
            }

            // Never block past the deadline, and never ask for a zero wait
            let poll = (spec.timeout - elapsed).min(self.config.poll_interval());
            let poll_ms = u64::try_from(poll.as_millis()).unwrap_or(u64::MAX).max(1);
            metrics.polls += 1;

            match port.read_data(&mut buf, poll_ms).await {
                Ok(0) | Err(SerialError::Timeout) => {}
                Ok(n) => {
                    state = ReceptionState::Accumulating;
                    last_data = Some(self.clock.now());
                    metrics.bytes_read += n as u64;
                    match &mut sink {
                        Sink::Lines(acc) => {
                            if acc.push(&buf[..n], &mut metrics) {
                                state = ReceptionState::StoppedByCondition;
                            }
                        }
                        Sink::Json(acc) => {
                            acc.extend(&buf[..n]);
                            if let Some(value) = acc.try_parse(&mut metrics) {
                                parsed = Some(value);
                                state = ReceptionState::Complete;
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("Transport failed during collection: {}", e);
                    transport_error = Some(e.to_string());
                    state = ReceptionState::TransportFailed;
                }
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(started);
        let (data, raw_tail) = match sink {
            Sink::Lines(acc) => {
                let flush_tail = state != ReceptionState::StoppedByCondition;
                let (lines, tail) = acc.finish(flush_tail, &mut metrics);
                (ReceivedData::Lines(lines), tail)
            }
            Sink::Json(acc) => {
                let tail = if parsed.is_some() { String::new() } else { acc.text() };
                (ReceivedData::Json(parsed), tail)
            }
        };

        match state {
            ReceptionState::TimedOut if metrics.bytes_read == 0 => {
                log::warn!("Timed out after {:?} without receiving any data", elapsed);
            }
            ReceptionState::TimedOut => {
                log::warn!(
                    "Timed out after {:?}; handing partial data ({} bytes) to the matcher",
                    elapsed,
                    metrics.bytes_read
                );
            }
            ReceptionState::StoppedByCondition => log::info!("Stop condition met after {:?}", elapsed),
            ReceptionState::Complete => log::info!("Collection complete after {:?}", elapsed),
            _ => {}
        }

        Collection {
            data,
            state,
            elapsed,
            stop_condition_line: spec.stop_condition_line.clone(),
            transport_error,
            raw_tail,
            metrics,
        }
    }
}

enum Sink<'a> {
    Lines(LineAccumulator<'a>),
    Json(JsonAccumulator),
}

struct LineAccumulator<'a> {
    partial: Vec<u8>,
    lines: Vec<String>,
    stop_line: Option<&'a str>,
    retain_stop_line: bool,
    max_partial: usize,
}

impl<'a> LineAccumulator<'a> {
    fn new(spec: &'a CollectionSpec, max_partial: usize) -> Self {
        Self {
            partial: Vec::new(),
            lines: Vec::new(),
            stop_line: spec.stop_condition_line.as_deref(),
            retain_stop_line: spec.retain_stop_line,
            max_partial,
        }
    }

    /// Returns true once the stop line was seen; later bytes are left in
    /// `partial` untouched.
    fn push(&mut self, bytes: &[u8], metrics: &mut ReceptionMetrics) -> bool {
        self.partial.extend_from_slice(bytes);
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            if self.accept(&raw[..pos], metrics) {
                return true;
            }
        }
        if self.partial.len() > self.max_partial {
            let cut = self.partial.len() - self.max_partial / 2;
            self.partial.drain(..cut);
            metrics.partial_buffer_trims += 1;
            log::warn!("Unterminated line exceeded {} bytes, dropped {} bytes", self.max_partial, cut);
        }
        false
    }

    fn accept(&mut self, raw: &[u8], metrics: &mut ReceptionMetrics) -> bool {
        let text = decode(raw, metrics);
        let line = text.trim();
        if line.is_empty() {
            return false;
        }
        metrics.lines_read += 1;
        log::debug!("Line received: {:?}", line);

        if self.stop_line == Some(line) {
            if self.retain_stop_line {
                self.lines.push(line.to_string());
            }
            return true;
        }
        self.lines.push(line.to_string());
        false
    }

    fn finish(mut self, flush_tail: bool, metrics: &mut ReceptionMetrics) -> (Vec<String>, String) {
        if !flush_tail {
            let tail = String::from_utf8_lossy(&self.partial).into_owned();
            return (self.lines, tail);
        }
        let tail = std::mem::take(&mut self.partial);
        self.accept(&tail, metrics);
        (self.lines, String::new())
    }
}

fn decode(raw: &[u8], metrics: &mut ReceptionMetrics) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => {
            metrics.utf8_decode_errors += 1;
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

#[derive(Default)]
struct JsonAccumulator {
    buffer: Vec<u8>,
    /// Where the search for the next candidate `{` starts
    scan_from: usize,
    /// A candidate was rejected; skip to the end of the line it broke on
    /// before looking for another `{`
    resync: bool,
}

impl JsonAccumulator {
    fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Parse the first complete object in the buffer, skipping noise and
    /// broken candidates before it. `None` means "need more bytes".
    ///
    /// Braces nested inside a rejected candidate are never tried as a new
    /// root: scanning resumes after the newline that follows the syntax
    /// error.
    fn try_parse(&mut self, metrics: &mut ReceptionMetrics) -> Option<Value> {
        loop {
            if self.resync {
                match self.buffer[self.scan_from..].iter().position(|b| *b == b'\n') {
                    Some(i) => {
                        self.scan_from += i + 1;
                        self.resync = false;
                    }
                    None => {
                        self.scan_from = self.buffer.len();
                        return None;
                    }
                }
            }

            let offset = self.buffer.get(self.scan_from..)?.iter().position(|b| *b == b'{')?;
            let start = self.scan_from + offset;

            let mut stream = serde_json::Deserializer::from_slice(&self.buffer[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => return Some(value),
                Some(Err(e)) if e.is_eof() => {
                    self.scan_from = start;
                    return None;
                }
                Some(Err(e)) => {
                    log::debug!("Discarding JSON candidate at byte {}: {}", start, e);
                    metrics.discarded_json_candidates += 1;
                    self.scan_from = start + error_offset(&self.buffer[start..], e.line(), e.column());
                    self.resync = true;
                }
                None => return None,
            }
        }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

/// Byte offset of a 1-based `line`/`column` error position, clamped to the
/// end of that line
fn error_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let line_start = if line <= 1 {
        0
    } else {
        bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(line - 2)
            .map(|(i, _)| i + 1)
            .unwrap_or(bytes.len())
    };
    let line_end = bytes[line_start..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| line_start + i)
        .unwrap_or(bytes.len());
    (line_start + column.saturating_sub(1)).min(line_end)
}
