pub mod settings;

pub use settings::{SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PORT};
