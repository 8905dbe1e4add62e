pub mod clock;
pub mod config;
pub mod emulation;
pub mod expect;
pub mod matcher;
pub mod reception;
pub mod serial;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SerialConfig;
pub use emulation::{emulate, InputSequence};
pub use expect::{ConfigError, ExpectationDocument};
pub use matcher::{evaluate, MatchReport};
pub use reception::{Collection, ReceptionController, ReceptionMode, ReceptionState};
pub use serial::{ScriptedPort, SerialError, SerialInterface, SerialPortIO};
pub use session::{HilSession, SessionError, TestCaseFiles};
