pub mod reader;
pub mod types;

pub use reader::ReceptionController;
pub use types::{
    Collection, CollectionSpec, ReceivedData, ReceptionMetrics, ReceptionMode, ReceptionState,
};
