pub mod sink;

pub use sink::{ArrowRowSink, SinkError};
