pub mod sink;

pub use sink::{
    timestamped, EventSink, HistorySink, MemorySink, StdoutSink, TracingSink, WriterSink,
    LOG_TIMESTAMP_FORMAT,
};
