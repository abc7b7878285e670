pub mod sinks;

pub use sinks::{read_cached, FileReportSink, LogReportSink};
