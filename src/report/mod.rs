pub mod accumulator;
pub mod format;
pub mod percentiles;
pub mod processor;
pub mod sink;

pub use accumulator::Accumulator;
pub use format::{renderer_for, CsvRenderer, IntervalRow, PlainRenderer, RowRenderer};
pub use percentiles::PercentileSet;
pub use processor::{run, Processor, Summary};
pub use sink::{BoxedSink, Sinks};
