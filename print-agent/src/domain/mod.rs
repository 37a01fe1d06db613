//! Domain types shared by the queue adapters and the processing pipeline.

mod file_spec;
mod job;

pub use file_spec::{
    DuplexMode, FileSpec, FitMode, ImageLayout, LayoutType, Orientation, PrintType,
};
pub use job::{Binding, Job, JobStatus, OrderType};
