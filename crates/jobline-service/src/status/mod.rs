//! Job status reads and long-polling.

pub mod reader;

pub use reader::JobStatusReader;
