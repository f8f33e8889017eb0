//! One module per pipeline stage. Each exposes a plan of work units and the
//! synchronous function that executes one of them.

pub mod aggregate;
pub mod bucket;
pub mod correlate;
pub mod download;
pub mod financial;
pub mod parse;
