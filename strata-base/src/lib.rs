mod buffer;
mod controller;
mod error;

pub use buffer::{ByteBuffer, ByteCursor, Primitive};
pub use controller::{BlockController, FileController, RecordController};
pub use error::{Error, Result};

#[cfg(test)]
mod test;
