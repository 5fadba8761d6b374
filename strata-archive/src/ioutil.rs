//! Archive transport. Blocks are written append-only and fetched by
//! absolute byte range, so the whole engine needs exactly two
//! capabilities: a seekable byte sink and a seekable byte source. Any
//! `std::io` type with those traits qualifies; in-memory archives use
//! `Cursor<Vec<u8>>` and on-disk archives the buffered file handles
//! below.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use strata_base::Result;

/// Where an archive is written: the writer owns the sink exclusively and
/// records block byte ranges as it drains them.
pub trait Sink: Write + Seek + Send {
    fn pos(&mut self) -> Result<u64> {
        Ok(self.stream_position()?)
    }
}

impl<T: Write + Seek + Send> Sink for T {}

/// Where an archive is read from: the reader seeks to the footer, the
/// index region, and individual block ranges.
pub trait Source: Read + Seek + Send {}

impl<T: Read + Seek + Send> Source for T {}

/// Create a fresh archive file, refusing to clobber an existing one.
pub fn create_archive_file(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.as_ref())?;
    Ok(BufWriter::new(file))
}

/// Open an existing archive file for reading.
pub fn open_archive_file(path: impl AsRef<Path>) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path.as_ref())?))
}
