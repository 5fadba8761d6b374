//! The fixed-length structure at the archive tail. Its distance from
//! end-of-file never changes, so a reader can find it without any other
//! state.

use strata_base::{ByteBuffer, ByteCursor, Error, FileController, Result};

use crate::magic::{FILE_EOF, FOOTER_LENGTH};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ArchiveFooter {
    /// File offset just past the last block; the index region starts here.
    pub offset_end_of_data: u64,
    pub n_blocks: u64,
    pub n_variants: u64,
    pub controller: FileController,
    pub eof_marker: [u8; 32],
}

impl Default for ArchiveFooter {
    fn default() -> Self {
        ArchiveFooter {
            offset_end_of_data: 0,
            n_blocks: 0,
            n_variants: 0,
            controller: FileController::default(),
            eof_marker: FILE_EOF,
        }
    }
}

impl ArchiveFooter {
    pub fn write(&self, buf: &mut ByteBuffer) {
        let start = buf.len();
        buf.put(self.offset_end_of_data);
        buf.put(self.n_blocks);
        buf.put(self.n_variants);
        buf.put(self.controller.bits());
        buf.put_bytes(&self.eof_marker);
        debug_assert_eq!(buf.len() - start, FOOTER_LENGTH);
    }

    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let offset_end_of_data = cur.get::<u64>()?;
        let n_blocks = cur.get::<u64>()?;
        let n_variants = cur.get::<u64>()?;
        let controller = FileController::from_bits(cur.get::<u16>()?);
        let mut eof_marker = [0u8; 32];
        eof_marker.copy_from_slice(cur.get_bytes(32)?);
        Ok(ArchiveFooter {
            offset_end_of_data,
            n_blocks,
            n_variants,
            controller,
            eof_marker,
        })
    }

    /// A valid footer has data, blocks, and the exact EOF marker.
    pub fn validate(&self) -> Result<()> {
        if self.eof_marker != FILE_EOF {
            return Err(Error::truncated("end-of-file marker missing or damaged"));
        }
        if self.offset_end_of_data == 0 {
            return Err(Error::truncated("footer carries no end-of-data offset"));
        }
        if self.n_blocks == 0 || self.n_variants == 0 {
            return Err(Error::truncated("archive holds no data"));
        }
        Ok(())
    }
}
