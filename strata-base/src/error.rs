// We want a few things here:
// 1. A matchable kind for every failure the archive format can produce,
//    so callers can distinguish a bad checksum from a bad cipher tag.
// 2. A way to centralize setting a breakpoint to trap any error in the
//    system fairly soon after it's created.
// 3. Same but for logging / emitting error messages into the tracing system.

use std::borrow::Cow;

use tracing::error;

#[cfg(test)]
use test_log::test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated archive: {0}")]
    TruncatedArchive(Cow<'static, str>),

    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(Cow<'static, str>),

    #[error("authentication failure: {0}")]
    AuthFailure(Cow<'static, str>),

    #[error("codec failure: {0}")]
    CodecFailure(Cow<'static, str>),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(Cow<'static, str>),

    #[error("buffer bounds: {0}")]
    BufferBounds(Cow<'static, str>),

    #[error("unsorted input: {0}")]
    UnsortedInput(Cow<'static, str>),

    #[error("contig range violation: {0}")]
    ContigRangeViolation(Cow<'static, str>),

    #[error("genotype overflow: {0}")]
    GtOverflow(Cow<'static, str>),

    #[error("ploidy mismatch: {0}")]
    PloidyMismatch(Cow<'static, str>),

    #[error("pattern overflow: {0}")]
    PatternOverflow(Cow<'static, str>),

    #[error("version mismatch: {0}")]
    VersionMismatch(Cow<'static, str>),
}

type Msg = Cow<'static, str>;

impl Error {
    fn trace(self) -> Self {
        error!(target: "strata", "{}", self);
        self
    }

    pub fn truncated(msg: impl Into<Msg>) -> Self {
        Error::TruncatedArchive(msg.into()).trace()
    }
    pub fn checksum(msg: impl Into<Msg>) -> Self {
        Error::ChecksumMismatch(msg.into()).trace()
    }
    pub fn auth(msg: impl Into<Msg>) -> Self {
        Error::AuthFailure(msg.into()).trace()
    }
    pub fn codec(msg: impl Into<Msg>) -> Self {
        Error::CodecFailure(msg.into()).trace()
    }
    pub fn schema(msg: impl Into<Msg>) -> Self {
        Error::SchemaMismatch(msg.into()).trace()
    }
    pub fn bounds(msg: impl Into<Msg>) -> Self {
        Error::BufferBounds(msg.into()).trace()
    }
    pub fn unsorted(msg: impl Into<Msg>) -> Self {
        Error::UnsortedInput(msg.into()).trace()
    }
    pub fn contig_range(msg: impl Into<Msg>) -> Self {
        Error::ContigRangeViolation(msg.into()).trace()
    }
    pub fn gt_overflow(msg: impl Into<Msg>) -> Self {
        Error::GtOverflow(msg.into()).trace()
    }
    pub fn ploidy(msg: impl Into<Msg>) -> Self {
        Error::PloidyMismatch(msg.into()).trace()
    }
    pub fn pattern_overflow(msg: impl Into<Msg>) -> Self {
        Error::PatternOverflow(msg.into()).trace()
    }
    pub fn version(msg: impl Into<Msg>) -> Self {
        Error::VersionMismatch(msg.into()).trace()
    }
}

#[test]
fn test_error() {
    let err = Error::checksum("test checksum error");
    assert!(matches!(err, Error::ChecksumMismatch(_)));
}
