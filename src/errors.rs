//! Error taxonomy for pdfcraft.
//!
//! One enumerated kind threaded through every fallible operation in the
//! crate (object formatter panics are the sole exception: a formatter
//! nesting violation is a bug in the emitting code, not user input).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // --- argument validation ---
    #[error("argument must not be null/empty")]
    NullArgument,
    #[error("negative index: {0}")]
    NegativeIndex(i64),
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("value is not valid ASCII: {0:?}")]
    NotAscii(String),
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("invalid enum value: {0}")]
    BadEnum(&'static str),
    #[error("invalid boolean value")]
    BadBoolean,
    #[error("color component out of range [0, 1]: {0}")]
    ColorOutOfRange(f32),

    // --- state misuse ---
    #[error("draw state end mismatch: expected to close {expected}, found {found}")]
    DrawStateEndMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("BMC/BDC cannot nest inside an already-open marked-content span")]
    NestedBmc,
    #[error("EMC with no matching BMC/BDC")]
    EmcOnEmpty,
    #[error("marked-content span left open at steal()")]
    UnclosedMarkedContent,
    #[error("annotation handle {0:?} used more than once")]
    AnnotationReuse(crate::document::AnnotationId),
    #[error("structure item handle {0:?} used more than once as a page reference")]
    StructureReuse(crate::document::StructureItemId),
    #[error("operation not valid for this draw context kind")]
    WrongDrawContext,
    #[error("generator.write() called more than once")]
    WritingTwice,

    // --- format errors ---
    #[error("malformed font file: {0}")]
    MalformedFontFile(String),
    #[error("invalid ICC profile: {0}")]
    InvalidIccProfile(String),
    #[error("color space expects {expected} channels, profile has {found}")]
    IncorrectColorChannelCount { expected: u8, found: u8 },
    #[error("unsupported font/image format: {0}")]
    UnsupportedFormat(String),
    #[error("unsupported TIFF layout: {0}")]
    UnsupportedTiff(String),
    #[error("invalid UTF-8 input")]
    BadUtf8,
    #[error("image declares both an explicit mask and an alpha channel")]
    MaskAndAlpha,

    // --- resource errors ---
    #[error("could not open file {path}: {source}")]
    CouldNotOpenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file does not exist: {0}")]
    FileDoesNotExist(String),
    #[error("file read error: {0}")]
    FileReadError(String),
    #[error("file write error: {0}")]
    FileWriteError(String),
    #[error("memory map failed: {0}")]
    MmapFail(String),
    #[error("stream compression failed: {0}")]
    CompressionFailure(String),

    // --- missing prerequisites ---
    #[error("CMYK operator used but no CMYK output profile is declared")]
    NoCmykProfile,
    #[error("output profile missing for color space {0}")]
    OutputProfileMissing(&'static str),
    #[error("output intent requires an identifier but none was supplied")]
    MissingIntentIdentifier,
    #[error("font not specified before a text operation")]
    FontNotSpecified,
    #[error("no glyph mapped for codepoint U+{0:04X}")]
    MissingGlyph(u32),
    #[error("subset already holds the maximum of 65000 glyphs")]
    TooManyGlyphsUsed,
    #[error("document conformance requires an output intent but none was added")]
    OutputIntentMissing,

    // --- output constraints ---
    #[error("image color space is not permitted under the declared output intent")]
    ImageFormatNotPermitted,
    #[error("operator {op} is not permitted for the document's output intent")]
    BadOperationForIntent { op: &'static str },

    // --- reserved ---
    #[error("{0}")]
    Dynamic(String),
    #[error("unreachable state reached: {0}")]
    Unreachable(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn dynamic(msg: impl Into<String>) -> Self {
        Error::Dynamic(msg.into())
    }
}
