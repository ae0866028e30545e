use std::io;
use std::path::PathBuf;

use hdrhistogram::{AdditionError, CreationError};

// ─── Unified error type ──────────────────────────────────────────

/// Everything that can abort a processing run.
///
/// Output-open failures are deliberately absent: a sink that cannot be
/// opened is logged and skipped, it never ends the run.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("failed to open input file {}", path.display())]
    InputOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid histogram parameters: {0:?}")]
    Histogram(CreationError),

    #[error("failed to merge interval histogram: {0:?}")]
    Merge(AdditionError),

    #[error("failed to write report output")]
    Write(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
