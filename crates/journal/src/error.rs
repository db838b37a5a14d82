use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while processing a single journal item.  The writer logs these and
/// moves on to the next item.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to create directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write header to {}", .path.display())]
    Header {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to append note to {}", .path.display())]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to stat {}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
