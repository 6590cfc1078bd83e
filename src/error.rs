use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors raised while extracting facts from a single source file.
///
/// All of these are recoverable: the scanner logs the file and moves on.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("Lofty error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an MP4-family audio container")]
    NotMp4Audio,
    #[error("no tag block present")]
    Untagged,
}

/// Failures of the external helper binaries (ffmpeg, mp4art, mp4tags).
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}")]
    Failed { tool: &'static str, status: ExitStatus },
}

/// Anything that stops one book from being produced. The run continues with
/// the remaining books after logging one of these.
#[derive(thiserror::Error, Debug)]
pub enum BookError {
    #[error("no disk numbering information, cannot establish a play order")]
    NoDiskInfo,
    #[error("track {track} on disk {disk} falls outside the validated range")]
    OrderingConflict { disk: u32, track: u32 },
    #[error("staging failed for {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("external tool failed: {0}")]
    Tool(#[from] ToolError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Processing failed for {author} - {book}: {source}")]
    Book {
        author: String,
        book: String,
        #[source]
        source: BookError,
    },
    #[error("I/O error during processing of {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} books failed to process")]
    BooksFailed(usize),
}
