use std::path::PathBuf;

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{}", source))]
    IO {
        source: std::io::Error,
    },

    #[snafu(display("Unable to open file '{}': {}", path.display(), source))]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to create file '{}': {}", path.display(), source))]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Error with read file '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to write file '{}': {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to sync file: {}", source))]
    SyncFile {
        source: std::io::Error,
    },

    #[snafu(display("Unable to delete file '{}': {}", path.display(), source))]
    DeleteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("File '{}' not found", path.display()))]
    FileNotFound {
        path: PathBuf,
    },

    #[snafu(display("File '{}' already exists and is not empty", path.display()))]
    AlreadyExists {
        path: PathBuf,
    },

    /// Chunk payloads carry their length in 31 bits.
    #[snafu(display("Chunk payload of {} bytes exceeds the length field", len))]
    ChunkTooLarge {
        len: u64,
    },

    /// Header payloads carry their signed length in 32 bits.
    #[snafu(display("Header payload of {} bytes exceeds the length field", len))]
    HeaderTooLarge {
        len: u64,
    },

    /// MD5 mismatch on a verified chunk read. The file is unusable, the
    /// owning task exits after reporting this.
    #[snafu(display("File corruption in '{}' at position {}", path.display(), pos))]
    FileCorruption {
        path: PathBuf,
        pos: u64,
    },

    #[snafu(display("Unexpected eof"))]
    Eof,

    /// The owning task exited (close, idle timeout or fatal error) before
    /// this request could be served.
    #[snafu(display("File task is closed"))]
    FileClosed,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::IO { source: value }
    }
}

impl Error {
    pub fn is_file_not_found(&self) -> bool {
        match self {
            Self::FileNotFound { .. } => true,
            Self::OpenFile { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
