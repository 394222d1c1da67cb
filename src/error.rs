use thiserror::Error;

/// Crate-wide result type for the public surface.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the [`Media`](crate::Media) handle.
///
/// Only pre-start configuration can fail synchronously. Decode-side failures
/// are reported through short or zero `read_audio` returns; there is no error
/// channel on a running stream.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream was already handed to the decode thread.
    #[error("media already started")]
    AlreadyStarted,

    /// The handle was closed before the operation.
    #[error("media already closed")]
    Closed,

    /// The requested playback range is empty.
    #[error("playback range is empty: start={start}s end={end}s")]
    InvalidRange { start: f64, end: f64 },

    /// The decode thread could not be spawned.
    #[error("failed to spawn decode thread")]
    Thread(#[from] std::io::Error),
}
