//! Errors for the control-plane command channel.

/// Errors that can occur delivering a command to a worker-bound module.
#[derive(thiserror::Error, Debug)]
pub enum SendError<T> {
    /// The command queue is full and the command could not be sent.
    #[error("command queue is full and the command could not be sent")]
    Full(T),

    /// The target worker has shut down and the command could not be sent.
    #[error("command queue is closed and the command could not be sent")]
    Closed(T),
}

impl<T> SendError<T> {
    /// Returns the command that could not be delivered, regardless of reason.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(t) => t,
            Self::Closed(t) => t,
        }
    }
}

/// Errors that can occur waiting for a command reply.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The command queue has been closed by its owner.
    #[error("command queue is closed")]
    Closed,

    /// No command was available.
    #[error("command queue is empty")]
    Empty,
}
