#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("radio error: {0}")]
    Radio(String),

    #[error("socket is not connected")]
    NotConnected,

    #[error("socket is already connected")]
    AlreadyConnected,

    #[error("connection was reset by peer")]
    ConnectionReset,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection is closing")]
    ConnectionClosing,

    #[error("operation timed out")]
    Timeout,

    #[error("operation would block")]
    WouldBlock,

    #[error("socket has been closed")]
    SocketClosed,

    #[error("no free socket-id slots (max {0})")]
    NoFreeSocketId(u8),
}

#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame or segment too short")]
    TooShort,

    #[error("unknown frame type: {0:#x}")]
    UnknownType(u8),

    #[error("socket-id out of range (must be 0..=15)")]
    SocketIdOutOfRange,

    #[error("payload too large")]
    PayloadTooLarge,
}
