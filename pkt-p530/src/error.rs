//! Engine-level error kinds surfaced to Action continuations and observers.
//!
//! Discriminants match the device firmware's wire-level error codes
//! verbatim, including the unused 5/6 gap — nothing downstream depends on
//! the gap, but there's no reason to renumber a stable wire-adjacent enum.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[repr(u8)]
pub enum ErrorCode {
    #[error("ok")]
    Ok = 0,
    #[error("timed out waiting for a reply")]
    Timeout = 1,
    #[error("failed to write the request to the UART")]
    SendFailed = 2,
    #[error("device failed to boot")]
    BootFailed = 3,
    #[error("no food in the hopper")]
    NoFood = 4,
    #[error("door is blocked")]
    DoorBlocked = 7,
    /// Internal-only: "this frame wasn't the one I was waiting for". Never
    /// surfaced to a caller or continuation.
    #[error("not implemented")]
    NotImplemented = 8,
}
