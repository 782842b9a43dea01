use ulid::Ulid;

use crate::model::SlotStatus;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Acting user is not the owner/party the operation requires.
    Forbidden(Ulid),
    /// Slot status does not admit the requested transition.
    InvalidTransition { slot: Ulid, from: SlotStatus },
    /// Slot is not on the marketplace, or already locked by a pending request.
    SlotUnavailable(Ulid),
    /// Both slots of a proposal share an owner.
    SelfSwap,
    /// Request already terminated; accept/reject/cancel applies exactly once.
    AlreadyResolved(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Forbidden(id) => write!(f, "forbidden: not a party to {id}"),
            EngineError::InvalidTransition { slot, from } => {
                write!(f, "invalid transition for slot {slot} in status {from:?}")
            }
            EngineError::SlotUnavailable(id) => {
                write!(f, "slot unavailable: {id} is not open to offers")
            }
            EngineError::SelfSwap => write!(f, "cannot swap two slots with the same owner"),
            EngineError::AlreadyResolved(id) => {
                write!(f, "request already resolved: {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
