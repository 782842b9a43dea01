//! slotswap — a swap coordination engine for calendar slots.
//!
//! Users publish slots as available-for-trade and negotiate one-for-one
//! exchanges. The engine owns the status state machine (Busy → Swappable →
//! SwapPending → {Busy, Swappable}), the swap request ledger, and the atomic
//! ownership exchange on acceptance. Every operation commits as one ledger
//! record to a per-tenant WAL; the calling gateway supplies authenticated
//! user ids and maps [`EngineError`] variants to its own status codes.

pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod tenant;
pub mod wal;

pub use engine::{Engine, EngineError};
pub use tenant::TenantManager;
