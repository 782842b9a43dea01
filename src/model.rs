use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Tradability of a slot. `SwapPending` doubles as the slot lock: a slot in
/// this state belongs to exactly one open negotiation and cannot enter a
/// second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    /// Private calendar entry, not on the marketplace.
    Busy,
    /// Listed on the marketplace, open to offers.
    Swappable,
    /// Withdrawn while a swap request referencing it is pending.
    SwapPending,
}

/// A calendar slot row. `status` only ever changes through engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub title: String,
    pub span: Span,
    pub status: SlotStatus,
}

impl SlotState {
    pub fn new(id: Ulid, owner_id: Ulid, title: String, span: Span) -> Self {
        Self {
            id,
            owner_id,
            title,
            span,
            status: SlotStatus::Busy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    /// Terminal requests are immutable; only `Pending` can transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// A swap proposal between two slots owned by two distinct users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: Ulid,
    pub requester_id: Ulid,
    pub responder_id: Ulid,
    pub requester_slot_id: Ulid,
    pub responder_slot_id: Ulid,
    pub status: RequestStatus,
    pub created_at: Ms,
}

/// The ledger record types — flat, no nesting. This is the WAL record format.
///
/// One record describes one complete operation: `RequestOpened` locks both
/// slots, `RequestAccepted` performs the whole ownership exchange. Replay of
/// a prefix of the ledger therefore never reconstructs a half-applied swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRecord {
    SlotCreated {
        id: Ulid,
        owner_id: Ulid,
        title: String,
        span: Span,
    },
    SlotUpdated {
        id: Ulid,
        title: String,
        span: Span,
    },
    SlotDeleted {
        id: Ulid,
    },
    /// Busy → Swappable (owner puts the slot on the marketplace).
    SlotOffered {
        id: Ulid,
    },
    /// Opens a pending request and moves both slots to SwapPending.
    RequestOpened {
        id: Ulid,
        requester_id: Ulid,
        responder_id: Ulid,
        requester_slot_id: Ulid,
        responder_slot_id: Ulid,
        created_at: Ms,
    },
    /// The atomic exchange: swap owners, both slots Busy, request Accepted.
    RequestAccepted {
        id: Ulid,
    },
    RequestRejected {
        id: Ulid,
    },
    RequestCancelled {
        id: Ulid,
    },
    /// Compaction-only snapshot of a terminal request. Applying it restores
    /// the ledger row without touching either slot.
    RequestArchived {
        request: SwapRequest,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub title: String,
    pub start: Ms,
    pub end: Ms,
    pub status: SlotStatus,
}

impl SlotInfo {
    pub(crate) fn from_state(s: &SlotState) -> Self {
        Self {
            id: s.id,
            owner_id: s.owner_id,
            title: s.title.clone(),
            start: s.span.start,
            end: s.span.end,
            status: s.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: Ulid,
    pub requester_id: Ulid,
    pub responder_id: Ulid,
    pub requester_slot_id: Ulid,
    pub responder_slot_id: Ulid,
    pub status: RequestStatus,
    pub created_at: Ms,
}

impl RequestInfo {
    pub(crate) fn from_request(r: &SwapRequest) -> Self {
        Self {
            id: r.id,
            requester_id: r.requester_id,
            responder_id: r.responder_id,
            requester_slot_id: r.requester_slot_id,
            responder_slot_id: r.responder_slot_id,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

/// `list_requests` result: both directions, each most-recent-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFeed {
    /// Requests where the user is the responder.
    pub incoming: Vec<RequestInfo>,
    /// Requests where the user is the requester.
    pub outgoing: Vec<RequestInfo>,
}
