use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{now_ms, validate_span, validate_title, Engine, EngineError};

impl Engine {
    /// Create a calendar slot. New slots start `Busy` (off the marketplace).
    pub async fn create_slot(
        &self,
        id: Ulid,
        owner_id: Ulid,
        title: String,
        span: Span,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        validate_title(&title)?;
        let _gate = self.compact_gate.read().await;
        if self.slots.len() >= MAX_SLOTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many slots"));
        }
        if self.slots.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let record = LedgerRecord::SlotCreated {
            id,
            owner_id,
            title: title.clone(),
            span,
        };
        self.wal_append(&record).await?;
        let slot = SlotState::new(id, owner_id, title, span);
        self.slots.insert(id, Arc::new(RwLock::new(slot)));
        Ok(())
    }

    /// Edit title/time of an owned slot. The status column is never
    /// client-writable; a slot locked by a pending swap cannot be edited.
    pub async fn update_slot(
        &self,
        acting_user: Ulid,
        id: Ulid,
        title: String,
        span: Span,
    ) -> Result<(), EngineError> {
        validate_span(&span)?;
        validate_title(&title)?;
        let _gate = self.compact_gate.read().await;
        let rs = self.get_slot(&id).ok_or(EngineError::NotFound(id))?;
        let mut slot = rs.write().await;
        if slot.owner_id != acting_user {
            return Err(EngineError::Forbidden(id));
        }
        if slot.status == SlotStatus::SwapPending {
            return Err(EngineError::InvalidTransition {
                slot: id,
                from: slot.status,
            });
        }

        let record = LedgerRecord::SlotUpdated {
            id,
            title: title.clone(),
            span,
        };
        self.wal_append(&record).await?;
        slot.title = title;
        slot.span = span;
        Ok(())
    }

    pub async fn delete_slot(&self, acting_user: Ulid, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let rs = self.get_slot(&id).ok_or(EngineError::NotFound(id))?;
        let slot = rs.write().await;
        if slot.owner_id != acting_user {
            return Err(EngineError::Forbidden(id));
        }
        if slot.status == SlotStatus::SwapPending {
            return Err(EngineError::InvalidTransition {
                slot: id,
                from: slot.status,
            });
        }

        let record = LedgerRecord::SlotDeleted { id };
        self.wal_append(&record).await?;
        self.slots.remove(&id);
        Ok(())
    }

    /// Promote an owned slot onto the marketplace: Busy → Swappable.
    /// The only edge out of Busy; there is no delist operation.
    pub async fn offer_slot(&self, acting_user: Ulid, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let rs = self.get_slot(&id).ok_or(EngineError::NotFound(id))?;
        let mut slot = rs.write().await;
        if slot.owner_id != acting_user {
            return Err(EngineError::Forbidden(id));
        }
        if slot.status != SlotStatus::Busy {
            return Err(EngineError::InvalidTransition {
                slot: id,
                from: slot.status,
            });
        }

        let record = LedgerRecord::SlotOffered { id };
        self.wal_append(&record).await?;
        slot.status = SlotStatus::Swappable;
        metrics::counter!(observability::SLOTS_OFFERED_TOTAL).increment(1);
        Ok(())
    }

    /// Propose a one-for-one exchange. Both slots must be on the marketplace;
    /// one ledger record withdraws both (Swappable → SwapPending) and opens
    /// the Pending request, so a slot can never be promised to two offers.
    ///
    /// Of two racers against the same slot, the second to acquire the slot
    /// locks observes SwapPending and loses with `SlotUnavailable`.
    pub async fn open_request(
        &self,
        id: Ulid,
        requester_id: Ulid,
        requester_slot_id: Ulid,
        responder_slot_id: Ulid,
    ) -> Result<(), EngineError> {
        if requester_slot_id == responder_slot_id {
            return Err(EngineError::SelfSwap);
        }
        let _gate = self.compact_gate.read().await;
        if self.requests.len() >= MAX_REQUESTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many swap requests"));
        }
        if self.requests.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let (mut mine, mut theirs) = self
            .lock_slot_pair(requester_slot_id, responder_slot_id)
            .await?;

        if mine.owner_id != requester_id {
            return Err(EngineError::Forbidden(requester_slot_id));
        }
        if mine.owner_id == theirs.owner_id {
            return Err(EngineError::SelfSwap);
        }
        for slot in [&*mine, &*theirs] {
            if slot.status != SlotStatus::Swappable {
                metrics::counter!(observability::SLOT_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::SlotUnavailable(slot.id));
            }
        }

        let created_at = now_ms();
        let record = LedgerRecord::RequestOpened {
            id,
            requester_id,
            responder_id: theirs.owner_id,
            requester_slot_id,
            responder_slot_id,
            created_at,
        };
        self.wal_append(&record).await?;

        mine.status = SlotStatus::SwapPending;
        theirs.status = SlotStatus::SwapPending;
        self.requests.insert(
            id,
            Arc::new(RwLock::new(SwapRequest {
                id,
                requester_id,
                responder_id: theirs.owner_id,
                requester_slot_id,
                responder_slot_id,
                status: RequestStatus::Pending,
                created_at,
            })),
        );
        metrics::counter!(observability::REQUESTS_OPENED_TOTAL).increment(1);
        Ok(())
    }

    /// Accept or reject a pending request, as its responder.
    ///
    /// Accept is the atomic exchange: one ledger record commits the owner
    /// swap of both slots, their return to Busy, and the request's
    /// termination. All three rows are locked here, so no reader observes a
    /// half-swapped state; a WAL failure aborts before any row mutates.
    pub async fn respond(
        &self,
        responder_id: Ulid,
        request_id: Ulid,
        accept: bool,
    ) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let req_arc = self
            .get_request(&request_id)
            .ok_or(EngineError::NotFound(request_id))?;
        let mut req = req_arc.write().await;
        if req.status.is_terminal() {
            return Err(EngineError::AlreadyResolved(request_id));
        }
        if req.responder_id != responder_id {
            return Err(EngineError::Forbidden(request_id));
        }

        let (mut req_slot, mut resp_slot) = self
            .lock_slot_pair(req.requester_slot_id, req.responder_slot_id)
            .await?;

        if accept {
            let record = LedgerRecord::RequestAccepted { id: request_id };
            self.wal_append(&record).await?;
            std::mem::swap(&mut req_slot.owner_id, &mut resp_slot.owner_id);
            req_slot.status = SlotStatus::Busy;
            resp_slot.status = SlotStatus::Busy;
            req.status = RequestStatus::Accepted;
            metrics::counter!(observability::SWAPS_ACCEPTED_TOTAL).increment(1);
        } else {
            let record = LedgerRecord::RequestRejected { id: request_id };
            self.wal_append(&record).await?;
            req_slot.status = SlotStatus::Swappable;
            resp_slot.status = SlotStatus::Swappable;
            req.status = RequestStatus::Rejected;
            metrics::counter!(observability::SWAPS_REJECTED_TOTAL).increment(1);
        }
        Ok(())
    }

    /// Withdraw a pending request, as its requester. Both slots return to
    /// the marketplace; the request terminates as Cancelled.
    pub async fn cancel(&self, requester_id: Ulid, request_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let req_arc = self
            .get_request(&request_id)
            .ok_or(EngineError::NotFound(request_id))?;
        let mut req = req_arc.write().await;
        if req.status.is_terminal() {
            return Err(EngineError::AlreadyResolved(request_id));
        }
        if req.requester_id != requester_id {
            return Err(EngineError::Forbidden(request_id));
        }

        let (mut req_slot, mut resp_slot) = self
            .lock_slot_pair(req.requester_slot_id, req.responder_slot_id)
            .await?;

        let record = LedgerRecord::RequestCancelled { id: request_id };
        self.wal_append(&record).await?;
        req_slot.status = SlotStatus::Swappable;
        resp_slot.status = SlotStatus::Swappable;
        req.status = RequestStatus::Cancelled;
        metrics::counter!(observability::SWAPS_CANCELLED_TOTAL).increment(1);
        Ok(())
    }
}
