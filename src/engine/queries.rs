use ulid::Ulid;

use crate::model::*;

use super::{Engine, SharedRequest, SharedSlotState};

impl Engine {
    fn slot_arcs(&self) -> Vec<SharedSlotState> {
        self.slots.iter().map(|e| e.value().clone()).collect()
    }

    fn request_arcs(&self) -> Vec<SharedRequest> {
        self.requests.iter().map(|e| e.value().clone()).collect()
    }

    /// Current state of a single slot.
    pub async fn slot_info(&self, id: &Ulid) -> Option<SlotInfo> {
        let rs = self.get_slot(id)?;
        let slot = rs.read().await;
        Some(SlotInfo::from_state(&slot))
    }

    /// Current state of a single request.
    pub async fn request_info(&self, id: &Ulid) -> Option<RequestInfo> {
        let arc = self.get_request(id)?;
        let req = arc.read().await;
        Some(RequestInfo::from_request(&req))
    }

    /// A user's own calendar, ordered by start time.
    pub async fn list_slots(&self, owner_id: Ulid) -> Vec<SlotInfo> {
        let mut out = Vec::new();
        for arc in self.slot_arcs() {
            let slot = arc.read().await;
            if slot.owner_id == owner_id {
                out.push(SlotInfo::from_state(&slot));
            }
        }
        out.sort_by_key(|s| (s.start, s.id));
        out
    }

    /// The marketplace: every Swappable slot not owned by `excluding_user`,
    /// optionally narrowed to slots overlapping `window`. Read-only.
    pub async fn list_swappable(
        &self,
        excluding_user: Ulid,
        window: Option<Span>,
    ) -> Vec<SlotInfo> {
        let mut out = Vec::new();
        for arc in self.slot_arcs() {
            let slot = arc.read().await;
            if slot.status != SlotStatus::Swappable || slot.owner_id == excluding_user {
                continue;
            }
            if let Some(w) = &window {
                if !slot.span.overlaps(w) {
                    continue;
                }
            }
            out.push(SlotInfo::from_state(&slot));
        }
        out.sort_by_key(|s| (s.start, s.id));
        out
    }

    /// All requests involving the user, split by direction, each
    /// most-recent-first.
    pub async fn list_requests(&self, user_id: Ulid) -> RequestFeed {
        let mut feed = RequestFeed::default();
        for arc in self.request_arcs() {
            let req = arc.read().await;
            if req.responder_id == user_id {
                feed.incoming.push(RequestInfo::from_request(&req));
            } else if req.requester_id == user_id {
                feed.outgoing.push(RequestInfo::from_request(&req));
            }
        }
        let newest_first = |a: &RequestInfo, b: &RequestInfo| {
            (b.created_at, b.id).cmp(&(a.created_at, a.id))
        };
        feed.incoming.sort_by(newest_first);
        feed.outgoing.sort_by(newest_first);
        feed
    }
}
