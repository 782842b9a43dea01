mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

pub type SharedSlotState = Arc<RwLock<SlotState>>;
pub type SharedRequest = Arc<RwLock<SwapRequest>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        record: LedgerRecord,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<LedgerRecord>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { record, response } => {
                let mut batch = vec![(record, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { record, response }) => {
                            batch.push((record, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(LedgerRecord, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (record, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(record) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(LedgerRecord, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(super) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::LimitExceeded("slot must start before it ends"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

pub(super) fn validate_title(title: &str) -> Result<(), EngineError> {
    if title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("slot title too long"));
    }
    Ok(())
}

/// The swap coordination engine: the slot store, the request ledger, and the
/// WAL that makes every operation durable as a single record.
pub struct Engine {
    pub(super) slots: DashMap<Ulid, SharedSlotState>,
    pub(super) requests: DashMap<Ulid, SharedRequest>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Held for read by every mutation, for write by WAL compaction, so a
    /// compaction snapshot never interleaves with an in-flight operation.
    pub(super) compact_gate: RwLock<()>,
    #[cfg(test)]
    fail_appends: std::sync::atomic::AtomicBool,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> std::io::Result<Self> {
        let records = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            slots: DashMap::new(),
            requests: DashMap::new(),
            wal_tx,
            compact_gate: RwLock::new(()),
            #[cfg(test)]
            fail_appends: std::sync::atomic::AtomicBool::new(false),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because this may run inside an async context (lazy tenant creation).
        for record in &records {
            engine.replay_apply(record);
        }

        Ok(engine)
    }

    /// Apply one ledger record during startup replay.
    fn replay_apply(&self, record: &LedgerRecord) {
        match record {
            LedgerRecord::SlotCreated { id, owner_id, title, span } => {
                let slot = SlotState::new(*id, *owner_id, title.clone(), *span);
                self.slots.insert(*id, Arc::new(RwLock::new(slot)));
            }
            LedgerRecord::SlotUpdated { id, title, span } => {
                if let Some(entry) = self.slots.get(id) {
                    let mut slot = entry.try_write().expect("replay: uncontended write");
                    slot.title = title.clone();
                    slot.span = *span;
                }
            }
            LedgerRecord::SlotDeleted { id } => {
                self.slots.remove(id);
            }
            LedgerRecord::SlotOffered { id } => {
                if let Some(entry) = self.slots.get(id) {
                    let mut slot = entry.try_write().expect("replay: uncontended write");
                    slot.status = SlotStatus::Swappable;
                }
            }
            LedgerRecord::RequestOpened {
                id,
                requester_id,
                responder_id,
                requester_slot_id,
                responder_slot_id,
                created_at,
            } => {
                self.requests.insert(
                    *id,
                    Arc::new(RwLock::new(SwapRequest {
                        id: *id,
                        requester_id: *requester_id,
                        responder_id: *responder_id,
                        requester_slot_id: *requester_slot_id,
                        responder_slot_id: *responder_slot_id,
                        status: RequestStatus::Pending,
                        created_at: *created_at,
                    })),
                );
                for slot_id in [requester_slot_id, responder_slot_id] {
                    if let Some(entry) = self.slots.get(slot_id) {
                        let mut slot = entry.try_write().expect("replay: uncontended write");
                        slot.status = SlotStatus::SwapPending;
                    }
                }
            }
            LedgerRecord::RequestAccepted { id } => {
                let Some(req_entry) = self.requests.get(id) else { return };
                let mut req = req_entry.try_write().expect("replay: uncontended write");
                req.status = RequestStatus::Accepted;
                let (a, b) = (req.requester_slot_id, req.responder_slot_id);
                if let (Some(sa), Some(sb)) = (self.slots.get(&a), self.slots.get(&b)) {
                    let mut ga = sa.try_write().expect("replay: uncontended write");
                    let mut gb = sb.try_write().expect("replay: uncontended write");
                    std::mem::swap(&mut ga.owner_id, &mut gb.owner_id);
                    ga.status = SlotStatus::Busy;
                    gb.status = SlotStatus::Busy;
                }
            }
            LedgerRecord::RequestRejected { id } | LedgerRecord::RequestCancelled { id } => {
                let Some(req_entry) = self.requests.get(id) else { return };
                let mut req = req_entry.try_write().expect("replay: uncontended write");
                req.status = match record {
                    LedgerRecord::RequestRejected { .. } => RequestStatus::Rejected,
                    _ => RequestStatus::Cancelled,
                };
                for slot_id in [req.requester_slot_id, req.responder_slot_id] {
                    if let Some(entry) = self.slots.get(&slot_id) {
                        let mut slot = entry.try_write().expect("replay: uncontended write");
                        slot.status = SlotStatus::Swappable;
                    }
                }
            }
            LedgerRecord::RequestArchived { request } => {
                self.requests
                    .insert(request.id, Arc::new(RwLock::new(request.clone())));
            }
        }
    }

    /// Write a record to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, record: &LedgerRecord) -> Result<(), EngineError> {
        #[cfg(test)]
        if self.fail_appends.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(EngineError::WalError("injected append failure".into()));
        }
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                record: record.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Make every subsequent WAL append fail (or succeed again). Lets tests
    /// verify that a durability failure mid-operation leaves no partial state.
    #[cfg(test)]
    pub fn fail_wal_appends(&self, fail: bool) {
        self.fail_appends
            .store(fail, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn get_slot(&self, id: &Ulid) -> Option<SharedSlotState> {
        self.slots.get(id).map(|e| e.value().clone())
    }

    pub fn get_request(&self, id: &Ulid) -> Option<SharedRequest> {
        self.requests.get(id).map(|e| e.value().clone())
    }

    /// Lock two distinct slots for writing, acquiring in sorted id order so
    /// concurrent pair-lockers cannot deadlock. Guards are returned in the
    /// argument order.
    pub(super) async fn lock_slot_pair(
        &self,
        first: Ulid,
        second: Ulid,
    ) -> Result<
        (
            OwnedRwLockWriteGuard<SlotState>,
            OwnedRwLockWriteGuard<SlotState>,
        ),
        EngineError,
    > {
        debug_assert_ne!(first, second);
        let a = self.get_slot(&first).ok_or(EngineError::NotFound(first))?;
        let b = self.get_slot(&second).ok_or(EngineError::NotFound(second))?;
        if first < second {
            let ga = a.write_owned().await;
            let gb = b.write_owned().await;
            Ok((ga, gb))
        } else {
            let gb = b.write_owned().await;
            let ga = a.write_owned().await;
            Ok((ga, gb))
        }
    }

    /// Snapshot the current state as a minimal ledger and rewrite the WAL.
    ///
    /// Holding `compact_gate` for write excludes every mutation, so the
    /// snapshot is a consistent cut and no append can land between the
    /// snapshot and the file swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compact_gate.write().await;

        let mut records = Vec::new();

        let slot_arcs: Vec<SharedSlotState> =
            self.slots.iter().map(|e| e.value().clone()).collect();
        for arc in slot_arcs {
            let slot = arc.read().await;
            records.push(LedgerRecord::SlotCreated {
                id: slot.id,
                owner_id: slot.owner_id,
                title: slot.title.clone(),
                span: slot.span,
            });
            if slot.status == SlotStatus::Swappable {
                records.push(LedgerRecord::SlotOffered { id: slot.id });
            }
            // SwapPending is re-established by the RequestOpened below.
        }

        let request_arcs: Vec<SharedRequest> =
            self.requests.iter().map(|e| e.value().clone()).collect();
        for arc in request_arcs {
            let req = arc.read().await;
            if req.status == RequestStatus::Pending {
                records.push(LedgerRecord::RequestOpened {
                    id: req.id,
                    requester_id: req.requester_id,
                    responder_id: req.responder_id,
                    requester_slot_id: req.requester_slot_id,
                    responder_slot_id: req.responder_slot_id,
                    created_at: req.created_at,
                });
            } else {
                records.push(LedgerRecord::RequestArchived {
                    request: req.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                records,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
