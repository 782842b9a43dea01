//! End-to-end swap flows through the public API: TenantManager → Engine.

use std::path::PathBuf;
use std::sync::Arc;

use slotswap::model::*;
use slotswap::{EngineError, TenantManager};
use ulid::Ulid;

const H: i64 = 3_600_000;

fn test_data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("slotswap_test_flow").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn full_marketplace_lifecycle() {
    let tm = TenantManager::new(test_data_dir("lifecycle"), 10_000);
    let engine = tm.get_or_create("acme").unwrap();

    let (alice, bob) = (Ulid::new(), Ulid::new());
    let (e1, e2) = (Ulid::new(), Ulid::new());

    // Alice creates a busy slot and puts it up for trade.
    engine
        .create_slot(e1, alice, "Friday on-call".into(), Span::new(9 * H, 17 * H))
        .await
        .unwrap();
    engine.offer_slot(alice, e1).await.unwrap();

    // Bob lists his own slot and finds alice's on the marketplace.
    engine
        .create_slot(e2, bob, "Saturday on-call".into(), Span::new(33 * H, 41 * H))
        .await
        .unwrap();
    engine.offer_slot(bob, e2).await.unwrap();

    let market = engine.list_swappable(bob, None).await;
    assert_eq!(market.len(), 1);
    assert_eq!(market[0].id, e1);

    // Bob proposes his slot for alice's; both leave the marketplace.
    let req = Ulid::new();
    engine.open_request(req, bob, e2, e1).await.unwrap();
    assert!(engine.list_swappable(Ulid::new(), None).await.is_empty());

    // Alice sees the incoming offer and accepts.
    let feed = engine.list_requests(alice).await;
    assert_eq!(feed.incoming.len(), 1);
    assert_eq!(feed.incoming[0].id, req);
    engine.respond(alice, req, true).await.unwrap();

    // Ownership exchanged, both slots back to private calendars.
    let e1_info = engine.slot_info(&e1).await.unwrap();
    let e2_info = engine.slot_info(&e2).await.unwrap();
    assert_eq!(e1_info.owner_id, bob);
    assert_eq!(e2_info.owner_id, alice);
    assert_eq!(e1_info.status, SlotStatus::Busy);
    assert_eq!(e2_info.status, SlotStatus::Busy);

    assert_eq!(engine.list_slots(alice).await.len(), 1);
    assert_eq!(engine.list_slots(alice).await[0].id, e2);
    assert_eq!(engine.list_slots(bob).await[0].id, e1);
}

#[tokio::test]
async fn rejection_reopens_the_marketplace() {
    let tm = TenantManager::new(test_data_dir("rejection"), 10_000);
    let engine = tm.get_or_create("acme").unwrap();

    let (alice, bob) = (Ulid::new(), Ulid::new());
    let (e1, e2) = (Ulid::new(), Ulid::new());
    engine
        .create_slot(e1, alice, "Shift A".into(), Span::new(0, H))
        .await
        .unwrap();
    engine
        .create_slot(e2, bob, "Shift B".into(), Span::new(2 * H, 3 * H))
        .await
        .unwrap();
    engine.offer_slot(alice, e1).await.unwrap();
    engine.offer_slot(bob, e2).await.unwrap();

    let req = Ulid::new();
    engine.open_request(req, bob, e2, e1).await.unwrap();
    engine.respond(alice, req, false).await.unwrap();

    // Owners unchanged and both slots tradable again.
    let e1_info = engine.slot_info(&e1).await.unwrap();
    assert_eq!(e1_info.owner_id, alice);
    assert_eq!(e1_info.status, SlotStatus::Swappable);
    assert_eq!(engine.list_swappable(bob, None).await.len(), 1);
}

#[tokio::test]
async fn swap_storm_settles_consistently() {
    let tm = TenantManager::new(test_data_dir("storm"), 10_000);
    let engine = tm.get_or_create("acme").unwrap();

    // One coveted slot; many contenders race to lock it.
    let owner = Ulid::new();
    let coveted = Ulid::new();
    engine
        .create_slot(coveted, owner, "The good shift".into(), Span::new(0, H))
        .await
        .unwrap();
    engine.offer_slot(owner, coveted).await.unwrap();

    let n = 16;
    let mut handles = Vec::new();
    for i in 0..n {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let user = Ulid::new();
            let slot = Ulid::new();
            engine
                .create_slot(slot, user, format!("Offer {i}"), Span::new(10 * H, 11 * H))
                .await
                .unwrap();
            engine.offer_slot(user, slot).await.unwrap();
            engine.open_request(Ulid::new(), user, slot, coveted).await
        }));
    }

    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => wins += 1,
            Err(EngineError::SlotUnavailable(_)) => {}
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(
        engine.slot_info(&coveted).await.unwrap().status,
        SlotStatus::SwapPending
    );
    // Exactly one pending request targets the coveted slot.
    assert_eq!(engine.list_requests(owner).await.incoming.len(), 1);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = test_data_dir("restart");
    let (alice, bob) = (Ulid::new(), Ulid::new());
    let (e1, e2) = (Ulid::new(), Ulid::new());
    let req = Ulid::new();

    {
        let tm = TenantManager::new(dir.clone(), 10_000);
        let engine = tm.get_or_create("acme").unwrap();
        engine
            .create_slot(e1, alice, "Shift A".into(), Span::new(0, H))
            .await
            .unwrap();
        engine
            .create_slot(e2, bob, "Shift B".into(), Span::new(2 * H, 3 * H))
            .await
            .unwrap();
        engine.offer_slot(alice, e1).await.unwrap();
        engine.offer_slot(bob, e2).await.unwrap();
        engine.open_request(req, bob, e2, e1).await.unwrap();
        engine.respond(alice, req, true).await.unwrap();
    }

    // A fresh manager over the same data dir replays the tenant's ledger.
    let tm = TenantManager::new(dir, 10_000);
    let engine = tm.get_or_create("acme").unwrap();
    assert_eq!(engine.slot_info(&e1).await.unwrap().owner_id, bob);
    assert_eq!(engine.slot_info(&e2).await.unwrap().owner_id, alice);
    assert_eq!(
        engine.request_info(&req).await.unwrap().status,
        RequestStatus::Accepted
    );
}
