//! Integration tests for the player, inventory and catalog services together.

use std::collections::BTreeSet;

use domain::{
    Catalog, CatalogItem, InMemoryCatalog, InMemoryGrantStore, InMemoryLedger, InventoryService,
    ItemId, Money, PlayerId, PlayerService,
};

#[tokio::test]
async fn manual_purchase_flow_keeps_ledger_and_inventory_consistent() {
    let catalog = InMemoryCatalog::with_items([CatalogItem::new(
        "sword",
        "Sword",
        Money::from_cents(400),
    )]);
    let players = PlayerService::new(InMemoryLedger::new());
    let inventory = InventoryService::new(InMemoryGrantStore::new());
    let player = PlayerId::new("player-1");
    let sword = ItemId::new("sword");

    players
        .credit(&player, Money::from_cents(1000), None)
        .await
        .unwrap();

    let prices = catalog
        .resolve_prices(&BTreeSet::from([sword.clone()]))
        .await
        .unwrap();
    let price = prices[&sword].price;

    let debit = players.debit(&player, price, None).await.unwrap();
    let grant = inventory.grant(&player, &sword, None).await.unwrap();

    assert_eq!(players.balance(&player).await.unwrap(), Money::from_cents(600));
    assert_eq!(inventory.count(&player, &sword).await.unwrap(), 1);

    // Compensate both steps and confirm the original state is restored.
    players.rollback_transaction(debit.id).await.unwrap();
    inventory.rollback_grant(grant.id).await.unwrap();

    assert_eq!(players.balance(&player).await.unwrap(), Money::from_cents(1000));
    assert!(inventory.items_for(&player).await.unwrap().is_empty());
}

#[tokio::test]
async fn sale_flow_compensates_credit_when_revoke_fails() {
    let players = PlayerService::new(InMemoryLedger::new());
    let inventory = InventoryService::new(InMemoryGrantStore::new());
    let player = PlayerId::new("player-2");
    let sword = ItemId::new("sword");

    let credit = players
        .credit(&player, Money::from_cents(400), None)
        .await
        .unwrap();
    let revoke = inventory.revoke(&player, &sword, None).await;
    assert!(revoke.is_err());

    players.rollback_transaction(credit.id).await.unwrap();
    assert_eq!(players.balance(&player).await.unwrap(), Money::zero());
}

#[tokio::test]
async fn balances_are_isolated_per_player() {
    let players = PlayerService::new(InMemoryLedger::new());
    let alice = PlayerId::new("alice");
    let bob = PlayerId::new("bob");

    players.credit(&alice, Money::from_cents(500), None).await.unwrap();
    players.credit(&bob, Money::from_cents(100), None).await.unwrap();

    assert!(players.debit(&bob, Money::from_cents(200), None).await.is_err());
    assert!(players.debit(&alice, Money::from_cents(200), None).await.is_ok());

    assert_eq!(players.balance(&alice).await.unwrap(), Money::from_cents(300));
    assert_eq!(players.balance(&bob).await.unwrap(), Money::from_cents(100));
}
