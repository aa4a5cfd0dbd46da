//! Cross-tab synchronization over the envelope bus.

#![cfg(feature = "mocks")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::{signed_in_tab, World};
use warrant::session::{check_session, HealthIssue};
use warrant::sync::{SyncEnvelope, SyncEventKind};

#[tokio::test]
async fn test_tab_b_sees_impersonation_within_staleness_window() {
    let world = World::new();
    world.register_super_admin("root@example.com");
    let target = world.register_user("u@example.com");

    let tab_a = signed_in_tab(&world, "root@example.com").await;
    let tab_b = world.open_tab(Uuid::new_v4());
    let mut sub_b = tab_b.subscribe_sync();

    assert!(!tab_b.is_impersonating());

    tab_a
        .start_impersonation(target.id, "ticket")
        .await
        .unwrap();

    // the envelope arrives fresh, well inside the staleness window
    let envelope = sub_b.recv().await.unwrap();
    assert_eq!(envelope.event, SyncEventKind::ImpersonationStarted);
    assert!(Utc::now() - envelope.timestamp < Duration::seconds(5));

    tab_b.apply_envelope(envelope).await;
    assert!(tab_b.is_impersonating());
    assert_eq!(tab_b.current_user().unwrap().id, target.id);
}

#[tokio::test]
async fn test_sign_in_state_reaches_other_tabs() {
    let world = World::new();
    let owner = world.register_user("owner@example.com");
    let team_id = world.seed_team("acme", owner.id).await;

    let tab_b = world.open_tab(Uuid::new_v4());
    let mut sub_b = tab_b.subscribe_sync();

    let _tab_a = signed_in_tab(&world, "owner@example.com").await;

    let envelope = sub_b.recv().await.unwrap();
    assert_eq!(envelope.event, SyncEventKind::StateChanged);
    tab_b.apply_envelope(envelope).await;

    assert_eq!(tab_b.current_user().unwrap().id, owner.id);
    assert_eq!(tab_b.current_team(), Some(team_id));
}

#[tokio::test]
async fn test_own_envelopes_are_excluded() {
    let world = World::new();
    world.register_user("a@example.com");

    let tab = world.open_tab(Uuid::new_v4());
    let mut sub = tab.subscribe_sync();

    tab.sign_in("a@example.com", &common::password())
        .await
        .unwrap();

    // the tab broadcast its own sign-in; its subscription must not echo it
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_stale_envelopes_are_discarded() {
    let world = World::new();
    let tab = world.open_tab(Uuid::new_v4());
    let mut sub = tab.subscribe_sync();

    // a snapshot from long ago, as if a frozen tab woke up and replayed it
    let envelope = SyncEnvelope {
        event: SyncEventKind::StateChanged,
        state: tab.snapshot(),
        timestamp: Utc::now() - Duration::seconds(60),
        source_tab: Uuid::new_v4(),
    };
    world.bus.publish_envelope(&envelope).expect("publish");

    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_primary_election_follows_registry() {
    let world = World::new();
    let tab_a_id = Uuid::new_v4();
    let tab_b_id = Uuid::new_v4();

    let _tab_a = world.open_tab(tab_a_id);
    let _tab_b = world.open_tab(tab_b_id);

    // earliest registration wins
    assert_eq!(world.registry.elect_primary().unwrap(), Some(tab_a_id));

    let tabs = world.registry.active_tabs().unwrap();
    assert_eq!(tabs.len(), 2);
    assert_eq!(tabs[0].tab_id, tab_a_id);

    // a closed tab deregisters and the election moves on
    world.registry.deregister(tab_a_id).unwrap();
    assert_eq!(world.registry.elect_primary().unwrap(), Some(tab_b_id));
}

#[tokio::test]
async fn test_health_check_matrix() {
    let world = World::new();
    let tab = world.open_tab(Uuid::new_v4());
    let now = Utc::now();

    // empty snapshot is healthy
    assert!(check_session(&tab.snapshot(), now).is_empty());

    // role without team
    let mut state = tab.snapshot();
    state.role = Some(warrant::roles::Role::Member);
    assert_eq!(
        check_session(&state, now),
        vec![HealthIssue::RoleWithoutTeam]
    );
}

#[tokio::test]
async fn test_sign_out_clears_other_tabs() {
    let world = World::new();
    world.register_user("a@example.com");

    let tab_a = signed_in_tab(&world, "a@example.com").await;
    let tab_b = world.open_tab(Uuid::new_v4());
    let mut sub_b = tab_b.subscribe_sync();

    tab_a.sign_out().await.unwrap();

    let envelope = sub_b.recv().await.unwrap();
    assert_eq!(envelope.event, SyncEventKind::SignedOut);
    tab_b.apply_envelope(envelope).await;
    assert!(tab_b.current_user().is_none());
}
