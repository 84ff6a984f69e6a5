use pretty_assertions::assert_eq;

use super::*;
use crate::models::MessageKind;

fn alice() -> UserId {
    UserId::from("alice")
}

fn bob() -> UserId {
    UserId::from("bob")
}

fn engine_with_page_size(page_size: usize) -> MessageSyncEngine {
    let config = SyncConfig {
        page_size,
        ..SyncConfig::default()
    };
    MessageSyncEngine::new(alice(), &config)
}

fn msg(id: &str, timestamp: i64) -> Message {
    Message::text(id, "bob", format!("message {id}"), timestamp)
}

/// Newest-first page, as delivered by the feed
fn page(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by_key(|message| std::cmp::Reverse(message.timestamp));
    messages
}

fn ids(engine: &MessageSyncEngine) -> Vec<String> {
    engine
        .timeline()
        .messages()
        .iter()
        .map(|message| message.id.to_string())
        .collect()
}

#[test]
fn empty_timeline_adopts_page_in_chronological_order() {
    let mut engine = engine_with_page_size(3);
    let outcome = engine.merge_page(page(vec![msg("1", 10), msg("2", 20), msg("3", 30)]));

    assert!(outcome.adopted);
    assert_eq!(ids(&engine), vec!["1", "2", "3"]);
    assert_eq!(
        engine.cursor(),
        &PaginationCursor {
            oldest_loaded_id: Some(MessageId::from("1")),
            has_more: true,
        }
    );
}

#[test]
fn short_initial_page_has_no_more() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10)]));
    assert!(!engine.cursor().has_more);
}

#[test]
fn new_message_is_inserted_by_timestamp() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10), msg("2", 20)]));

    let outcome = engine.merge_page(page(vec![msg("3", 15)]));

    assert_eq!(outcome.inserted, 1);
    assert_eq!(ids(&engine), vec!["1", "3", "2"]);
    let timestamps: Vec<i64> = engine
        .timeline()
        .messages()
        .iter()
        .map(|message| message.timestamp)
        .collect();
    assert_eq!(timestamps, vec![10, 15, 20]);
}

#[test]
fn live_snapshot_does_not_change_has_more() {
    let mut engine = engine_with_page_size(2);
    engine.merge_page(page(vec![msg("1", 10), msg("2", 20)]));
    assert!(engine.cursor().has_more);

    engine.merge_page(page(vec![msg("3", 30)]));
    assert!(engine.cursor().has_more);
    assert_eq!(
        engine.cursor().oldest_loaded_id,
        Some(MessageId::from("1"))
    );
}

#[test]
fn merging_same_page_twice_is_idempotent() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10), msg("2", 20)]));

    let mut edited = msg("2", 20);
    edited.content = "changed".into();
    edited.edit_count = 1;
    edited.is_edited = true;
    let snapshot = page(vec![msg("1", 10), edited, msg("3", 30)]);

    engine.merge_page(snapshot.clone());
    let once = engine.timeline().clone();
    let outcome = engine.merge_page(snapshot);

    assert_eq!(engine.timeline(), &once);
    assert!(!outcome.changed());
}

#[test]
fn peer_changes_overwrite_entry() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10)]));

    let mut from_server = msg("1", 10);
    from_server.content = "typo fixed".into();
    from_server.is_edited = true;
    from_server.edit_count = 1;
    from_server.reactions.insert(bob(), "😂".into());
    let outcome = engine.merge_page(page(vec![from_server.clone()]));

    assert_eq!(outcome.updated, 1);
    assert_eq!(engine.timeline().get(&from_server.id), Some(&from_server));
}

fn engine_with_local_edit() -> MessageSyncEngine {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![Message::text("5", "alice", "helo", 10)]));

    let id = MessageId::from("5");
    let (timeline, mutations) = engine.parts_mut();
    let message = timeline.get_mut(&id).unwrap();
    message.content = "hello".into();
    message.is_edited = true;
    message.edited_at = Some(11);
    message.edit_count = 1;
    mutations.record(
        &id,
        LocalMutation::Edit {
            content: "hello".into(),
            edit_count: 1,
        },
    );
    engine
}

#[test]
fn stale_snapshot_does_not_overwrite_local_edit() {
    let mut engine = engine_with_local_edit();
    let id = MessageId::from("5");

    let mut stale = Message::text("5", "alice", "helo", 10);
    stale.reactions.insert(bob(), "👍".into());
    let outcome = engine.merge_page(page(vec![stale]));

    let message = engine.timeline().get(&id).unwrap();
    assert_eq!(message.content, "hello");
    assert_eq!(message.edit_count, 1);
    assert_eq!(message.reaction_of(&bob()), Some("👍"));
    assert_eq!(outcome.protected, 1);
    assert!(engine.mutations().get(&id, MutationKind::Edit).is_some());
}

#[test]
fn matching_snapshot_settles_edit_record() {
    let mut engine = engine_with_local_edit();
    let id = MessageId::from("5");

    let mut confirmed = Message::text("5", "alice", "hello", 10);
    confirmed.is_edited = true;
    confirmed.edited_at = Some(12);
    confirmed.edit_count = 1;
    let outcome = engine.merge_page(page(vec![confirmed.clone()]));

    assert_eq!(outcome.settled, 1);
    assert!(engine.mutations().get(&id, MutationKind::Edit).is_none());
    assert_eq!(engine.timeline().get(&id), Some(&confirmed));
}

#[test]
fn server_deletion_wins_over_local_edit() {
    let mut engine = engine_with_local_edit();
    let id = MessageId::from("5");

    let mut deleted = Message::text("5", "alice", "This message was deleted", 10);
    deleted.is_deleted = true;
    engine.merge_page(page(vec![deleted.clone()]));

    assert_eq!(engine.timeline().get(&id), Some(&deleted));
    assert!(engine.mutations().is_empty());
}

#[test]
fn pending_reaction_survives_until_server_agrees() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10)]));

    let id = MessageId::from("1");
    let (timeline, mutations) = engine.parts_mut();
    timeline
        .get_mut(&id)
        .unwrap()
        .set_reaction(&alice(), Some("❤️"));
    mutations.record(
        &id,
        LocalMutation::React {
            emoji: Some("❤️".into()),
        },
    );

    // Server has only bob's reaction so far
    let mut server = msg("1", 10);
    server.reactions.insert(bob(), "👍".into());
    engine.merge_page(page(vec![server.clone()]));

    let message = engine.timeline().get(&id).unwrap();
    assert_eq!(message.reaction_of(&alice()), Some("❤️"));
    assert_eq!(message.reaction_of(&bob()), Some("👍"));

    server.reactions.insert(alice(), "❤️".into());
    let outcome = engine.merge_page(page(vec![server]));
    assert_eq!(outcome.settled, 1);
    assert!(engine.mutations().get(&id, MutationKind::React).is_none());
}

#[test]
fn pending_reaction_removal_is_protected() {
    let mut engine = engine_with_page_size(50);
    let mut original = msg("1", 10);
    original.reactions.insert(alice(), "👍".into());
    engine.merge_page(page(vec![original.clone()]));

    let id = MessageId::from("1");
    let (timeline, mutations) = engine.parts_mut();
    timeline.get_mut(&id).unwrap().set_reaction(&alice(), None);
    mutations.record(&id, LocalMutation::React { emoji: None });

    engine.merge_page(page(vec![original]));
    assert_eq!(engine.timeline().get(&id).unwrap().reaction_of(&alice()), None);
}

#[test]
fn provisional_send_is_superseded_by_server_copy() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10)]));

    let provisional = Message::text(MessageId::provisional(), "alice", "on my way", 1_000);
    let (timeline, mutations) = engine.parts_mut();
    mutations.track_provisional(
        provisional.id.clone(),
        ProvisionalSend::from_message(&provisional),
    );
    timeline.insert_ordered(provisional.clone());
    assert_eq!(engine.timeline().len(), 2);

    let server = Message::text("srv-2", "alice", "on my way", 1_200);
    let outcome = engine.merge_page(page(vec![msg("1", 10), server]));

    assert_eq!(outcome.superseded, 1);
    assert_eq!(ids(&engine), vec!["1", "srv-2"]);
    assert_eq!(engine.mutations().provisional_count(), 0);
}

#[test]
fn link_after_merge_drops_provisional() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(page(vec![msg("1", 10)]));

    let mut provisional = Message::text(MessageId::provisional(), "alice", "pic", 1_000);
    provisional.kind = MessageKind::Image;
    let (timeline, mutations) = engine.parts_mut();
    mutations.track_provisional(
        provisional.id.clone(),
        ProvisionalSend::from_message(&provisional),
    );
    timeline.insert_ordered(provisional.clone());

    // Server copy arrives far outside the match window
    let mut server = Message::text("srv-2", "alice", "pic", 90_000);
    server.kind = MessageKind::Image;
    engine.merge_page(page(vec![server]));
    assert_eq!(engine.timeline().len(), 3);

    engine.link_provisional(&provisional.id, MessageId::from("srv-2"));
    assert_eq!(ids(&engine), vec!["1", "srv-2"]);
}

#[test]
fn cursor_skips_provisional_entries() {
    let mut engine = engine_with_page_size(50);
    engine.merge_page(Vec::new());
    assert_eq!(engine.cursor().oldest_loaded_id, None);

    let provisional = Message::text(MessageId::provisional(), "alice", "first!", 5);
    let (timeline, mutations) = engine.parts_mut();
    mutations.track_provisional(
        provisional.id.clone(),
        ProvisionalSend::from_message(&provisional),
    );
    timeline.insert_ordered(provisional);

    engine.merge_page(page(vec![msg("9", 90)]));
    assert_eq!(
        engine.cursor().oldest_loaded_id,
        Some(MessageId::from("9"))
    );
}

#[test]
fn prepend_older_updates_cursor_and_has_more() {
    let mut engine = engine_with_page_size(2);
    engine.merge_page(page(vec![msg("3", 30), msg("4", 40)]));

    let added = engine.prepend_older(page(vec![msg("1", 10), msg("2", 20)]));
    assert_eq!(added, 2);
    assert!(engine.cursor().has_more);
    assert_eq!(ids(&engine), vec!["1", "2", "3", "4"]);

    let added = engine.prepend_older(page(vec![msg("0", 5)]));
    assert_eq!(added, 1);
    assert!(!engine.cursor().has_more);
    assert_eq!(
        engine.cursor().oldest_loaded_id,
        Some(MessageId::from("0"))
    );
}

#[test]
fn timeline_stays_ordered_across_mixed_merges() {
    let mut engine = engine_with_page_size(4);
    // Deterministic pseudo-random timestamps, including skewed ones
    let mut seed: i64 = 7;
    let mut next = || {
        seed = (seed * 1_103_515_245 + 12_345) % 2_147_483_648;
        seed % 1_000
    };

    for round in 0..20 {
        let batch: Vec<Message> = (0..3)
            .map(|i| msg(&format!("{round}-{i}"), next()))
            .collect();
        if round % 5 == 4 {
            engine.prepend_older(page(batch));
        } else {
            engine.merge_page(page(batch));
        }
        assert!(engine.timeline().is_consistent(), "round {round}");
    }
    assert_eq!(engine.timeline().len(), 60);
}
