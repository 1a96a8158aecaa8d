//! End-to-end state machine scenarios against an in-memory store.
//!
//! Each test drives a `SyncEngine` the way a transport would: `join`, then
//! `handle_session` batches, asserting on the response items and on the
//! observable engine state (document text, shadows, revisions, mailboxes).

use folio_core::{
    EditOp, MemoryStore, Message, SessionItem, SyncAction, SyncCommand, SyncEngine,
};

fn engine() -> SyncEngine<MemoryStore> {
    SyncEngine::new(MemoryStore::new(), "/papers/test")
}

fn raw(filename: &str, revision: u64, data: &str, overwrite: bool) -> SessionItem {
    SessionItem::Command(SyncCommand {
        filename: filename.to_string(),
        revision,
        action: SyncAction::Raw {
            revision,
            data: data.to_string(),
            overwrite,
        },
    })
}

fn delta(
    filename: &str,
    revision: u64,
    delta_revision: u64,
    edits: Vec<EditOp>,
    overwrite: bool,
) -> SessionItem {
    SessionItem::Command(SyncCommand {
        filename: filename.to_string(),
        revision,
        action: SyncAction::Delta {
            revision: delta_revision,
            edits,
            overwrite,
        },
    })
}

fn message(text: &str) -> SessionItem {
    SessionItem::Message(Message {
        payload: serde_json::json!({ "text": text }),
    })
}

fn commands(items: &[SessionItem]) -> Vec<&SyncCommand> {
    items
        .iter()
        .filter_map(|item| match item {
            SessionItem::Command(cmd) => Some(cmd),
            _ => None,
        })
        .collect()
}

fn messages(items: &[SessionItem]) -> Vec<&Message> {
    items
        .iter()
        .filter_map(|item| match item {
            SessionItem::Message(m) => Some(m),
            _ => None,
        })
        .collect()
}

/// Drive the engine through scenario "join + first edit": peer A pushes
/// "hello" as a Raw snapshot with overwrite.
async fn seed_hello(engine: &mut SyncEngine<MemoryStore>) -> Vec<SessionItem> {
    engine.join("a");
    engine
        .handle_session("a", vec![raw("main.tex", 0, "hello", true)])
        .await
        .unwrap()
}

/// Continue after [`seed_hello`]: insert " world". The seed Raw carried
/// client revision 0, so this first delta is revision 0 against server
/// shadow revision 1.
async fn append_world(engine: &mut SyncEngine<MemoryStore>) -> Vec<SessionItem> {
    engine
        .handle_session(
            "a",
            vec![delta(
                "main.tex",
                1,
                0,
                vec![EditOp::Equal(5), EditOp::Insert(" world".to_string())],
                false,
            )],
        )
        .await
        .unwrap()
}

// =============================================================================
// Concrete Scenarios
// =============================================================================

#[tokio::test]
async fn test_join_and_first_edit() {
    let mut engine = engine();
    let response = seed_hello(&mut engine).await;

    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].filename, "main.tex");
    assert_eq!(cmds[0].revision, 1);
    match &cmds[0].action {
        SyncAction::Delta {
            revision,
            edits,
            overwrite,
        } => {
            assert_eq!(*revision, 0);
            assert!(edits.is_empty(), "shadow is caught up, diff must be empty");
            assert!(!overwrite);
        }
        other => panic!("expected an empty Delta, got {:?}", other),
    }
    assert_eq!(engine.document_text("main.tex"), Some("hello"));
}

#[tokio::test]
async fn test_happy_path_delta() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    let response = append_world(&mut engine).await;

    assert_eq!(engine.document_text("main.tex"), Some("hello world"));
    let view = engine.view("a", "main.tex").unwrap();
    assert_eq!(view.shadow, "hello world");
    assert_eq!(view.client_shadow_revision, 1);

    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    assert!(matches!(
        &cmds[0].action,
        SyncAction::Delta { edits, .. } if edits.is_empty()
    ));
}

/// A client whose Raw carried its own delta counter at 1 lands on client
/// shadow revision 1 and server shadow revision 1, and its next edit goes
/// out as `Delta{1, ...}`.
#[tokio::test]
async fn test_happy_path_delta_from_premise_revisions() {
    let mut engine = engine();
    engine.join("a");
    engine
        .handle_session(
            "a",
            vec![SessionItem::Command(SyncCommand {
                filename: "main.tex".to_string(),
                revision: 0,
                action: SyncAction::Raw {
                    revision: 1,
                    data: "hello".to_string(),
                    overwrite: true,
                },
            })],
        )
        .await
        .unwrap();

    let view = engine.view("a", "main.tex").unwrap();
    assert_eq!(view.client_shadow_revision, 1);
    assert_eq!(view.server_shadow_revision, 1);

    engine
        .handle_session(
            "a",
            vec![delta(
                "main.tex",
                1,
                1,
                vec![EditOp::Equal(5), EditOp::Insert(" world".to_string())],
                false,
            )],
        )
        .await
        .unwrap();

    assert_eq!(engine.document_text("main.tex"), Some("hello world"));
    let view = engine.view("a", "main.tex").unwrap();
    assert_eq!(view.shadow, "hello world");
    assert_eq!(view.client_shadow_revision, 2);
}

#[tokio::test]
async fn test_duplicate_delta_is_dropped() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    append_world(&mut engine).await;
    let replay = append_world(&mut engine).await;

    assert_eq!(engine.document_text("main.tex"), Some("hello world"));
    let cmds = commands(&replay);
    assert_eq!(cmds.len(), 1, "only the next flush's empty diff goes out");
    assert!(matches!(
        &cmds[0].action,
        SyncAction::Delta { edits, .. } if edits.is_empty()
    ));
}

#[tokio::test]
async fn test_lost_response_recovery() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    append_world(&mut engine).await;

    let (shadow, client_rev, server_rev) = {
        let view = engine.view("a", "main.tex").unwrap();
        (
            view.shadow.clone(),
            view.client_shadow_revision,
            view.server_shadow_revision,
        )
    };

    // The response to the append was lost: the client replays the same
    // command, still carrying the pre-response revision number.
    append_world(&mut engine).await;

    assert_eq!(engine.document_text("main.tex"), Some("hello world"));
    let view = engine.view("a", "main.tex").unwrap();
    assert_eq!(view.shadow, shadow);
    assert_eq!(view.client_shadow_revision, client_rev);
    assert_eq!(view.server_shadow_revision, server_rev);
}

#[tokio::test]
async fn test_lost_first_response_replays_raw() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    // Replay the initial Raw as if the first response never arrived.
    let response = engine
        .handle_session("a", vec![raw("main.tex", 0, "hello", true)])
        .await
        .unwrap();

    assert_eq!(engine.document_text("main.tex"), Some("hello"));
    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].revision, 1);
}

#[tokio::test]
async fn test_malformed_delta_triggers_raw_resync() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    append_world(&mut engine).await;

    // An edit script that cannot apply to the 11-unit shadow.
    let response = engine
        .handle_session(
            "a",
            vec![delta("main.tex", 2, 1, vec![EditOp::Equal(50)], false)],
        )
        .await
        .unwrap();

    assert_eq!(engine.document_text("main.tex"), Some("hello world"));
    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    match &cmds[0].action {
        SyncAction::Raw {
            revision,
            data,
            overwrite,
        } => {
            assert_eq!(*revision, 2);
            assert_eq!(data, "hello%20world");
            assert!(overwrite);
        }
        other => panic!("expected Raw resync, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resync_of_empty_document_is_empty_raw() {
    let mut engine = engine();
    engine.join("a");
    // Revision 5 on a fresh (empty) document: unrecoverable desync.
    let response = engine
        .handle_session("a", vec![delta("main.tex", 5, 5, vec![], false)])
        .await
        .unwrap();

    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    assert!(matches!(
        &cmds[0].action,
        SyncAction::Raw {
            data,
            overwrite: false,
            ..
        } if data.is_empty()
    ));
}

#[tokio::test]
async fn test_peer_broadcast() {
    let mut engine = engine();
    for peer in ["a", "b", "c"] {
        engine.join(peer);
    }

    let response = engine
        .handle_session("a", vec![message("hello from a")])
        .await
        .unwrap();
    assert!(response.is_empty(), "sender gets nothing back");

    for peer in ["b", "c"] {
        let response = engine.handle_session(peer, vec![]).await.unwrap();
        let received = messages(&response);
        assert_eq!(received.len(), 1, "{} should receive the message", peer);
        assert_eq!(received[0].payload["text"], "hello from a");
    }

    // Delivered exactly once.
    for peer in ["a", "b", "c"] {
        assert!(engine.handle_session(peer, vec![]).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_broadcast_delivery_is_newest_first() {
    let mut engine = engine();
    engine.join("a");
    engine.join("b");

    engine
        .handle_session("a", vec![message("one"), message("two")])
        .await
        .unwrap();

    let response = engine.handle_session("b", vec![]).await.unwrap();
    let received = messages(&response);
    assert_eq!(received[0].payload["text"], "two");
    assert_eq!(received[1].payload["text"], "one");
}

// =============================================================================
// Laws and Invariants
// =============================================================================

#[tokio::test]
async fn test_raw_convergence_law() {
    let mut engine = engine();
    engine.join("a");
    engine
        .handle_session("a", vec![raw("main.tex", 0, "draft%20one", true)])
        .await
        .unwrap();

    // Raw at the current server revision with overwrite restores all three
    // texts to the snapshot.
    let server_rev = engine.view("a", "main.tex").unwrap().server_shadow_revision;
    engine
        .handle_session(
            "a",
            vec![raw("main.tex", server_rev, "draft%20two", true)],
        )
        .await
        .unwrap();

    let view = engine.view("a", "main.tex").unwrap();
    assert_eq!(engine.document_text("main.tex"), Some("draft two"));
    assert_eq!(view.shadow, "draft two");
    assert_eq!(view.backup_shadow, "draft two");
}

#[tokio::test]
async fn test_revisions_are_monotonic() {
    let mut engine = engine();
    let mut last = (0, 0);
    seed_hello(&mut engine).await;
    for step in 0..4u64 {
        let revision = engine.view("a", "main.tex").unwrap().server_shadow_revision;
        engine
            .handle_session(
                "a",
                vec![delta(
                    "main.tex",
                    revision,
                    step,
                    vec![EditOp::Equal(5)],
                    false,
                )],
            )
            .await
            .unwrap();
        let view = engine.view("a", "main.tex").unwrap();
        let now = (view.client_shadow_revision, view.server_shadow_revision);
        assert!(now.0 >= last.0 && now.1 >= last.1, "revisions regressed");
        last = now;
    }
}

#[tokio::test]
async fn test_shadow_equals_document_after_flush() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    append_world(&mut engine).await;
    let view = engine.view("a", "main.tex").unwrap();
    assert!(view.delta_ok);
    assert_eq!(view.shadow, engine.document_text("main.tex").unwrap());
}

#[tokio::test]
async fn test_part_drops_pending_messages() {
    let mut engine = engine();
    engine.join("a");
    engine.join("b");
    engine.handle_session("a", vec![message("m")]).await.unwrap();

    engine.part("b");
    engine.join("b");
    assert!(engine.handle_session("b", vec![]).await.unwrap().is_empty());
}

// =============================================================================
// Cross-Peer Convergence
// =============================================================================

#[tokio::test]
async fn test_second_peer_bootstraps_via_delta() {
    let mut engine = engine();
    seed_hello(&mut engine).await;

    // B joins with an empty local copy and announces it without overwrite.
    engine.join("b");
    let response = engine
        .handle_session("b", vec![raw("main.tex", 0, "", false)])
        .await
        .unwrap();

    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    match &cmds[0].action {
        SyncAction::Delta { edits, .. } => {
            assert_eq!(edits, &vec![EditOp::Insert("hello".to_string())]);
        }
        other => panic!("expected bootstrap Delta, got {:?}", other),
    }
    assert_eq!(engine.view("b", "main.tex").unwrap().shadow, "hello");
}

#[tokio::test]
async fn test_edit_propagates_to_second_peer() {
    let mut engine = engine();
    seed_hello(&mut engine).await;
    engine.join("b");
    engine
        .handle_session("b", vec![raw("main.tex", 0, "", false)])
        .await
        .unwrap();

    // A appends " world"; B then checks in with a no-change delta.
    append_world(&mut engine).await;
    let response = engine
        .handle_session(
            "b",
            vec![delta("main.tex", 1, 0, vec![EditOp::Equal(5)], false)],
        )
        .await
        .unwrap();

    let cmds = commands(&response);
    assert_eq!(cmds.len(), 1);
    match &cmds[0].action {
        SyncAction::Delta { revision, edits, .. } => {
            assert_eq!(*revision, 1);
            assert_eq!(
                edits,
                &vec![EditOp::Equal(5), EditOp::Insert(" world".to_string())]
            );
        }
        other => panic!("expected propagation Delta, got {:?}", other),
    }
    assert_eq!(engine.view("b", "main.tex").unwrap().shadow, "hello world");
}

#[tokio::test]
async fn test_concurrent_edits_merge_without_overwrite() {
    let mut engine = engine();
    engine.join("a");
    engine.join("b");
    engine
        .handle_session(
            "a",
            vec![raw("main.tex", 0, "alpha%20beta%20gamma", true)],
        )
        .await
        .unwrap();
    engine
        .handle_session("b", vec![raw("main.tex", 0, "", false)])
        .await
        .unwrap();

    // A rewrites the head of the line while B appends to the tail; both
    // deltas are against shadows that agree on "alpha beta gamma".
    engine
        .handle_session(
            "a",
            vec![delta(
                "main.tex",
                1,
                0,
                vec![
                    EditOp::Delete(5),
                    EditOp::Insert("ALPHA".to_string()),
                    EditOp::Equal(11),
                ],
                false,
            )],
        )
        .await
        .unwrap();
    engine
        .handle_session(
            "b",
            vec![delta(
                "main.tex",
                1,
                0,
                vec![EditOp::Equal(16), EditOp::Insert(" delta".to_string())],
                false,
            )],
        )
        .await
        .unwrap();

    assert_eq!(
        engine.document_text("main.tex"),
        Some("ALPHA beta gamma delta")
    );
}

#[tokio::test]
async fn test_independent_files_have_independent_views() {
    let mut engine = engine();
    engine.join("a");
    engine
        .handle_session(
            "a",
            vec![
                raw("intro.tex", 0, "intro", true),
                raw("body.tex", 0, "body", true),
            ],
        )
        .await
        .unwrap();

    assert_eq!(engine.document_text("intro.tex"), Some("intro"));
    assert_eq!(engine.document_text("body.tex"), Some("body"));
    assert_eq!(engine.document_count(), 2);
    assert_eq!(
        engine.view("a", "intro.tex").unwrap().server_shadow_revision,
        1
    );
    assert_eq!(
        engine.view("a", "body.tex").unwrap().server_shadow_revision,
        1
    );
}
