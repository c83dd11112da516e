use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::time::Instant;

use super::*;
use crate::testing::{Journal, ScriptedCommand};

const WINDOW: Duration = Duration::from_millis(500);

fn store(max: usize) -> HistoryStore {
    HistoryStore::new(NonZeroUsize::new(max).unwrap())
}

fn cmd(label: &str, journal: &Journal) -> Box<dyn Command> {
    Box::new(ScriptedCommand::new(label, journal))
}

/// Take the candidate, stage and commit, as the manager does.
fn commit(s: &mut HistoryStore, command: Box<dyn Command>, at: Instant) -> Commit {
    let mut candidate = s.take_merge_candidate(at, WINDOW);
    let staged = stage(candidate.as_mut(), command, at);
    s.commit(candidate, staged)
}

fn descriptions(infos: &[EntryInfo]) -> Vec<&str> {
    infos.iter().map(|i| i.description.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_commit_and_cursor_moves() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();

    commit(&mut s, cmd("a", &journal), now);
    commit(&mut s, cmd("b", &journal), now);
    assert_eq!(s.undo_len(), 2);
    assert_eq!(s.redo_len(), 0);

    let b = s.checkout_undo().unwrap();
    assert_eq!(b.description(), "b");
    s.return_to_redo(b);
    assert_eq!(s.undo_len(), 1);
    assert_eq!(s.redo_len(), 1);
    assert_eq!(s.next_redo().unwrap().description(), "b");

    let b = s.checkout_redo().unwrap();
    s.return_to_undo(b);
    assert_eq!(s.top().unwrap().description(), "b");
    assert!(!s.can_redo());
}

#[tokio::test(start_paused = true)]
async fn test_failed_step_restores_original_position() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    commit(&mut s, cmd("a", &journal), now);
    commit(&mut s, cmd("b", &journal), now);
    commit(&mut s, cmd("c", &journal), now);

    let before = descriptions(&s.undo_snapshot(None))
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();

    let c = s.checkout_undo().unwrap();
    s.return_to_undo(c);
    assert_eq!(descriptions(&s.undo_snapshot(None)), before);

    let c = s.checkout_undo().unwrap();
    s.return_to_redo(c);
    let c = s.checkout_redo().unwrap();
    s.return_to_redo(c);
    assert_eq!(descriptions(&s.redo_snapshot()), vec!["c"]);
}

#[tokio::test(start_paused = true)]
async fn test_commit_discards_redo_stack() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    commit(&mut s, cmd("x", &journal), now);
    commit(&mut s, cmd("y", &journal), now);
    let y = s.checkout_undo().unwrap();
    s.return_to_redo(y);

    let result = commit(&mut s, cmd("z", &journal), now);
    assert_eq!(result.discarded_redo, 1);
    assert!(!s.can_redo());
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["z", "x"]);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_evicts_oldest() {
    let journal = Journal::new();
    let mut s = store(3);
    let now = Instant::now();
    let mut evicted = 0;
    for label in ["a", "b", "c", "d", "e"] {
        evicted += commit(&mut s, cmd(label, &journal), now).evicted;
    }
    assert_eq!(evicted, 2);
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["e", "d", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_shrinking_limit_evicts_and_redo_respects_it() {
    let journal = Journal::new();
    let mut s = store(5);
    let now = Instant::now();
    for label in ["a", "b", "c", "d"] {
        commit(&mut s, cmd(label, &journal), now);
    }
    let d = s.checkout_undo().unwrap();
    s.return_to_redo(d);

    assert_eq!(s.set_max_size(NonZeroUsize::new(2).unwrap()), 1);
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["c", "b"]);
    assert_eq!(s.redo_len(), 1);

    let d = s.checkout_redo().unwrap();
    assert_eq!(s.return_to_undo(d), 1);
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["d", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_merge_within_window() {
    let journal = Journal::new();
    let mut s = store(10);
    let start = Instant::now();

    let first = commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        start,
    );
    let second = commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        start + Duration::from_millis(400),
    );
    assert!(!first.merged);
    assert!(second.merged);
    assert_eq!(second.entry.id, first.entry.id);
    assert_eq!(s.undo_len(), 1);

    // The window restarts from the last merge.
    let third = commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        start + Duration::from_millis(800),
    );
    assert!(third.merged);
    assert_eq!(third.entry.merge_count, 3);

    let late = commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        start + Duration::from_millis(1400),
    );
    assert!(!late.merged);
    assert_eq!(s.undo_len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_merge_into_redone_entry_after_undo() {
    let journal = Journal::new();
    let mut s = store(10);
    let start = Instant::now();
    commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        start,
    );
    let top = s.checkout_undo().unwrap();
    s.return_to_redo(top);

    let result = commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        start,
    );
    assert!(!result.merged);
    assert_eq!(result.discarded_redo, 1);
}

#[tokio::test(start_paused = true)]
async fn test_declined_candidate_stays_below_new_entry() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move a", &journal).mergeable("card-a")),
        now,
    );

    let result = commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move b", &journal).mergeable("card-b")),
        now,
    );

    assert!(!result.merged);
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["Move b", "Move a"]);
}

#[tokio::test(start_paused = true)]
async fn test_unstaged_candidate_returns_without_touching_redo() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        now,
    );
    commit(&mut s, cmd("Rename", &journal), now);
    let rename = s.checkout_undo().unwrap();
    s.return_to_redo(rename);

    let candidate = s.take_merge_candidate(now, WINDOW).unwrap();
    assert_eq!(s.undo_len(), 0);
    assert_eq!(s.redo_len(), 1);

    s.return_to_undo(candidate);
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["Move"]);
    assert_eq!(descriptions(&s.redo_snapshot()), vec!["Rename"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_candidate_outside_window() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    commit(
        &mut s,
        Box::new(ScriptedCommand::new("Move", &journal).mergeable("card")),
        now,
    );

    assert!(s
        .take_merge_candidate(now + Duration::from_millis(501), WINDOW)
        .is_none());
    assert_eq!(s.undo_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_locate_positions() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    let ids: Vec<EntryId> = ["a", "b", "c", "d"]
        .iter()
        .map(|l| commit(&mut s, cmd(l, &journal), now).entry.id)
        .collect();
    for _ in 0..2 {
        let e = s.checkout_undo().unwrap();
        s.return_to_redo(e);
    }

    assert_eq!(s.locate(ids[1]), Some(Position::Undo { depth: 0 }));
    assert_eq!(s.locate(ids[0]), Some(Position::Undo { depth: 1 }));
    assert_eq!(s.locate(ids[2]), Some(Position::Redo { index: 0 }));
    assert_eq!(s.locate(ids[3]), Some(Position::Redo { index: 1 }));
    assert_eq!(s.locate(EntryId::new()), None);
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_and_limit() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    for label in ["a", "b", "c", "d"] {
        commit(&mut s, cmd(label, &journal), now);
    }
    for _ in 0..2 {
        let e = s.checkout_undo().unwrap();
        s.return_to_redo(e);
    }

    assert_eq!(descriptions(&s.undo_snapshot(Some(1))), vec!["b"]);
    assert_eq!(descriptions(&s.undo_snapshot(None)), vec!["b", "a"]);
    assert_eq!(descriptions(&s.redo_snapshot()), vec!["c", "d"]);
}

#[tokio::test(start_paused = true)]
async fn test_clear() {
    let journal = Journal::new();
    let mut s = store(10);
    let now = Instant::now();
    commit(&mut s, cmd("a", &journal), now);
    commit(&mut s, cmd("b", &journal), now);
    let b = s.checkout_undo().unwrap();
    s.return_to_redo(b);

    assert_eq!(s.clear(), 2);
    assert!(!s.can_undo());
    assert!(!s.can_redo());
    assert!(s.checkout_undo().is_none());
    assert!(s.checkout_redo().is_none());
}
