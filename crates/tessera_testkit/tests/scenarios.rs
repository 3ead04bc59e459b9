//! End-to-end scenarios through the manager.
//!
//! Each test drives a [`TestManager`] with a manual clock: submit, advance
//! time (which dispatches), fire instruction signals, and assert on the
//! journal of instruction hooks and the `done` notifications.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;
use tessera_core::{Config, EventKind, ObjectId, Outcome, Staged, Transaction, TxnError};
use tessera_testkit::prelude::*;

fn objects(names: &[&str]) -> BTreeSet<ObjectId> {
    names.iter().copied().map(ObjectId::from).collect()
}

#[test]
fn expansion_reaches_fixed_point() {
    let journal = Journal::new();
    let mut tm = TestManager::new();

    let global_calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&global_calls);
    let global_journal = journal.clone();
    tm.on_pending(move |txn| {
        seen.set(seen.get() + 1);
        let added = match seen.get() {
            1 => Some("A"),
            3 => Some("C"),
            _ => None,
        };
        if let Some(object) = added {
            txn.add_instruction(RecordingInstruction::ready(object, &global_journal))
                .unwrap();
        }
    });

    let a_calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&a_calls);
    let a_journal = journal.clone();
    tm.registry_mut().insert("A", move |txn: &mut Transaction| {
        seen.set(seen.get() + 1);
        if seen.get() == 1 {
            txn.add_instruction(RecordingInstruction::ready("b", &a_journal))
                .unwrap();
        }
    });

    let b_calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&b_calls);
    let b_journal = journal.clone();
    tm.registry_mut().insert("b", move |txn: &mut Transaction| {
        seen.set(seen.get() + 1);
        if seen.get() == 1 {
            txn.add_instruction(RecordingInstruction::ready("X", &b_journal))
                .unwrap();
        }
    });

    let x_calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&x_calls);
    tm.registry_mut()
        .insert("X", move |_: &mut Transaction| seen.set(seen.get() + 1));

    let id = tm.submit(transaction_of(["a"], &journal)).unwrap();

    assert_eq!(global_calls.get(), 4);
    assert_eq!(b_calls.get(), 3);
    assert_eq!(x_calls.get(), 2);
    assert_eq!(
        tm.transaction(id).unwrap().objects(),
        objects(&["a", "A", "b", "C", "X"])
    );
    assert_eq!(tm.stats().expansion_rounds, 4);
    // Everything was staged exactly once despite four rounds.
    assert_eq!(journal.count(Hook::Pending), 5);
}

#[test]
fn id_is_assigned_after_the_last_round() {
    let journal = Journal::new();
    let mut tm = TestManager::new();
    let ids_seen = Rc::new(Cell::new(0));
    let seen = Rc::clone(&ids_seen);
    tm.on_pending(move |txn| {
        if txn.id().is_some() {
            seen.set(seen.get() + 1);
        }
    });

    let id = tm.submit(transaction_of(["a"], &journal)).unwrap();
    assert_eq!(ids_seen.get(), 0);
    assert_eq!(tm.transaction(id).unwrap().id(), Some(id));
}

#[test]
fn ready_just_before_timeout_wins() {
    let journal = Journal::new();
    let mut tm = TestManager::new();
    let (first, first_handle) = RecordingInstruction::held("one", &journal);
    let (second, second_handle) = RecordingInstruction::held("two", &journal);
    let mut txn = Transaction::new();
    txn.add_instruction(first).unwrap();
    txn.add_instruction(second).unwrap();

    let id = tm.submit(txn).unwrap();
    tm.advance_ms(0);
    assert_eq!(tm.in_flight_count(), 1);

    tm.advance_ms(99);
    second_handle.ready();
    tm.advance_ms(0);
    assert!(tm.done().is_empty());

    tm.advance(Duration::from_micros(500));
    first_handle.ready();
    tm.advance_ms(0);
    assert_eq!(tm.outcomes_of(id), vec![Outcome::Ready]);

    tm.advance_ms(1000);
    assert_eq!(tm.outcomes_of(id), vec![Outcome::Ready]);
    assert_eq!(journal.count(Hook::Apply), 2);
}

#[test]
fn unresponsive_instruction_times_out_and_still_applies() {
    let journal = Journal::new();
    let mut tm = TestManager::with_config(Config::new().auto_apply(false));
    let (first, _never) = RecordingInstruction::held("one", &journal);
    let (second, second_handle) = RecordingInstruction::held("two", &journal);
    let mut txn = Transaction::new();
    txn.add_instruction(first).unwrap();
    txn.add_instruction(second).unwrap();

    let id = tm.submit(txn).unwrap();
    tm.advance_ms(0);
    second_handle.ready();
    tm.advance_ms(50);
    tm.advance_ms(49);
    assert!(tm.done().is_empty());

    tm.advance_ms(1);
    assert_eq!(tm.outcomes_of(id), vec![Outcome::TimedOut]);
    assert_eq!(journal.count(Hook::Apply), 0);

    tm.apply(id).unwrap();
    assert_eq!(journal.count_for(Hook::Apply, "one"), 1);
    assert_eq!(journal.count_for(Hook::Apply, "two"), 1);

    tm.advance_ms(500);
    assert_eq!(tm.outcomes_of(id), vec![Outcome::TimedOut]);
    assert_eq!(tm.apply(id), Err(TxnError::UnknownTransaction(id)));
}

#[test]
fn cancellation_skips_apply_for_every_instruction() {
    let journal = Journal::new();
    let mut tm = TestManager::new();
    let (first, _) = RecordingInstruction::held("one", &journal);
    let doomed = RecordingInstruction::new("two", Behavior::CancelOnCommit, &journal);
    let mut txn = Transaction::new();
    txn.add_instruction(first).unwrap();
    txn.add_instruction(doomed).unwrap();

    let id = tm.submit(txn).unwrap();
    tm.advance_ms(0);

    assert_eq!(tm.outcomes_of(id), vec![Outcome::Cancelled]);
    assert_eq!(journal.count(Hook::Apply), 0);
    assert!(tm.is_idle());
    assert_eq!(tm.stats().cancelled, 1);
}

#[test]
fn late_cancel_after_commit_cancels() {
    let journal = Journal::new();
    let mut tm = TestManager::new();
    let (first, handle) = RecordingInstruction::held("one", &journal);
    let mut txn = Transaction::new();
    txn.add_instruction(first).unwrap();
    txn.add_instruction(RecordingInstruction::ready("two", &journal))
        .unwrap();

    let id = tm.submit(txn).unwrap();
    tm.advance_ms(0);
    tm.advance_ms(40);
    handle.cancel();
    tm.advance_ms(0);

    assert_eq!(tm.outcomes_of(id), vec![Outcome::Cancelled]);
    assert_eq!(journal.count(Hook::Apply), 0);
}

#[test]
fn precommit_runs_for_all_before_any_commit() {
    let journal = Journal::new();
    let mut tm = TestManager::new();
    tm.submit(transaction_of(["a", "b", "c"], &journal)).unwrap();
    tm.advance_ms(0);

    assert_eq!(
        journal.lines(),
        vec![
            "pending:a",
            "pending:b",
            "pending:c",
            "precommit:a",
            "precommit:b",
            "precommit:c",
            "commit:a",
            "commit:b",
            "commit:c",
            "apply:a",
            "apply:b",
            "apply:c",
        ]
    );
}

#[test]
fn merge_rules_hold() {
    let journal = Journal::new();
    let mut open = transaction_of(["a", "b"], &journal);
    let mut pending = transaction_of(["b", "c"], &journal);
    pending.set_pending().unwrap();

    // PENDING into NEW is rejected and the target is untouched.
    let mut fresh = Transaction::new();
    let mut staged = transaction_of(["z"], &journal);
    staged.set_pending().unwrap();
    assert!(matches!(
        fresh.merge(staged),
        Err(TxnError::MergeRejected { .. })
    ));
    assert!(fresh.is_empty());

    open.set_pending().unwrap();
    open.merge(pending).unwrap();
    assert_eq!(open.len(), 4);
    assert_eq!(open.objects(), objects(&["a", "b", "c"]));
}

#[test]
fn overlapping_submissions_never_commit_together() {
    let journal = Journal::new();
    let mut tm = TestManager::new();
    let rx = tm.subscribe();

    let (held, handle) = RecordingInstruction::held("shared", &journal);
    let mut txn = Transaction::new();
    txn.add_instruction(held).unwrap();
    let first = tm.submit(txn).unwrap();
    tm.advance_ms(0);

    let second = tm
        .submit(transaction_of(["shared", "other"], &journal))
        .unwrap();
    let third = tm.submit(transaction_of(["other"], &journal)).unwrap();
    assert_ne!(first, second);
    assert_eq!(second, third);

    tm.advance_ms(10);
    assert_eq!(journal.count_for(Hook::Commit, "other"), 0);

    handle.ready();
    tm.advance_ms(0);
    assert_eq!(journal.count_for(Hook::Commit, "other"), 2);
    assert!(tm.is_idle());

    let committed: Vec<_> = rx
        .try_iter()
        .filter(|event| event.kind == EventKind::Committed)
        .map(|event| event.id)
        .collect();
    assert_eq!(committed, vec![first, second]);
}

#[test]
fn staged_values_apply_together() {
    let mut tm = TestManager::new();
    let width = Staged::new("width", 100u32);
    let title = Staged::new("title", String::from("untitled"));

    let mut txn = Transaction::new();
    txn.add_instruction(width.set(640)).unwrap();
    txn.add_instruction(title.set_acked("editor".to_string()))
        .unwrap();
    let id = tm.submit(txn).unwrap();
    tm.advance_ms(0);

    assert_eq!(width.committed(), Some(640));
    assert_eq!(width.current(), 100);

    title.acknowledge();
    tm.advance_ms(5);
    assert_eq!(tm.outcomes_of(id), vec![Outcome::Ready]);
    assert_eq!(width.current(), 640);
    assert_eq!(title.current(), "editor");
}

#[test]
fn destroyed_object_cancels_its_transaction() {
    let mut tm = TestManager::new();
    let width = Staged::new("width", 1u32);
    let height = Staged::new("height", 1u32);

    let mut txn = Transaction::new();
    txn.add_instruction(width.set(2)).unwrap();
    txn.add_instruction(height.set_acked(2)).unwrap();
    let id = tm.submit(txn).unwrap();
    tm.advance_ms(0);

    height.destroy();
    tm.advance_ms(1);

    assert_eq!(tm.outcomes_of(id), vec![Outcome::Cancelled]);
    assert_eq!(width.current(), 1);
    assert_eq!(width.committed(), None);
    assert_eq!(height.current(), 1);
}

#[test]
fn manual_apply_keeps_object_order() {
    let mut tm = TestManager::with_config(Config::new().auto_apply(false));
    let zoom = Staged::new("zoom", 0u32);

    let mut txn = Transaction::new();
    txn.add_instruction(zoom.set(1)).unwrap();
    let first = tm.submit(txn).unwrap();
    tm.advance_ms(0);
    assert_eq!(tm.outcomes_of(first), vec![Outcome::Ready]);

    let mut txn = Transaction::new();
    txn.add_instruction(zoom.set(2)).unwrap();
    let second = tm.submit(txn).unwrap();
    tm.advance_ms(10);

    // The second change stays queued until the first one is applied.
    assert!(tm.outcomes_of(second).is_empty());
    assert_eq!(tm.scheduled_count(), 1);
    assert_eq!(zoom.committed(), Some(1));
    assert_eq!(zoom.current(), 0);

    tm.apply(first).unwrap();
    assert_eq!(zoom.current(), 1);
    assert_eq!(tm.outcomes_of(second), vec![Outcome::Ready]);
    assert_eq!(zoom.committed(), Some(2));

    tm.apply(second).unwrap();
    assert_eq!(zoom.current(), 2);
    assert!(tm.is_idle());
}
