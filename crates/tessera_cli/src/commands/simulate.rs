//! Simulate command implementation.

use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::{
    Config, EventKind, Outcome, Staged, StatsSnapshot, SystemClock, Transaction, TransactionId,
    TransactionManager,
};
use tracing::{debug, info};

/// Shortest sleep between dispatches.
const MIN_SLEEP: Duration = Duration::from_micros(200);

/// Options for one simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of staged objects.
    pub objects: usize,
    /// Commit timeout in milliseconds.
    pub timeout_ms: u64,
    /// Objects that never acknowledge.
    pub stall: Vec<usize>,
    /// Objects destroyed before the transaction commits.
    pub cancel: Vec<usize>,
    /// Delay before acknowledging, in milliseconds.
    pub ack_delay_ms: u64,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    /// Transaction ID.
    pub transaction: String,
    /// Final outcome.
    pub outcome: String,
    /// Wall time from submit to idle.
    pub elapsed_ms: f64,
    /// Final state of every object.
    pub objects: Vec<ObjectReport>,
    /// Lifecycle events in order.
    pub events: Vec<EventReport>,
    /// Manager counters.
    pub stats: StatsReport,
}

/// Final state of one object.
#[derive(Debug, Serialize)]
pub struct ObjectReport {
    /// Object name.
    pub name: String,
    /// Visible value.
    pub value: u32,
    /// Value the transaction tried to set.
    pub target: u32,
    /// Whether the object was destroyed.
    pub destroyed: bool,
}

/// One lifecycle event.
#[derive(Debug, Serialize)]
pub struct EventReport {
    /// Feed sequence number.
    pub sequence: u64,
    /// Transaction ID.
    pub transaction: String,
    /// Event description.
    pub event: String,
}

/// Manager counters.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// Submissions.
    pub submitted: u64,
    /// Merges.
    pub merged: u64,
    /// Expansion rounds.
    pub expansion_rounds: u64,
    /// Commits.
    pub committed: u64,
    /// Finished READY.
    pub ready: u64,
    /// Finished TIMED_OUT.
    pub timed_out: u64,
    /// Finished CANCELLED.
    pub cancelled: u64,
    /// Applied.
    pub applied: u64,
}

impl From<StatsSnapshot> for StatsReport {
    fn from(stats: StatsSnapshot) -> Self {
        Self {
            submitted: stats.submitted,
            merged: stats.merged,
            expansion_rounds: stats.expansion_rounds,
            committed: stats.committed,
            ready: stats.ready,
            timed_out: stats.timed_out,
            cancelled: stats.cancelled,
            applied: stats.applied,
        }
    }
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = simulate(options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Runs one simulation and returns its report.
pub fn simulate(options: &SimulateOptions) -> Result<SimulationReport, Box<dyn std::error::Error>> {
    for index in options.stall.iter().chain(&options.cancel) {
        if *index >= options.objects {
            return Err(format!(
                "object index {} out of range (0..{})",
                index, options.objects
            )
            .into());
        }
    }

    let config = Config::new().commit_timeout(Duration::from_millis(options.timeout_ms));
    let mut manager = TransactionManager::new(config, SystemClock);
    let outcome: Rc<RefCell<Option<(TransactionId, Outcome)>>> = Rc::default();
    let sink = Rc::clone(&outcome);
    manager.on_done(move |id, done| *sink.borrow_mut() = Some((id, done)));

    let objects: Vec<Staged<u32>> = (0..options.objects)
        .map(|index| Staged::new(format!("object-{index}"), 0))
        .collect();
    let target = |index: usize| u32::try_from(index + 1).unwrap_or(u32::MAX).saturating_mul(10);
    let acked = |index: usize| options.stall.contains(&index) || options.ack_delay_ms > 0;

    let mut txn = Transaction::new();
    for (index, object) in objects.iter().enumerate() {
        if acked(index) {
            txn.add_instruction(object.set_acked(target(index)))?;
        } else {
            txn.add_instruction(object.set(target(index)))?;
        }
    }

    let start = Instant::now();
    let ack_at = start + Duration::from_millis(options.ack_delay_ms);
    let mut acknowledged = options.ack_delay_ms == 0;

    let id = manager.submit(txn)?;
    info!(%id, objects = options.objects, timeout_ms = options.timeout_ms, "transaction submitted");
    for index in &options.cancel {
        debug!(index, "destroying object");
        objects[*index].destroy();
    }

    loop {
        manager.dispatch()?;
        if manager.is_idle() {
            break;
        }

        let now = Instant::now();
        if !acknowledged && now >= ack_at {
            for (index, object) in objects.iter().enumerate() {
                if !options.stall.contains(&index) {
                    object.acknowledge();
                }
            }
            acknowledged = true;
            debug!("objects acknowledged");
            continue;
        }

        let mut wake = manager.next_deadline();
        if !acknowledged {
            wake = Some(wake.map_or(ack_at, |deadline| deadline.min(ack_at)));
        }
        let wait = wake.map_or(MIN_SLEEP, |at| at.saturating_duration_since(now));
        thread::sleep(wait.max(MIN_SLEEP));
    }
    let elapsed = start.elapsed();

    let recorded = *outcome.borrow();
    let (done_id, done) = recorded.ok_or("transaction finished without an outcome")?;
    info!(id = %done_id, outcome = %done, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "transaction done");

    let events = manager
        .events()
        .poll(0, usize::MAX)
        .into_iter()
        .map(|event| EventReport {
            sequence: event.sequence,
            transaction: event.id.to_string(),
            event: describe(&event.kind),
        })
        .collect();

    Ok(SimulationReport {
        transaction: done_id.to_string(),
        outcome: done.to_string(),
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        objects: objects
            .iter()
            .enumerate()
            .map(|(index, object)| ObjectReport {
                name: object.object().to_string(),
                value: object.current(),
                target: target(index),
                destroyed: object.is_destroyed(),
            })
            .collect(),
        events,
        stats: manager.stats().into(),
    })
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::Submitted { objects } => format!("submitted ({} objects)", objects.len()),
        EventKind::Merged { objects } => format!("merged ({} objects)", objects.len()),
        EventKind::Committed => "committed".to_string(),
        EventKind::Done(outcome) => format!("done: {outcome}"),
        EventKind::Applied => "applied".to_string(),
    }
}

fn print_text_output(report: &SimulationReport) {
    println!("tessera Simulation");
    println!("==================");
    println!();
    println!("Transaction: {}", report.transaction);
    println!("Outcome:     {}", report.outcome);
    println!("Elapsed:     {:.2} ms", report.elapsed_ms);
    println!();
    println!("Objects:");
    for object in &report.objects {
        let marker = if object.destroyed { " (destroyed)" } else { "" };
        println!(
            "  {:<12} value {:>4}  target {:>4}{}",
            object.name, object.value, object.target, marker
        );
    }
    println!();
    println!("Events:");
    for event in &report.events {
        println!("  #{:<3} {} {}", event.sequence, event.transaction, event.event);
    }
    println!();
    println!("Counters:");
    println!("  committed: {}", report.stats.committed);
    println!("  ready:     {}", report.stats.ready);
    println!("  timed out: {}", report.stats.timed_out);
    println!("  cancelled: {}", report.stats.cancelled);
    println!("  applied:   {}", report.stats.applied);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(objects: usize) -> SimulateOptions {
        SimulateOptions {
            objects,
            timeout_ms: 50,
            stall: Vec::new(),
            cancel: Vec::new(),
            ack_delay_ms: 0,
        }
    }

    #[test]
    fn immediate_objects_apply() {
        let report = simulate(&options(3)).unwrap();
        assert_eq!(report.outcome, "ready");
        assert!(report.objects.iter().all(|o| o.value == o.target));
        assert_eq!(report.stats.applied, 1);
    }

    #[test]
    fn stalled_object_times_out_and_applies() {
        let report = simulate(&SimulateOptions {
            stall: vec![1],
            ..options(2)
        })
        .unwrap();
        assert_eq!(report.outcome, "timed-out");
        assert!(report.objects.iter().all(|o| o.value == o.target));
    }

    #[test]
    fn destroyed_object_cancels() {
        let report = simulate(&SimulateOptions {
            cancel: vec![0],
            ..options(2)
        })
        .unwrap();
        assert_eq!(report.outcome, "cancelled");
        assert!(report.objects.iter().all(|o| o.value == 0));
        assert!(report.objects[0].destroyed);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        assert!(simulate(&SimulateOptions {
            stall: vec![5],
            ..options(2)
        })
        .is_err());
    }
}
