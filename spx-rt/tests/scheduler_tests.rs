//! Block scheduler integration tests
//!
//! **Test Coverage:**
//! - Reminder cadence within a block
//! - Familiarization precedes the first main-trial play
//! - show_n / randomization reproducibility from the seed
//! - MainTrial budget enforcement (replays, operator retries)
//! - Block breaks and early abort

mod helpers;

use helpers::{levers, scheduler, tone_registry, trial_ids, ScriptedSubject};
use spx_common::{ExposureContext, SessionRecord};
use spx_rt::audio::VirtualPlatform;
use spx_rt::scheduler::SubjectAction;
use spx_rt::stimuli::Block;
use spx_rt::Error;
use std::collections::HashMap;

fn main_counts(sink: &spx_rt::records::MemorySink) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for p in sink.presentations() {
        if p.context == ExposureContext::MainTrial {
            *counts.entry(p.stimulus_id).or_insert(0) += 1;
        }
    }
    counts
}

fn trial_orders(sink: &spx_rt::records::MemorySink) -> Vec<Vec<String>> {
    sink.records()
        .into_iter()
        .filter_map(|r| match r {
            SessionRecord::TrialOrder { stimuli, .. } => Some(stimuli),
            _ => None,
        })
        .collect()
}

#[test]
fn test_reminders_fire_every_interval() {
    let levers = levers("reminder_interval = 15\n");
    let trials = trial_ids("s", 45);
    let mut ids = trials.clone();
    ids.push("ref".to_string());

    let mut block = Block::new("b1", trials);
    block.familiarization = vec!["ref".to_string()];
    let registry = tone_registry(&ids, vec![block]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 7);
    let mut subject = ScriptedSubject::new();
    let report = scheduler.run(&mut subject).unwrap();

    let fired: Vec<u32> = report.checkpoints.iter().map(|c| c.trial).collect();
    assert_eq!(fired, vec![15, 30, 45]);
    assert_eq!(report.trials_run, 45);

    let reminder_checkpoints: Vec<Option<u32>> = sink
        .presentations()
        .into_iter()
        .filter(|p| p.context == ExposureContext::Reminder)
        .map(|p| p.checkpoint)
        .collect();
    assert_eq!(reminder_checkpoints, vec![Some(15), Some(30), Some(45)]);
    assert_eq!(
        subject.reminders,
        vec![
            ("b1".to_string(), 15),
            ("b1".to_string(), 30),
            ("b1".to_string(), 45)
        ]
    );
}

#[test]
fn test_reminders_without_reference_pool_replay_recent_trials() {
    let levers = levers("reminder_interval = 2\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 5);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 3);
    let report = scheduler.run(&mut ScriptedSubject::new()).unwrap();

    let fired: Vec<u32> = report.checkpoints.iter().map(|c| c.trial).collect();
    assert_eq!(fired, vec![2, 4]);

    let order = trial_orders(&sink).remove(0);
    let reminded = |checkpoint: u32| -> Vec<String> {
        sink.presentations()
            .into_iter()
            .filter(|p| p.context == ExposureContext::Reminder && p.checkpoint == Some(checkpoint))
            .map(|p| p.stimulus_id)
            .collect()
    };
    assert_eq!(reminded(2), order[0..2].to_vec());
    assert_eq!(reminded(4), order[2..4].to_vec());

    // Nothing is heard as a reminder before its main trial
    let mut heard = Vec::new();
    for p in sink.presentations() {
        match p.context {
            ExposureContext::MainTrial => heard.push(p.stimulus_id),
            ExposureContext::Reminder => assert!(heard.contains(&p.stimulus_id), "{}", p.stimulus_id),
            ExposureContext::Familiarization => {}
        }
    }
}

#[test]
fn test_disabled_reminders_never_fire() {
    let levers = levers("reminder_interval = 0\n");
    let trials = trial_ids("s", 10);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 1);
    let report = scheduler.run(&mut ScriptedSubject::new()).unwrap();

    assert!(report.checkpoints.is_empty());
    assert!(sink
        .presentations()
        .iter()
        .all(|p| p.context != ExposureContext::Reminder));
}

#[test]
fn test_familiarization_plays_before_first_trial() {
    let levers = levers("familiarization_plays = 5\nreminder_interval = 0\n");
    let trials = trial_ids("s", 3);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 3);
    let mut subject = ScriptedSubject::new();
    scheduler.run(&mut subject).unwrap();

    let presentations = sink.presentations();
    let first_main = presentations
        .iter()
        .position(|p| p.context == ExposureContext::MainTrial)
        .unwrap();
    assert_eq!(first_main, 15, "3 clips x 5 plays come first");

    for id in &trials {
        let plays: Vec<u32> = presentations[..first_main]
            .iter()
            .filter(|p| &p.stimulus_id == id)
            .map(|p| p.play_number)
            .collect();
        assert_eq!(plays, vec![1, 2, 3, 4, 5]);
    }
    assert_eq!(subject.familiarizations, vec![("b1".to_string(), 3)]);
}

#[test]
fn test_show_all_presents_each_once_and_reproducibly() {
    let levers = levers("show_n = -1\nreminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 20);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let run = |seed: u64| {
        let platform = VirtualPlatform::simulated();
        let (scheduler, sink) = scheduler(&levers, &registry, &platform, seed);
        scheduler.run(&mut ScriptedSubject::new()).unwrap();
        sink
    };

    let first = run(42);
    let counts = main_counts(&first);
    assert_eq!(counts.len(), 20);
    assert!(counts.values().all(|&n| n == 1));

    let second = run(42);
    assert_eq!(trial_orders(&first), trial_orders(&second));

    let presented: Vec<String> = first
        .presentations()
        .into_iter()
        .map(|p| p.stimulus_id)
        .collect();
    assert_eq!(presented, trial_orders(&first)[0]);
}

#[test]
fn test_show_n_samples_without_replacement() {
    let levers = levers("show_n = 5\nreminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 20);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 9);
    let report = scheduler.run(&mut ScriptedSubject::new()).unwrap();

    assert_eq!(report.trials_run, 5);
    let counts = main_counts(&sink);
    assert_eq!(counts.len(), 5);
    assert!(counts.values().all(|&n| n == 1));
}

#[test]
fn test_replays_stop_at_budget() {
    let levers = levers("max_plays = 2\nreminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 4);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 5);
    let mut subject = ScriptedSubject::per_trial(vec![
        SubjectAction::Replay,
        SubjectAction::Replay,
        SubjectAction::Replay,
    ]);
    let report = scheduler.run(&mut subject).unwrap();

    let counts = main_counts(&sink);
    assert_eq!(counts.len(), 4);
    assert!(counts.values().all(|&n| n == 2), "never more than max_plays");
    assert_eq!(report.tracker.max_count(ExposureContext::MainTrial), 2);

    let responses = sink.responses();
    assert_eq!(responses.len(), 4);
    assert!(responses.iter().all(|r| r.play_count == 2));
    // Three scripted replays (the last two refused), then the answer
    assert_eq!(subject.prompts.len(), 4 * 4);
}

#[test]
fn test_operator_retry_past_budget_halts() {
    let levers = levers("max_plays = 1\nreminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 3);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 11);
    let mut subject = ScriptedSubject::with_script(vec![SubjectAction::OperatorRetry]);

    match scheduler.run(&mut subject) {
        Err(Error::BudgetViolation {
            context,
            count,
            budget,
            ..
        }) => {
            assert_eq!(context, ExposureContext::MainTrial);
            assert_eq!(count, 1);
            assert_eq!(budget, 1);
        }
        other => panic!("expected a budget violation, got {:?}", other.map(|r| r.trials_run)),
    }

    // The violating play never reached the device
    assert_eq!(sink.presentations().len(), 1);
    assert_eq!(platform.play_count(), 1);
    assert!(sink.responses().is_empty());
}

#[test]
fn test_operator_retry_within_budget_plays() {
    let levers = levers("max_plays = 2\nreminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 1);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 11);
    let mut subject = ScriptedSubject::with_script(vec![SubjectAction::OperatorRetry]);
    scheduler.run(&mut subject).unwrap();

    let plays: Vec<u32> = sink.presentations().iter().map(|p| p.play_number).collect();
    assert_eq!(plays, vec![1, 2]);
}

#[test]
fn test_every_block_runs_with_breaks_between() {
    let levers = levers("reminder_interval = 0\nfamiliarization_plays = 0\n");
    let a = trial_ids("a", 3);
    let b = trial_ids("b", 3);
    let c = trial_ids("c", 3);
    let ids: Vec<String> = a.iter().chain(&b).chain(&c).cloned().collect();
    let registry = tone_registry(
        &ids,
        vec![Block::new("a", a), Block::new("b", b), Block::new("c", c)],
    );

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 21);
    let mut subject = ScriptedSubject::new();
    let report = scheduler.run(&mut subject).unwrap();

    let mut order = report.block_order.clone();
    order.sort();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert_eq!(subject.breaks.len(), 2);
    assert_eq!(subject.breaks[0].0, report.block_order[0]);
    assert_eq!(subject.breaks[1].1, report.block_order[2]);

    // Block indexes on records follow session order
    for p in sink.presentations() {
        assert_eq!(report.block_order[p.block_index], p.block);
    }
}

#[test]
fn test_declining_a_break_aborts() {
    let levers = levers("reminder_interval = 0\nfamiliarization_plays = 0\n");
    let a = trial_ids("a", 2);
    let b = trial_ids("b", 2);
    let ids: Vec<String> = a.iter().chain(&b).cloned().collect();
    let registry = tone_registry(&ids, vec![Block::new("a", a), Block::new("b", b)]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 2);
    let mut subject = ScriptedSubject::new();
    subject.stop_at_break = Some(0);

    let result = scheduler.run(&mut subject);
    assert!(matches!(result, Err(Error::SessionAborted(_))));
    assert_eq!(sink.responses().len(), 2);
}

#[test]
fn test_subject_abort_ends_blocks() {
    let levers = levers("reminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 5);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, _sink) = scheduler(&levers, &registry, &platform, 2);
    let mut subject = ScriptedSubject::with_script(vec![SubjectAction::Abort("done".into())]);

    match scheduler.run(&mut subject) {
        Err(Error::SessionAborted(reason)) => assert_eq!(reason, "done"),
        other => panic!("expected an abort, got {:?}", other.map(|r| r.trials_run)),
    }
    assert_eq!(platform.open_streams(), 0);
}
