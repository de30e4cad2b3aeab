// src/rl/playback.rs
//
// Session playback.
//
// Drives an environment to termination with a fixed policy (a trained table
// played greedily, or a scripted action list) and streams one SessionRecord
// per simulated second to an EventSink. Nothing here learns.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PacerError, Result};
use crate::logging::{EventSink, SessionRecord};
use crate::types::Action;

use super::learner::GreedyPolicy;
use super::sim_env::PacingEnv;

/// Aggregate of one played session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub seconds: u64,
    pub total_reward: f64,
    pub final_fatigue: f64,
    pub peak_fatigue: f64,
    /// Greedy lookups that hit an unseen state (0 for scripted sessions).
    pub lookup_misses: u64,
    pub completed: bool,
}

fn play(
    env: &mut PacingEnv,
    sink: &mut dyn EventSink,
    max_steps: Option<usize>,
    mut choose: impl FnMut(&PacingEnv, usize) -> Option<Action>,
) -> Result<SessionSummary> {
    env.reset();
    let mut total_reward = 0.0;
    let mut peak_fatigue: f64 = 0.0;
    let mut steps = 0usize;
    let mut completed = false;

    while max_steps.map_or(true, |m| steps < m) {
        let Some(action) = choose(&*env, steps) else {
            break;
        };
        let step = env.step(action);
        steps += 1;
        total_reward += step.reward;
        peak_fatigue = peak_fatigue.max(step.state.fatigue_score);
        sink.log_step(&SessionRecord {
            second: step.state.second,
            action,
            reward: step.reward,
            fatigue_score: step.state.fatigue_score,
            state: step.state,
        });
        if step.done {
            completed = true;
            break;
        }
    }
    sink.finish()?;

    Ok(SessionSummary {
        seconds: env.state().second,
        total_reward,
        final_fatigue: env.state().fatigue_score,
        peak_fatigue,
        lookup_misses: 0,
        completed,
    })
}

/// Play a trained table greedily until the workout ends.
pub fn play_greedy(
    env: &mut PacingEnv,
    policy: &mut GreedyPolicy,
    sink: &mut dyn EventSink,
) -> Result<SessionSummary> {
    let misses_before = policy.misses();
    let mut summary = play(env, sink, None, |e, _| Some(policy.act(&e.state().key())))?;
    summary.lookup_misses = policy.misses() - misses_before;
    tracing::info!(
        workout = env.plan_name(),
        seconds = summary.seconds,
        total_reward = summary.total_reward,
        lookup_misses = summary.lookup_misses,
        "greedy session finished"
    );
    Ok(summary)
}

/// Play a scripted action list; stops at the end of the script or the workout.
pub fn play_script(
    env: &mut PacingEnv,
    actions: &[Action],
    sink: &mut dyn EventSink,
) -> Result<SessionSummary> {
    play(env, sink, Some(actions.len()), |_, i| actions.get(i).copied())
}

/// Fixed demo session: 10 s holding pace, 15 s of surges (accelerate every
/// third second, slow down otherwise), 30 s holding pace.
pub fn demo_script() -> Vec<Action> {
    let mut actions = vec![Action::KeepGoing; 10];
    actions.extend((0..15).map(|i| {
        if i % 3 == 0 {
            Action::Accelerate
        } else {
            Action::SlowDown
        }
    }));
    actions.extend(std::iter::repeat(Action::KeepGoing).take(30));
    actions
}

/// Locate a trained table for an athlete / workout pair in `dir`.
///
/// Prefers `q_{athlete}_{workout}.json`; otherwise the lexicographically first
/// `q_{athlete}_{workout}_*.json` (tables written by a sweep carry a
/// hyperparameter suffix).
pub fn find_table(dir: &Path, athlete: &str, workout: &str) -> Result<PathBuf> {
    let stem = format!("q_{athlete}_{workout}");
    let exact = dir.join(format!("{stem}.json"));
    if exact.is_file() {
        return Ok(exact);
    }
    let prefix = format!("{stem}_");
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| PacerError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        PacerError::persistence(
            dir.display().to_string(),
            format!("no value table for athlete '{athlete}' and workout '{workout}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::athlete::AthleteProfile;
    use crate::logging::VecSink;
    use crate::plan::{Segment, WorkoutPlan};
    use crate::rl::learner::LookupMissPolicy;
    use crate::rl::q_table::ValueTable;
    use crate::rl::sim_env::PacingEnvConfig;
    use crate::terrain::TerrainSequence;
    use crate::types::{Phase, Zone};

    fn env(minutes: f64) -> PacingEnv {
        let plan = WorkoutPlan::new(
            "fartlek",
            minutes,
            vec![Segment::new(minutes, Phase::Push, Zone::Z3, Zone::Z3)],
        );
        let athlete = AthleteProfile::new(50.0, 180.0, 280.0, 72.0).unwrap();
        PacingEnv::new(athlete, &plan, TerrainSequence::flat(), PacingEnvConfig::deterministic())
            .unwrap()
    }

    #[test]
    fn demo_script_shape() {
        let s = demo_script();
        assert_eq!(s.len(), 55);
        assert_eq!(s[10], Action::Accelerate);
        assert_eq!(s[11], Action::SlowDown);
        assert_eq!(s[13], Action::Accelerate);
        assert_eq!(s[54], Action::KeepGoing);
    }

    #[test]
    fn script_shorter_than_workout_stops_early() {
        let mut sink = VecSink::default();
        let summary = play_script(&mut env(2.0), &demo_script(), &mut sink).unwrap();
        assert_eq!(sink.records.len(), 55);
        assert_eq!(summary.seconds, 55);
        assert!(!summary.completed);
        let sum: f64 = sink.records.iter().map(|r| r.reward).sum();
        assert!((sum - summary.total_reward).abs() < 1e-9);
    }

    #[test]
    fn greedy_session_runs_to_termination_with_misses_counted() {
        let mut sink = VecSink::default();
        let mut policy = GreedyPolicy::new(ValueTable::new(), LookupMissPolicy::KeepGoing, 0);
        let summary = play_greedy(&mut env(1.0), &mut policy, &mut sink).unwrap();
        assert!(summary.completed);
        assert_eq!(summary.seconds, 60);
        assert_eq!(summary.lookup_misses, 60);
        assert!(sink.records.iter().all(|r| r.action == Action::KeepGoing));
        assert_eq!(sink.records.last().unwrap().state.segment_index, 60);
    }

    #[test]
    fn find_table_prefers_exact_then_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_table(dir.path(), "runner", "fartlek").is_err());

        fs::write(dir.path().join("q_runner_fartlek_a10_g97_e50_m10_d980.json"), "{}").unwrap();
        fs::write(dir.path().join("q_runner_fartlek_a10_g95_e20_m10_d990.json"), "{}").unwrap();
        fs::write(dir.path().join("q_elite_fartlek_a10_g95_e20_m10_d990.json"), "{}").unwrap();
        let found = find_table(dir.path(), "runner", "fartlek").unwrap();
        assert!(found.ends_with("q_runner_fartlek_a10_g95_e20_m10_d990.json"));

        fs::write(dir.path().join("q_runner_fartlek.json"), "{}").unwrap();
        let found = find_table(dir.path(), "runner", "fartlek").unwrap();
        assert!(found.ends_with("q_runner_fartlek.json"));
    }
}
