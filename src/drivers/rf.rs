use std::time::Instant;

use log::info;

use crate::model::lot_sizing::LotSizingModel;
use crate::model::profile::{Augment, SetupClasses};
use crate::problem::Instance;
use crate::solution::PlanSolution;

use super::{read_setup, DriverContext, RunOutcome, StageReport};

/// Relax-and-Fix hyperparameters.
#[derive(Clone, Debug)]
pub struct RfConfig {
    /// W: window length.
    pub window: usize,
    /// S: how many periods each feasible window commits.
    pub step: usize,
    /// R: window expansions before the driver rolls back.
    pub max_retries: usize,
}

impl Default for RfConfig {
    fn default() -> Self {
        RfConfig {
            window: 6,
            step: 1,
            max_retries: 3,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RfStats {
    pub iterations: usize,
    pub subproblems: usize,
    pub window_expansions: usize,
    pub rollbacks: usize,
}

/// Committed setup structure plus the rollback stack of the sweep.
struct RfState {
    y_bar: Vec<Vec<u8>>,
    lambda_bar: Vec<Vec<u8>>,
    period_fixed: Vec<bool>,
    rollback_stack: Vec<(usize, usize)>,
}

impl RfState {
    fn new(groups: usize, periods: usize) -> RfState {
        RfState {
            y_bar: vec![vec![0; periods]; groups],
            lambda_bar: vec![vec![0; periods]; groups],
            period_fixed: vec![false; periods],
            rollback_stack: Vec::new(),
        }
    }

    fn commit(&mut self, from: usize, step: usize, y: &[Vec<u8>], lambda: &[Vec<u8>]) -> usize {
        let to = (from + step).min(self.period_fixed.len());
        for t in from..to {
            for g in 0..self.y_bar.len() {
                self.y_bar[g][t] = y[g][t];
                self.lambda_bar[g][t] = lambda[g][t];
            }
            self.period_fixed[t] = true;
        }
        self.rollback_stack.push((from, to));
        to
    }

    /// Undo the most recent commitment; returns its start period.
    fn rollback(&mut self) -> Option<usize> {
        let (from, to) = self.rollback_stack.pop()?;
        for t in from..to {
            for g in 0..self.y_bar.len() {
                self.y_bar[g][t] = 0;
                self.lambda_bar[g][t] = 0;
            }
            self.period_fixed[t] = false;
        }
        Some(from)
    }
}

/// Result of the RF sweep including the final all-fixed pass; shared with
/// the RFO driver, which continues from it.
pub struct RfPhase {
    pub y: Vec<Vec<u8>>,
    pub lambda: Vec<Vec<u8>>,
    pub objective: f64,
    pub gap: f64,
    pub plan: Option<PlanSolution>,
    pub stats: RfStats,
}

/// Solve SP(k, W): everything before `front` fixed, the window integer,
/// the tail relaxed. Returns the rounded setup structure on success;
/// oracle failures count as infeasible so the caller expands or rolls
/// back, exactly like a no-incumbent outcome.
fn solve_window(
    instance: &Instance,
    ctx: &mut DriverContext,
    state: &RfState,
    front: usize,
    window: usize,
    stats: &mut RfStats,
) -> Option<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    stats.subproblems += 1;
    let classes = SetupClasses::rolling(front, window, &state.y_bar, &state.lambda_bar);
    let (model, vars) = LotSizingModel::build(instance, &classes, &Augment::default());

    match ctx.solve(&model) {
        Ok(outcome) => outcome.incumbent().map(|inc| {
            ctx.log
                .line(&format!("subproblem solved, objective {:.2}", inc.objective));
            read_setup(&vars, &inc.values)
        }),
        Err(e) => {
            ctx.log.line(&format!("oracle failure in subproblem: {}", e));
            None
        }
    }
}

/// The RF sweep plus the final pass. No status markers; `solve` and the
/// RFO driver wrap this.
pub(crate) fn run_phase(instance: &Instance, cfg: &RfConfig, ctx: &mut DriverContext) -> RfPhase {
    let groups = instance.families().len();
    let periods = instance.periods();
    let mut state = RfState::new(groups, periods);
    let mut stats = RfStats::default();

    ctx.log.line(&format!(
        "relax-and-fix: W={} S={} R={}",
        cfg.window, cfg.step, cfg.max_retries
    ));

    let mut front = 0;
    let mut window = cfg.window;

    while front < periods {
        if ctx.out_of_budget() {
            ctx.log
                .line("time budget exhausted, keeping the committed prefix");
            break;
        }

        stats.iterations += 1;
        ctx.log.line(&format!(
            "iteration {}: front={} window={}",
            stats.iterations, front, window
        ));

        let mut solved = solve_window(instance, ctx, &state, front, window, &mut stats);

        if solved.is_none() {
            for retry in 0..cfg.max_retries {
                if ctx.out_of_budget() {
                    break;
                }
                window += 1;
                stats.window_expansions += 1;
                ctx.log.line(&format!(
                    "window expansion {}/{}, window={}",
                    retry + 1,
                    cfg.max_retries,
                    window
                ));
                solved = solve_window(instance, ctx, &state, front, window, &mut stats);
                if solved.is_some() {
                    break;
                }
            }
        }

        match solved {
            Some((y, lambda)) => {
                let to = state.commit(front, cfg.step, &y, &lambda);
                ctx.log.line(&format!("committed periods [{}, {})", front, to));
                front = to;
                window = cfg.window;
            }
            None if ctx.out_of_budget() => {
                ctx.log
                    .line("time budget exhausted during expansion, keeping the committed prefix");
                break;
            }
            None => {
                stats.rollbacks += 1;
                match state.rollback() {
                    Some(start) => {
                        front = start;
                        window = cfg.window + 2;
                        ctx.log.line(&format!(
                            "rollback to period {}, window reopened at {}",
                            start, window
                        ));
                    }
                    None => {
                        ctx.log
                            .line("infeasible at the root with an empty rollback stack");
                        return RfPhase {
                            y: state.y_bar,
                            lambda: state.lambda_bar,
                            objective: -1.0,
                            gap: -1.0,
                            plan: None,
                            stats,
                        };
                    }
                }
            }
        }
    }

    // final pass: every setup decision pinned, unmet back to integer
    ctx.log.line("final pass with the full setup structure fixed");
    let classes = SetupClasses::fixed_to(&state.y_bar, &state.lambda_bar);
    let (model, vars) = LotSizingModel::build(instance, &classes, &Augment::default());
    let (objective, gap, plan) = match ctx.solve(&model) {
        Ok(outcome) => match outcome.incumbent() {
            Some(inc) => (
                inc.objective,
                inc.gap,
                Some(PlanSolution::from_assignment(&vars, &inc.values)),
            ),
            None => (-1.0, -1.0, None),
        },
        Err(e) => {
            ctx.log.line(&format!("oracle failure in final pass: {}", e));
            (-1.0, -1.0, None)
        }
    };

    info!(
        "RF finished: {} iterations, {} subproblems, {} expansions, {} rollbacks, objective {}",
        stats.iterations, stats.subproblems, stats.window_expansions, stats.rollbacks, objective
    );

    RfPhase {
        y: state.y_bar,
        lambda: state.lambda_bar,
        objective,
        gap,
        plan,
        stats,
    }
}

/// The standalone RF driver.
pub fn solve(instance: &Instance, cfg: &RfConfig, ctx: &mut DriverContext) -> RunOutcome {
    let t0 = Instant::now();
    ctx.log.status("[STAGE:1:START]");

    let phase = run_phase(instance, cfg, ctx);
    let wall = t0.elapsed().as_secs_f64();

    ctx.log.status(&format!(
        "[STAGE:1:DONE:{}:{}:{}]",
        phase.objective, wall, phase.gap
    ));

    RunOutcome {
        algorithm: "RF",
        objective: phase.objective,
        gap: phase.gap,
        solve_time: wall,
        plan: phase.plan,
        stages: vec![StageReport {
            label: "RF".to_string(),
            objective: phase.objective,
            wall_time: wall,
            gap: phase.gap,
        }],
    }
}
