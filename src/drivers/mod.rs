pub mod rf;
pub mod rfo;
pub mod rr;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::logging::RunLog;
use crate::model::lot_sizing::LotVars;
use crate::model::{Assignment, Model};
use crate::oracle::{Oracle, OracleError, SolveOutcome, SolveParams};
use crate::solution::PlanSolution;

/// Everything a driver needs besides the instance: the oracle, the
/// per-call tuning, the total wall-clock budget and the run log. Drivers
/// run single-threaded; cancellation is cooperative at sub-problem
/// boundaries.
pub struct DriverContext<'a> {
    oracle: &'a dyn Oracle,
    pub params: SolveParams,
    pub budget: Option<Duration>,
    started: Instant,
    pub log: &'a mut RunLog,
}

impl<'a> DriverContext<'a> {
    pub fn new(
        oracle: &'a dyn Oracle,
        params: SolveParams,
        budget: Option<Duration>,
        log: &'a mut RunLog,
    ) -> DriverContext<'a> {
        DriverContext {
            oracle,
            params,
            budget,
            started: Instant::now(),
            log,
        }
    }

    /// Hand one model to the oracle, clamping the per-call time limit to
    /// whatever is left of the total budget.
    pub fn solve(&mut self, model: &Model) -> Result<SolveOutcome, OracleError> {
        let mut params = self.params.clone();
        if let Some(remaining) = self.remaining() {
            params.time_limit = params.time_limit.min(remaining);
        }
        self.oracle.solve(model, &params)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.budget.map(|b| b.saturating_sub(self.started.elapsed()))
    }

    pub fn out_of_budget(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}

/// Objective / timing / gap of one driver stage. A failed stage carries
/// objective −1 and gap −1.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub label: String,
    pub objective: f64,
    pub wall_time: f64,
    pub gap: f64,
}

impl StageReport {
    pub fn failed(label: &str, wall_time: f64) -> StageReport {
        StageReport {
            label: label.to_string(),
            objective: -1.0,
            wall_time,
            gap: -1.0,
        }
    }
}

/// What a driver run produced. `objective` is −1 when no final incumbent
/// exists; `stages` carries one report per stage (three for RR).
#[derive(Debug)]
pub struct RunOutcome {
    pub algorithm: &'static str,
    pub objective: f64,
    pub gap: f64,
    pub solve_time: f64,
    pub plan: Option<PlanSolution>,
    pub stages: Vec<StageReport>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.plan.is_some()
    }
}

/// Read the setup structure back from an assignment through the 0.5
/// threshold.
pub(crate) fn read_setup(vars: &LotVars, values: &Assignment) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
    let grid = |vs: &[Vec<crate::model::Var>]| {
        vs.iter()
            .map(|row| row.iter().map(|v| values.is_one(*v) as u8).collect())
            .collect()
    };
    (grid(&vars.y), grid(&vars.lambda))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{NullSink, RunLog};
    use crate::oracle::stub::{Script, ScriptedOracle};
    use crate::model::{Expr, Sense, VarType};

    #[test]
    fn context_clamps_time_limit_to_budget() {
        let oracle = ScriptedOracle::new(vec![Script::Feasible(1.0)]);
        let mut log = RunLog::quiet(Box::new(NullSink));
        let params = SolveParams {
            time_limit: Duration::from_secs(3600),
            ..SolveParams::default()
        };
        let mut ctx =
            DriverContext::new(&oracle, params, Some(Duration::from_millis(50)), &mut log);

        let mut model = Model::new("m");
        let x = model.add_var("x".into(), VarType::Continuous, 0.0, 1.0);
        model.set_objective(Expr::from(x), Sense::Minimize);

        assert!(ctx.solve(&model).is_ok());
        assert!(!ctx.out_of_budget() || ctx.remaining().unwrap().is_zero());
    }
}
