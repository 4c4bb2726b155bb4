pub mod microlp;

use std::path::PathBuf;
use std::time::Duration;

use derive_more::Display;

use crate::model::{Assignment, Model};

/// Tuning handed to the backend per call. Everything here is a hint: a
/// backend that cannot honor a knob logs and ignores it.
#[derive(Clone, Debug)]
pub struct SolveParams {
    /// Wall-clock deadline for this call.
    pub time_limit: Duration,
    /// Worker threads, 0 = let the backend decide.
    pub threads: usize,
    /// Scratch directory for out-of-core solver state.
    pub work_dir: Option<PathBuf>,
    /// Working-memory ceiling in MB before the backend swaps to disk.
    pub work_mem_mb: Option<usize>,
}

impl Default for SolveParams {
    fn default() -> Self {
        SolveParams {
            time_limit: Duration::from_secs(30),
            threads: 0,
            work_dir: None,
            work_mem_mb: None,
        }
    }
}

/// A primal-feasible solution returned by the backend. `gap` is zero when
/// optimality was proven, otherwise the backend's relative MIP gap.
#[derive(Clone, Debug)]
pub struct Incumbent {
    pub objective: f64,
    pub gap: f64,
    pub proven_optimal: bool,
    pub values: Assignment,
}

/// What a solve call produced. `NoIncumbent` covers both proven
/// infeasibility and a deadline hit before any feasible point was found.
#[derive(Clone, Debug)]
pub enum SolveOutcome {
    Incumbent(Incumbent),
    NoIncumbent,
}

impl SolveOutcome {
    pub fn incumbent(&self) -> Option<&Incumbent> {
        match self {
            SolveOutcome::Incumbent(inc) => Some(inc),
            SolveOutcome::NoIncumbent => None,
        }
    }
}

#[derive(Debug, Display)]
pub enum OracleError {
    #[display(fmt = "solver backend failure: {}", _0)]
    Backend(String),
}

impl std::error::Error for OracleError {}

/// The narrow solver interface every driver is written against. The call
/// blocks until the backend returns; drivers cancel cooperatively at
/// sub-problem boundaries only.
pub trait Oracle {
    fn solve(&self, model: &Model, params: &SolveParams) -> Result<SolveOutcome, OracleError>;
}

#[cfg(test)]
pub(crate) mod stub {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::model::Assignment;

    /// What the scripted oracle should do on one call.
    pub enum Script {
        /// Return an all-zero incumbent with the given objective.
        Feasible(f64),
        Infeasible,
        Fail,
    }

    /// Replays a fixed sequence of outcomes; once the script is exhausted
    /// every further call succeeds with objective zero. Lets the driver
    /// tests steer window expansion, rollback and acceptance logic without
    /// a real solve.
    pub struct ScriptedOracle {
        script: RefCell<VecDeque<Script>>,
        pub calls: RefCell<usize>,
    }

    impl ScriptedOracle {
        pub fn new(script: Vec<Script>) -> ScriptedOracle {
            ScriptedOracle {
                script: RefCell::new(script.into()),
                calls: RefCell::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            *self.calls.borrow()
        }
    }

    impl Oracle for ScriptedOracle {
        fn solve(
            &self,
            model: &Model,
            _params: &SolveParams,
        ) -> Result<SolveOutcome, OracleError> {
            *self.calls.borrow_mut() += 1;
            let zeros = Assignment::zeros(model.num_vars());
            match self.script.borrow_mut().pop_front() {
                Some(Script::Feasible(objective)) => Ok(SolveOutcome::Incumbent(Incumbent {
                    objective,
                    gap: 0.0,
                    proven_optimal: true,
                    values: zeros,
                })),
                Some(Script::Infeasible) => Ok(SolveOutcome::NoIncumbent),
                Some(Script::Fail) => Err(OracleError::Backend("scripted failure".into())),
                None => Ok(SolveOutcome::Incumbent(Incumbent {
                    objective: 0.0,
                    gap: 0.0,
                    proven_optimal: true,
                    values: zeros,
                })),
            }
        }
    }
}
