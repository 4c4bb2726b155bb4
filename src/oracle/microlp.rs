use good_lp::{constraint, default_solver, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable};
use log::debug;

use crate::model::{Assignment, Cmp, Model, Sense, VarType};

use super::{Incumbent, Oracle, OracleError, SolveOutcome, SolveParams};

/// Oracle backed by `good_lp`'s pure-Rust microlp solver. Solves to proven
/// optimality, so returned incumbents always carry gap 0. The deadline,
/// thread and working-memory hints cannot be forwarded to this backend and
/// are logged away.
pub struct MicrolpOracle {}

impl MicrolpOracle {
    pub fn new() -> MicrolpOracle {
        MicrolpOracle {}
    }
}

impl Default for MicrolpOracle {
    fn default() -> Self {
        MicrolpOracle::new()
    }
}

impl Oracle for MicrolpOracle {
    fn solve(&self, model: &Model, params: &SolveParams) -> Result<SolveOutcome, OracleError> {
        if params.threads > 1 {
            debug!(
                "microlp is single-threaded, ignoring thread hint {}",
                params.threads
            );
        }
        if params.work_dir.is_some() || params.work_mem_mb.is_some() {
            debug!("microlp solves in memory, ignoring work dir/mem hints");
        }
        debug!(
            "deadline hint {:?} is not enforceable, solving to optimality",
            params.time_limit
        );

        debug!(
            "solving {} ({} vars, {} constraints)",
            model.name(),
            model.num_vars(),
            model.constrs().len()
        );

        let mut vars = variables!();
        let handles: Vec<Variable> = model
            .vars()
            .iter()
            .map(|def| {
                let mut builder = variable().min(def.lb).max(def.ub);
                if def.vtype == VarType::Integer {
                    builder = builder.integer();
                }
                vars.add(builder)
            })
            .collect();

        let to_expression = |expr: &crate::model::Expr| -> Expression {
            let mut out = Expression::from(expr.constant());
            for (var, coefficient) in expr.terms() {
                out += *coefficient * handles[var.index()];
            }
            out
        };

        let objective = to_expression(model.objective());
        let mut problem = match model.sense() {
            Sense::Minimize => vars.minimise(objective).using(default_solver),
            Sense::Maximize => vars.maximise(objective).using(default_solver),
        };

        for (_, constr) in model.constrs() {
            let lhs = to_expression(&constr.expr);
            problem = problem.with(match constr.cmp {
                Cmp::Le => constraint::leq(lhs, constr.rhs),
                Cmp::Ge => constraint::geq(lhs, constr.rhs),
                Cmp::Eq => constraint::eq(lhs, constr.rhs),
            });
        }

        match problem.solve() {
            Ok(solution) => {
                let values =
                    Assignment::new(handles.iter().map(|v| solution.value(*v)).collect());
                let objective = model.objective().eval(&values);
                Ok(SolveOutcome::Incumbent(Incumbent {
                    objective,
                    gap: 0.0,
                    proven_optimal: true,
                    values,
                }))
            }
            Err(ResolutionError::Infeasible) => Ok(SolveOutcome::NoIncumbent),
            Err(other) => Err(OracleError::Backend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expr, Model, Sense, VarType};
    use crate::model::utils::{AddVars, LpSum};

    #[test]
    fn solves_a_small_integer_program() {
        // minimize x subject to x >= 3.5, x integer in [0, 10]
        let mut model = Model::new("int");
        let x = model.add_var("x".into(), VarType::Integer, 0.0, 10.0);
        model.set_objective(Expr::from(x), Sense::Minimize);
        model.add_constr("lb".into(), Expr::from(x).geq(3.5));

        let oracle = MicrolpOracle::new();
        let outcome = oracle.solve(&model, &SolveParams::default()).unwrap();
        let incumbent = outcome.incumbent().expect("feasible");
        assert!((incumbent.objective - 4.0).abs() < 1e-6);
        assert_eq!(incumbent.gap, 0.0);
    }

    #[test]
    fn reports_infeasibility_as_no_incumbent() {
        let mut model = Model::new("infeasible");
        let x = model.add_var("x".into(), VarType::Continuous, 0.0, 1.0);
        model.set_objective(Expr::from(x), Sense::Minimize);
        model.add_constr("impossible".into(), Expr::from(x).geq(2.0));

        let oracle = MicrolpOracle::new();
        let outcome = oracle.solve(&model, &SolveParams::default()).unwrap();
        assert!(outcome.incumbent().is_none());
    }

    #[test]
    fn maximisation_with_binaries() {
        // knapsack: maximize 3a + 2b subject to 2a + b <= 2
        let mut model = Model::new("knapsack");
        let picks: Vec<_> = 2usize.binary(&mut model, "pick");
        let (a, b) = (picks[0], picks[1]);
        model.set_objective(3.0 * a + 2.0 * b, Sense::Maximize);
        model.add_constr("weight".into(), (2.0 * a + 1.0 * b).leq(2.0));

        let oracle = MicrolpOracle::new();
        let outcome = oracle.solve(&model, &SolveParams::default()).unwrap();
        let incumbent = outcome.incumbent().expect("feasible");
        assert!((incumbent.objective - 3.0).abs() < 1e-6);

        let total = picks.iter().map(|p| 1.0 * *p).lp_sum();
        assert!(total.eval(&incumbent.values) >= 1.0 - 1e-6);
    }
}
