use itertools::iproduct;
use log::debug;

use crate::problem::Instance;

use super::utils::LpSum;
use super::{Expr, Model, Sense, Var, VarType};

/// The small recovery sub-model of the second RR stage: given a fixed setup
/// structure y*, find the carryover assignment with the most boundaries
/// covered. No production, inventory or cost terms are involved.
pub struct CarryoverModel {}

impl CarryoverModel {
    pub fn build(instance: &Instance, y_star: &[Vec<u8>]) -> (Model, CarryVars) {
        let groups = instance.families().len();
        let periods = instance.periods();

        let mut model = Model::new("carryover_recovery");

        let y: Vec<Vec<Var>> = (0..groups)
            .map(|g| {
                (0..periods)
                    .map(|t| {
                        let value = y_star[g][t] as f64;
                        model.add_var(format!("y_{}_{}", g, t), VarType::Continuous, value, value)
                    })
                    .collect()
            })
            .collect();

        let lambda: Vec<Vec<Var>> = (0..groups)
            .map(|g| {
                (0..periods)
                    .map(|t| model.add_var(format!("l_{}_{}", g, t), VarType::Integer, 0.0, 1.0))
                    .collect()
            })
            .collect();

        let total = iproduct!(0..groups, 0..periods)
            .map(|(g, t)| lambda[g][t])
            .lp_sum();
        model.set_objective(total, Sense::Maximize);

        if periods > 0 {
            for g in 0..groups {
                model.add_constr(
                    format!("carry_initial_{}", g),
                    Expr::from(lambda[g][0]).eq(0.0),
                );
            }
        }

        for t in 0..periods {
            let carried = (0..groups).map(|g| lambda[g][t]).lp_sum();
            model.add_constr(format!("carry_exclusive_{}", t), carried.leq(1.0));
        }

        // a carryover needs the setup alive on both sides of the boundary
        for (g, t) in iproduct!(0..groups, 1..periods) {
            model.add_constr(
                format!("carry_bridge_{}_{}", g, t),
                (2.0 * Expr::from(lambda[g][t]) - Expr::from(y[g][t - 1]) - Expr::from(y[g][t]))
                    .leq(0.0),
            );
        }

        for (g, t) in iproduct!(0..groups, 1..periods) {
            let other_setups = (0..groups)
                .filter(|g2| *g2 != g)
                .map(|g2| y[g2][t])
                .lp_sum();
            model.add_constr(
                format!("carry_conflict_{}_{}", g, t),
                (lambda[g][t] + lambda[g][t - 1] + y[g][t] - other_setups).leq(2.0),
            );
        }

        debug!(
            "carryover recovery model built: {} variables, {} constraints",
            model.num_vars(),
            model.constrs().len()
        );

        (model, CarryVars { y, lambda })
    }
}

pub struct CarryVars {
    pub y: Vec<Vec<Var>>,
    pub lambda: Vec<Vec<Var>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Family, Flow, Order};

    fn instance(groups: usize, periods: usize) -> Instance {
        Instance::new(
            "test".into(),
            periods,
            100.0,
            vec![Order {
                id: "o1".into(),
                family: 0,
                flow: 0,
                demand: 10.0,
                release: 0,
                due: periods - 1,
                usage: 1.0,
                unit_cost: 1.0,
                backorder_penalty: 100.0,
                unmet_penalty: 10_000.0,
            }],
            (0..groups)
                .map(|_| Family {
                    setup_usage: 5.0,
                    setup_cost: 100.0,
                })
                .collect(),
            vec![Flow {
                holding_cost: 1.0,
                downstream_cap: vec![100.0; periods],
            }],
        )
        .unwrap()
    }

    #[test]
    fn maximises_carryover_count() {
        let instance = instance(2, 4);
        let y_star = vec![vec![1u8, 1, 0, 0], vec![0u8, 0, 1, 1]];
        let (model, vars) = CarryoverModel::build(&instance, &y_star);

        assert_eq!(model.sense(), Sense::Maximize);
        assert_eq!(model.objective().terms().len(), 2 * 4);
        // y is pinned to the stage-1 structure
        let def = &model.vars()[vars.y[0][1].index()];
        assert_eq!((def.lb, def.ub), (1.0, 1.0));
    }

    #[test]
    fn bridge_constraints_span_interior_boundaries() {
        let instance = instance(2, 4);
        let y_star = vec![vec![0u8; 4]; 2];
        let (model, _) = CarryoverModel::build(&instance, &y_star);

        let bridges = model
            .constrs()
            .iter()
            .filter(|(name, _)| name.starts_with("carry_bridge"))
            .count();
        assert_eq!(bridges, 2 * 3);
    }
}
