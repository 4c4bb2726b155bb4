use itertools::iproduct;
use log::debug;

use crate::problem::Instance;

use super::profile::{Augment, SetupClasses, VarClass};
use super::utils::{AddVars, LpSum};
use super::{Expr, Model, Sense, Var, VarType};

/// Assembles the canonical lot-sizing model for any variable-class profile.
/// Every driver stage is a different `(SetupClasses, Augment)` pair over the
/// same constraint set.
pub struct LotSizingModel {}

impl LotSizingModel {
    pub fn build(
        instance: &Instance,
        classes: &SetupClasses,
        augment: &Augment,
    ) -> (Model, LotVars) {
        let orders = instance.orders();
        let n = orders.len();
        let periods = instance.periods();
        let groups = instance.families().len();
        let flows = instance.flows().len();
        let capacity = instance.capacity() * augment.capacity_factor;
        let bonus = augment.consecutive_setup_bonus;

        debug!(
            "building lot-sizing model: N={} T={} G={} F={} capacity={}",
            n, periods, groups, flows, capacity
        );

        let mut model = Model::new("lot_sizing");

        //*****************CREATE VARIABLES*****************//

        // Production and backorder per order and period
        let x: Vec<Vec<Var>> = (n, periods).cont(&mut model, "x");
        let b: Vec<Vec<Var>> = (n, periods).cont(&mut model, "b");

        // Inventory and downstream processing per flow and period
        let inventory: Vec<Vec<Var>> = (flows, periods).cont(&mut model, "i");
        let processing: Vec<Vec<Var>> = (flows, periods).cont(&mut model, "p");

        // Setup and carryover follow the caller's class profile
        let y: Vec<Vec<Var>> = (0..groups)
            .map(|g| {
                (0..periods)
                    .map(|t| class_var(&mut model, format!("y_{}_{}", g, t), classes.y[g][t]))
                    .collect()
            })
            .collect();
        let lambda: Vec<Vec<Var>> = (0..groups)
            .map(|g| {
                (0..periods)
                    .map(|t| {
                        class_var(&mut model, format!("l_{}_{}", g, t), classes.lambda[g][t])
                    })
                    .collect()
            })
            .collect();

        let unmet: Vec<Var> = (0..n)
            .map(|i| class_var(&mut model, format!("u_{}", i), classes.unmet))
            .collect();

        // Consecutive-setup indicators, only when the bonus is active
        let consecutive: Option<Vec<Vec<Var>>> =
            (bonus > 0.0).then(|| (groups, periods).binary(&mut model, "z"));

        //*****************OBJECTIVE*****************//

        let production_cost = iproduct!(0..n, 0..periods)
            .map(|(i, t)| orders[i].unit_cost * x[i][t])
            .lp_sum();

        let backorder_cost = (0..n)
            .flat_map(|i| (orders[i].due..periods).map(move |t| (i, t)))
            .map(|(i, t)| orders[i].backorder_penalty * b[i][t])
            .lp_sum();

        let setup_cost = iproduct!(0..groups, 0..periods)
            .map(|(g, t)| instance.families()[g].setup_cost * y[g][t])
            .lp_sum();

        let holding_cost = iproduct!(0..flows, 0..periods)
            .map(|(f, t)| instance.flows()[f].holding_cost * inventory[f][t])
            .lp_sum();

        let unmet_cost = (0..n).map(|i| orders[i].unmet_penalty * unmet[i]).lp_sum();

        let mut objective =
            production_cost + backorder_cost + setup_cost + holding_cost + unmet_cost;

        if let Some(z) = &consecutive {
            objective = objective
                - iproduct!(0..groups, 1..periods)
                    .map(|(g, t)| bonus * z[g][t])
                    .lp_sum();
        }

        model.set_objective(objective, Sense::Minimize);

        //*****************ADD CONSTRAINTS*****************//

        // every order is either produced in full or flagged unmet
        for i in 0..n {
            let produced = x[i].iter().copied().lp_sum();
            model.add_constr(
                format!("demand_{}", i),
                (produced + orders[i].demand * unmet[i]).geq(orders[i].demand),
            );
        }

        // machine capacity, production plus setup resource
        for t in 0..periods {
            let load = (0..n).map(|i| orders[i].usage * x[i][t]).lp_sum()
                + (0..groups)
                    .map(|g| instance.families()[g].setup_usage * y[g][t])
                    .lp_sum();
            model.add_constr(format!("capacity_{}", t), load.leq(capacity));
        }

        // a family may only produce under a live setup or carryover
        for (g, t) in iproduct!(0..groups, 0..periods) {
            let family_load = instance
                .orders_in_family(g)
                .map(|i| orders[i].usage * x[i][t])
                .lp_sum();
            let allowance = capacity * (y[g][t] + lambda[g][t]);
            model.add_constr(
                format!("activation_{}_{}", g, t),
                (family_load - allowance).leq(0.0),
            );
        }

        // flow balance between production, downstream processing and stock
        for (f, t) in iproduct!(0..flows, 0..periods) {
            let inflow = instance.orders_in_flow(f).map(|i| x[i][t]).lp_sum();
            let balance = if t == 0 {
                inflow - processing[f][t] - inventory[f][t]
            } else {
                inflow + inventory[f][t - 1] - processing[f][t] - inventory[f][t]
            };
            model.add_constr(format!("flow_balance_{}_{}", f, t), balance.eq(0.0));
        }

        // downstream processing limits
        for (f, t) in iproduct!(0..flows, 0..periods) {
            model.add_constr(
                format!("downstream_{}_{}", f, t),
                Expr::from(processing[f][t]).leq(instance.flows()[f].downstream_cap[t]),
            );
        }

        // no production before the release period; lateness is allowed and
        // priced through the backorder penalty
        for i in 0..n {
            for t in 0..orders[i].release {
                model.add_constr(format!("release_{}_{}", i, t), Expr::from(x[i][t]).eq(0.0));
            }
        }

        // backorder is the unfilled demand once the due date has passed
        for i in 0..n {
            for t in 0..periods {
                if t >= orders[i].due {
                    let cumulative = (0..=t).map(|tau| x[i][tau]).lp_sum();
                    model.add_constr(
                        format!("backorder_{}_{}", i, t),
                        (Expr::from(b[i][t]) + cumulative).eq(orders[i].demand),
                    );
                } else {
                    model.add_constr(
                        format!("backorder_{}_{}", i, t),
                        Expr::from(b[i][t]).eq(0.0),
                    );
                }
            }
        }

        // terminal backorder forces the unmet flag
        for i in 0..n {
            model.add_constr(
                format!("unmet_link_{}", i),
                (orders[i].demand * unmet[i] - b[i][periods - 1]).geq(0.0),
            );
        }

        // carryover structure
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

        // carryover may only extend a live setup
        for (g, t) in iproduct!(0..groups, 1..periods) {
            model.add_constr(
                format!("carry_feasible_{}_{}", g, t),
                (y[g][t - 1] + lambda[g][t - 1] - lambda[g][t]).geq(0.0),
            );
        }

        // a carrying family excludes other setups around the boundary
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

        // linearisation of the consecutive-setup indicator
        if let Some(z) = &consecutive {
            for g in 0..groups {
                if periods > 0 {
                    model.add_constr(
                        format!("consec_initial_{}", g),
                        Expr::from(z[g][0]).eq(0.0),
                    );
                }
                for t in 1..periods {
                    model.add_constr(
                        format!("consec_prev_{}_{}", g, t),
                        (z[g][t] - y[g][t - 1]).leq(0.0),
                    );
                    model.add_constr(
                        format!("consec_curr_{}_{}", g, t),
                        (z[g][t] - y[g][t]).leq(0.0),
                    );
                    model.add_constr(
                        format!("consec_both_{}_{}", g, t),
                        (y[g][t - 1] + y[g][t] - z[g][t]).leq(1.0),
                    );
                }
            }
        }

        debug!(
            "lot-sizing model built: {} variables, {} constraints",
            model.num_vars(),
            model.constrs().len()
        );

        let vars = LotVars {
            x,
            y,
            lambda,
            inventory,
            processing,
            backorder: b,
            unmet,
            consecutive,
        };

        (model, vars)
    }
}

/// The variable tensors of one assembled model.
pub struct LotVars {
    pub x: Vec<Vec<Var>>,
    pub y: Vec<Vec<Var>>,
    pub lambda: Vec<Vec<Var>>,
    pub inventory: Vec<Vec<Var>>,
    pub processing: Vec<Vec<Var>>,
    pub backorder: Vec<Vec<Var>>,
    pub unmet: Vec<Var>,
    pub consecutive: Option<Vec<Vec<Var>>>,
}

fn class_var(model: &mut Model, name: String, class: VarClass) -> Var {
    match class {
        VarClass::Fixed(value) => model.add_var(name, VarType::Continuous, value, value),
        VarClass::Integer => model.add_var(name, VarType::Integer, 0.0, 1.0),
        VarClass::Relaxed => model.add_var(name, VarType::Continuous, 0.0, 1.0),
    }
}
