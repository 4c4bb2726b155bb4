use float_ord::FloatOrd;
use serde::Serialize;

use crate::model::lot_sizing::LotVars;
use crate::model::utils::ConvertVars;
use crate::model::{Assignment, Var};
use crate::problem::{Instance, EPSILON};

/// Quantity comparisons against solver output allow a little more slack
/// than the objective epsilon.
const FEASIBILITY_TOL: f64 = 1e-4;

/// The final decision tableau of a driver run.
#[derive(Debug, Clone)]
pub struct PlanSolution {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<Vec<u8>>,
    pub lambda: Vec<Vec<u8>>,
    pub inventory: Vec<Vec<f64>>,
    pub processing: Vec<Vec<f64>>,
    pub backorder: Vec<Vec<f64>>,
    pub unmet: Vec<u8>,
}

impl PlanSolution {
    /// Read the decision tableau back from an oracle assignment. Binaries
    /// go through the 0.5 threshold.
    pub fn from_assignment(vars: &LotVars, values: &Assignment) -> PlanSolution {
        let binary_grid = |grid: &[Vec<Var>]| {
            grid.iter()
                .map(|row| row.iter().map(|v| values.is_one(*v) as u8).collect())
                .collect()
        };

        PlanSolution {
            x: vars.x.convert(values),
            y: binary_grid(&vars.y),
            lambda: binary_grid(&vars.lambda),
            inventory: vars.inventory.convert(values),
            processing: vars.processing.convert(values),
            backorder: vars.backorder.convert(values),
            unmet: vars.unmet.iter().map(|v| values.is_one(*v) as u8).collect(),
        }
    }

    pub fn setup_count(&self) -> usize {
        self.y.iter().flatten().filter(|&&v| v == 1).count()
    }

    pub fn carryover_count(&self) -> usize {
        self.lambda.iter().flatten().filter(|&&v| v == 1).count()
    }
}

/// Derived per-run figures; fully determined by instance and plan.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub cost_production: f64,
    pub cost_setup: f64,
    pub cost_inventory: f64,
    pub cost_backorder: f64,
    pub cost_unmet: f64,
    pub total_setups: usize,
    pub total_carryovers: usize,
    pub saved_setup_cost: f64,
    pub unmet_count: usize,
    pub unmet_rate: f64,
    pub on_time_rate: f64,
    pub total_backorder: f64,
    pub total_demand: f64,
    pub capacity_util_by_period: Vec<f64>,
    pub capacity_util_avg: f64,
    pub capacity_util_max: f64,
}

impl Metrics {
    pub fn compute(instance: &Instance, plan: &PlanSolution) -> Metrics {
        let orders = instance.orders();
        let periods = instance.periods();

        let mut cost_production = 0.0;
        let mut cost_backorder = 0.0;
        let mut cost_unmet = 0.0;

        for (i, order) in orders.iter().enumerate() {
            for t in 0..periods {
                cost_production += order.unit_cost * plan.x[i][t];
            }
            for t in order.due..periods {
                cost_backorder += order.backorder_penalty * plan.backorder[i][t];
            }
            cost_unmet += order.unmet_penalty * plan.unmet[i] as f64;
        }

        let mut cost_setup = 0.0;
        let mut saved_setup_cost = 0.0;
        for (g, family) in instance.families().iter().enumerate() {
            for t in 0..periods {
                cost_setup += family.setup_cost * plan.y[g][t] as f64;
                if plan.lambda[g][t] == 1 {
                    saved_setup_cost += family.setup_cost;
                }
            }
        }

        let mut cost_inventory = 0.0;
        for (f, flow) in instance.flows().iter().enumerate() {
            for t in 0..periods {
                cost_inventory += flow.holding_cost * plan.inventory[f][t];
            }
        }

        let mut unmet_count = 0;
        let mut on_time_count = 0;
        let mut total_backorder = 0.0;
        for (i, order) in orders.iter().enumerate() {
            if plan.unmet[i] == 1 {
                unmet_count += 1;
            } else if plan.backorder[i][order.due] < 0.5 {
                on_time_count += 1;
            }
            total_backorder += plan.backorder[i][periods - 1];
        }

        let mut capacity_util_by_period = Vec::with_capacity(periods);
        for t in 0..periods {
            let mut usage = 0.0;
            for (i, order) in orders.iter().enumerate() {
                usage += order.usage * plan.x[i][t];
            }
            for (g, family) in instance.families().iter().enumerate() {
                usage += family.setup_usage * plan.y[g][t] as f64;
            }
            capacity_util_by_period.push(usage / instance.capacity());
        }

        let capacity_util_avg = if periods > 0 {
            capacity_util_by_period.iter().sum::<f64>() / periods as f64
        } else {
            0.0
        };
        let capacity_util_max = capacity_util_by_period
            .iter()
            .copied()
            .map(FloatOrd)
            .max()
            .map_or(0.0, |m| m.0);

        let n = orders.len();
        Metrics {
            cost_production,
            cost_setup,
            cost_inventory,
            cost_backorder,
            cost_unmet,
            total_setups: plan.setup_count(),
            total_carryovers: plan.carryover_count(),
            saved_setup_cost,
            unmet_count,
            unmet_rate: if n > 0 { unmet_count as f64 / n as f64 } else { 0.0 },
            on_time_rate: if n > 0 {
                on_time_count as f64 / n as f64
            } else {
                0.0
            },
            total_backorder,
            total_demand: instance.total_demand(),
            capacity_util_by_period,
            capacity_util_avg,
            capacity_util_max,
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.cost_production
            + self.cost_setup
            + self.cost_inventory
            + self.cost_backorder
            + self.cost_unmet
    }
}

/// Check a plan against every invariant a feasible solution must satisfy.
/// Returns a human-readable description per violation; an empty vector
/// means the plan passed.
pub fn audit(instance: &Instance, plan: &PlanSolution) -> Vec<String> {
    let mut violations = Vec::new();
    let orders = instance.orders();
    let periods = instance.periods();
    let groups = instance.families().len();
    if periods == 0 {
        return violations;
    }

    for t in 0..periods {
        let mut load = 0.0;
        for (i, order) in orders.iter().enumerate() {
            load += order.usage * plan.x[i][t];
        }
        for (g, family) in instance.families().iter().enumerate() {
            load += family.setup_usage * plan.y[g][t] as f64;
        }
        if load > instance.capacity() + FEASIBILITY_TOL {
            violations.push(format!(
                "period {}: machine load {} exceeds capacity {}",
                t,
                load,
                instance.capacity()
            ));
        }
    }

    for g in 0..groups {
        for t in 0..periods {
            let family_load: f64 = instance
                .orders_in_family(g)
                .map(|i| orders[i].usage * plan.x[i][t])
                .sum();
            if family_load > EPSILON && plan.y[g][t] == 0 && plan.lambda[g][t] == 0 {
                violations.push(format!(
                    "family {} produces {} in period {} without setup or carryover",
                    g, family_load, t
                ));
            }
        }
    }

    for t in 0..periods {
        let carried: u32 = (0..groups).map(|g| plan.lambda[g][t] as u32).sum();
        if carried > 1 {
            violations.push(format!("period {}: {} families carry simultaneously", t, carried));
        }
    }
    for g in 0..groups {
        if periods > 0 && plan.lambda[g][0] == 1 {
            violations.push(format!("family {} carries into the first period", g));
        }
        for t in 1..periods {
            if plan.lambda[g][t] == 1 && plan.y[g][t - 1] == 0 && plan.lambda[g][t - 1] == 0 {
                violations.push(format!(
                    "family {} carries into period {} without a live setup before it",
                    g, t
                ));
            }
        }
    }

    for (i, order) in orders.iter().enumerate() {
        for t in 0..order.release {
            if plan.x[i][t] > FEASIBILITY_TOL {
                violations.push(format!(
                    "order {} produces {} before its release period {}",
                    order.id, plan.x[i][t], order.release
                ));
            }
        }

        let mut cumulative = 0.0;
        for t in 0..periods {
            cumulative += plan.x[i][t];
            if t >= order.due {
                let expected = (order.demand - cumulative).max(0.0);
                if (plan.backorder[i][t] - expected).abs() > FEASIBILITY_TOL {
                    violations.push(format!(
                        "order {}: backorder {} in period {} does not match outstanding {}",
                        order.id, plan.backorder[i][t], t, expected
                    ));
                }
            }
        }

        if plan.backorder[i][periods - 1] > EPSILON && plan.unmet[i] == 0 {
            violations.push(format!(
                "order {} ends with backorder {} but is not flagged unmet",
                order.id,
                plan.backorder[i][periods - 1]
            ));
        }
    }

    for (f, _) in instance.flows().iter().enumerate() {
        let processed: f64 = plan.processing[f].iter().sum();
        let produced: f64 = instance
            .orders_in_flow(f)
            .map(|i| plan.x[i].iter().sum::<f64>())
            .sum();
        let terminal = plan.inventory[f][periods - 1];
        if (processed + terminal - produced).abs() > FEASIBILITY_TOL {
            violations.push(format!(
                "flow {}: processed {} + terminal stock {} does not balance production {}",
                f, processed, terminal, produced
            ));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Family, Flow, Order};

    fn two_period_instance() -> Instance {
        Instance::new(
            "m".into(),
            2,
            100.0,
            vec![Order {
                id: "o1".into(),
                family: 0,
                flow: 0,
                demand: 60.0,
                release: 0,
                due: 1,
                usage: 1.0,
                unit_cost: 2.0,
                backorder_penalty: 10.0,
                unmet_penalty: 1000.0,
            }],
            vec![Family {
                setup_usage: 10.0,
                setup_cost: 500.0,
            }],
            vec![Flow {
                holding_cost: 1.0,
                downstream_cap: vec![100.0, 100.0],
            }],
        )
        .unwrap()
    }

    fn feasible_plan() -> PlanSolution {
        PlanSolution {
            x: vec![vec![40.0, 20.0]],
            y: vec![vec![1, 0]],
            lambda: vec![vec![0, 1]],
            inventory: vec![vec![0.0, 0.0]],
            processing: vec![vec![40.0, 20.0]],
            backorder: vec![vec![0.0, 0.0]],
            unmet: vec![0],
        }
    }

    #[test]
    fn metrics_break_down_costs() {
        let instance = two_period_instance();
        let metrics = Metrics::compute(&instance, &feasible_plan());

        assert_eq!(metrics.cost_production, 120.0);
        assert_eq!(metrics.cost_setup, 500.0);
        assert_eq!(metrics.total_setups, 1);
        assert_eq!(metrics.total_carryovers, 1);
        assert_eq!(metrics.saved_setup_cost, 500.0);
        assert_eq!(metrics.unmet_count, 0);
        assert_eq!(metrics.on_time_rate, 1.0);
        // period 0: (40 + 10) / 100
        assert!((metrics.capacity_util_by_period[0] - 0.5).abs() < 1e-9);
        assert!((metrics.capacity_util_max - 0.5).abs() < 1e-9);
    }

    #[test]
    fn audit_accepts_a_feasible_plan() {
        let instance = two_period_instance();
        assert!(audit(&instance, &feasible_plan()).is_empty());
    }

    #[test]
    fn audit_flags_production_without_setup() {
        let instance = two_period_instance();
        let mut plan = feasible_plan();
        plan.y[0][0] = 0;

        let violations = audit(&instance, &plan);
        assert!(violations
            .iter()
            .any(|v| v.contains("without setup or carryover")));
    }

    #[test]
    fn audit_flags_unflagged_terminal_backorder() {
        let instance = two_period_instance();
        let plan = PlanSolution {
            x: vec![vec![40.0, 0.0]],
            y: vec![vec![1, 0]],
            lambda: vec![vec![0, 0]],
            inventory: vec![vec![0.0, 0.0]],
            processing: vec![vec![40.0, 0.0]],
            backorder: vec![vec![0.0, 20.0]],
            unmet: vec![0],
        };

        let violations = audit(&instance, &plan);
        assert!(violations.iter().any(|v| v.contains("not flagged unmet")));
    }
}
