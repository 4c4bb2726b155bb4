use std::collections::BTreeMap;

use float_ord::FloatOrd;
use log::info;

use crate::problem::{Family, Flow, Instance, Order, OrderIndex};
use crate::solution::PlanSolution;

/// One composite order produced by the merge: which original orders it
/// absorbed and which of them is the primary (largest demand).
#[derive(Debug, Clone)]
pub struct Composite {
    pub members: Vec<OrderIndex>,
    pub primary: OrderIndex,
    pub family: usize,
    pub flow: usize,
}

/// The projection map from a merged instance back to the original one.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub composites: Vec<Composite>,
}

impl MergePlan {
    pub fn merged_count(&self) -> usize {
        self.composites.len()
    }
}

/// Merge orders sharing (flow, family) into composite "big orders". The
/// bucketing threshold caps a composite's demand: a bucket is closed once
/// adding the next order would push it past the threshold (an oversized
/// single order still gets its own bucket). The composite inherits the
/// union window, the summed demand, the demand-weighted unit cost and
/// penalties, and the maximum per-unit resource usage. Downstream
/// capacity rows are rebuilt by spreading each composite's demand
/// uniformly over its window.
pub fn merge(instance: &Instance, threshold: f64) -> (Instance, MergePlan) {
    let orders = instance.orders();

    let mut groups: BTreeMap<(usize, usize), Vec<OrderIndex>> = BTreeMap::new();
    for (i, order) in orders.iter().enumerate() {
        groups.entry((order.flow, order.family)).or_default().push(i);
    }

    let mut composites = Vec::new();
    let mut merged_orders = Vec::new();

    for ((flow, family), members) in groups {
        let mut bucket: Vec<OrderIndex> = Vec::new();
        let mut bucket_demand = 0.0;

        let flush = |bucket: &mut Vec<OrderIndex>,
                         composites: &mut Vec<Composite>,
                         merged_orders: &mut Vec<Order>| {
            if bucket.is_empty() {
                return;
            }
            let members = std::mem::take(bucket);
            let demand: f64 = members.iter().map(|&i| orders[i].demand).sum();
            let release = members.iter().map(|&i| orders[i].release).min().unwrap_or(0);
            let due = members.iter().map(|&i| orders[i].due).max().unwrap_or(0);
            let usage = members
                .iter()
                .map(|&i| FloatOrd(orders[i].usage))
                .max()
                .map_or(0.0, |m| m.0);
            let weighted = |f: fn(&Order) -> f64| {
                members
                    .iter()
                    .map(|&i| f(&orders[i]) * orders[i].demand)
                    .sum::<f64>()
                    / demand
            };
            let primary = members
                .iter()
                .copied()
                .max_by_key(|&i| FloatOrd(orders[i].demand))
                .unwrap_or(members[0]);

            merged_orders.push(Order {
                id: format!("big_{}", composites.len()),
                family,
                flow,
                demand,
                release,
                due,
                usage,
                unit_cost: weighted(|o| o.unit_cost),
                backorder_penalty: weighted(|o| o.backorder_penalty),
                unmet_penalty: weighted(|o| o.unmet_penalty),
            });
            composites.push(Composite {
                members,
                primary,
                family,
                flow,
            });
        };

        for i in members {
            if !bucket.is_empty() && bucket_demand + orders[i].demand > threshold {
                flush(&mut bucket, &mut composites, &mut merged_orders);
                bucket_demand = 0.0;
            }
            bucket_demand += orders[i].demand;
            bucket.push(i);
        }
        flush(&mut bucket, &mut composites, &mut merged_orders);
    }

    // downstream capacity shaped by where the composites want to flow
    let periods = instance.periods();
    let mut downstream = vec![vec![0.0; periods]; instance.flows().len()];
    for order in &merged_orders {
        let span = (order.due - order.release + 1) as f64;
        let per_period = order.demand / span;
        for t in order.release..=order.due {
            downstream[order.flow][t] += per_period;
        }
    }

    let flows: Vec<Flow> = instance
        .flows()
        .iter()
        .zip(downstream)
        .map(|(flow, caps)| Flow {
            holding_cost: flow.holding_cost,
            downstream_cap: caps,
        })
        .collect();

    let families: Vec<Family> = instance.families().to_vec();

    let merged = Instance::new(
        instance.case_id().to_string(),
        periods,
        instance.capacity(),
        merged_orders,
        families,
        flows,
    )
    .expect("merged instance is built from a validated instance");

    info!(
        "merged {} orders into {} composites",
        orders.len(),
        composites.len()
    );

    (merged, MergePlan { composites })
}

/// Per-original-order projection of a merged-level plan.
#[derive(Debug, Clone)]
pub struct SplitSolution {
    pub x: Vec<Vec<f64>>,
    pub backorder: Vec<Vec<f64>>,
    pub setup: Vec<Vec<u8>>,
    pub carryover: Vec<Vec<u8>>,
    pub unmet: Vec<u8>,
}

/// Project a merged-level plan back to the original orders: production and
/// backorder split proportionally by demand, the family's setup/carryover
/// rows attributed to the primary sub-order, the unmet flag inherited by
/// every sub-order of an unmet composite.
pub fn split(
    merge: &MergePlan,
    original: &Instance,
    plan: &PlanSolution,
) -> SplitSolution {
    let n = original.orders().len();
    let periods = original.periods();

    let mut out = SplitSolution {
        x: vec![vec![0.0; periods]; n],
        backorder: vec![vec![0.0; periods]; n],
        setup: vec![vec![0; periods]; n],
        carryover: vec![vec![0; periods]; n],
        unmet: vec![0; n],
    };

    for (k, composite) in merge.composites.iter().enumerate() {
        let total: f64 = composite
            .members
            .iter()
            .map(|&i| original.orders()[i].demand)
            .sum();

        for &i in &composite.members {
            let proportion = if total > 0.0 {
                original.orders()[i].demand / total
            } else {
                1.0 / composite.members.len() as f64
            };

            for t in 0..periods {
                out.x[i][t] = plan.x[k][t] * proportion;
                out.backorder[i][t] = plan.backorder[k][t] * proportion;
            }
            out.unmet[i] = plan.unmet[k];
        }

        let primary = composite.primary;
        for t in 0..periods {
            out.setup[primary][t] = plan.y[composite.family][t];
            out.carryover[primary][t] = plan.lambda[composite.family][t];
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Family, Flow, Order};

    fn order(id: &str, family: usize, flow: usize, demand: f64, release: usize, due: usize, usage: f64, cost: f64) -> Order {
        Order {
            id: id.to_string(),
            family,
            flow,
            demand,
            release,
            due,
            usage,
            unit_cost: cost,
            backorder_penalty: 100.0,
            unmet_penalty: 10_000.0,
        }
    }

    fn instance() -> Instance {
        Instance::new(
            "merge-test".into(),
            4,
            1000.0,
            vec![
                order("a", 0, 0, 30.0, 0, 1, 1.0, 2.0),
                order("b", 0, 0, 90.0, 1, 3, 2.0, 4.0),
                order("c", 1, 0, 50.0, 0, 3, 1.0, 1.0),
            ],
            vec![
                Family {
                    setup_usage: 10.0,
                    setup_cost: 100.0,
                },
                Family {
                    setup_usage: 10.0,
                    setup_cost: 100.0,
                },
            ],
            vec![Flow {
                holding_cost: 0.5,
                downstream_cap: vec![100.0; 4],
            }],
        )
        .unwrap()
    }

    #[test]
    fn merges_by_flow_and_family() {
        let (merged, plan) = merge(&instance(), 1000.0);

        assert_eq!(plan.merged_count(), 2);
        assert_eq!(merged.orders().len(), 2);

        let ab = &merged.orders()[0];
        assert_eq!(ab.demand, 120.0);
        assert_eq!(ab.release, 0);
        assert_eq!(ab.due, 3);
        assert_eq!(ab.usage, 2.0);
        // demand-weighted: (2*30 + 4*90) / 120
        assert!((ab.unit_cost - 3.5).abs() < 1e-9);

        // b carries the bigger demand, so it is the primary
        assert_eq!(plan.composites[0].primary, 1);
    }

    #[test]
    fn threshold_buckets_large_groups() {
        let (merged, plan) = merge(&instance(), 100.0);

        // a (30) + b (90) exceed 100, so family 0 splits into two buckets
        assert_eq!(plan.merged_count(), 3);
        assert_eq!(merged.orders()[0].demand, 30.0);
        assert_eq!(merged.orders()[1].demand, 90.0);
    }

    #[test]
    fn downstream_caps_follow_composite_windows() {
        let (merged, _) = merge(&instance(), 1000.0);

        // composite (a, b): 120 over [0, 3] = 30 per period;
        // composite c: 50 over [0, 3] = 12.5 per period
        let caps = &merged.flows()[0].downstream_cap;
        assert!((caps[0] - 42.5).abs() < 1e-9);
        assert!((caps[3] - 42.5).abs() < 1e-9);
    }

    #[test]
    fn split_is_proportional_and_attributes_primary() {
        let original = instance();
        let (merged, merge_plan) = merge(&original, 1000.0);
        assert_eq!(merged.orders().len(), 2);

        let plan = PlanSolution {
            x: vec![vec![40.0, 40.0, 40.0, 0.0], vec![50.0, 0.0, 0.0, 0.0]],
            y: vec![vec![1, 0, 1, 0], vec![1, 0, 0, 0]],
            lambda: vec![vec![0, 1, 0, 0], vec![0, 0, 0, 0]],
            inventory: vec![vec![0.0; 4]],
            processing: vec![vec![90.0, 40.0, 40.0, 0.0]],
            backorder: vec![vec![0.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 4.0]],
            unmet: vec![0, 1],
        };

        let split = split(&merge_plan, &original, &plan);

        // a gets 30/120 of the composite production
        assert!((split.x[0][0] - 10.0).abs() < 1e-9);
        assert!((split.x[1][0] - 30.0).abs() < 1e-9);
        // primary of composite 0 is b: it carries the family rows
        assert_eq!(split.setup[1], vec![1, 0, 1, 0]);
        assert_eq!(split.carryover[1], vec![0, 1, 0, 0]);
        assert_eq!(split.setup[0], vec![0; 4]);
        // c inherits the unmet flag of its composite
        assert_eq!(split.unmet[2], 1);
        assert!((split.backorder[2][3] - 4.0).abs() < 1e-9);
    }
}
