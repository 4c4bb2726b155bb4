use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The type used for produced/stored quantity
pub type Quantity = f64;
/// The type used for cost.
pub type Cost = f64;

pub type OrderIndex = usize;
pub type FamilyIndex = usize;
pub type FlowIndex = usize;
pub type PeriodIndex = usize;

/// Tolerance used for every objective / quantity comparison.
pub const EPSILON: f64 = 1e-6;

/// Default machine capacity when the input file carries none.
pub const DEFAULT_CAPACITY: f64 = 1440.0;

#[derive(Debug, Display)]
pub enum IngestError {
    #[display(fmt = "machine capacity must be positive, got {}", _0)]
    NonPositiveCapacity(f64),
    #[display(fmt = "order {}: family {} out of range (G = {})", id, family, families)]
    FamilyOutOfRange {
        id: String,
        family: usize,
        families: usize,
    },
    #[display(fmt = "order {}: flow {} out of range (F = {})", id, flow, flows)]
    FlowOutOfRange { id: String, flow: usize, flows: usize },
    #[display(
        fmt = "order {}: window [{}, {}] is contradictory or exceeds T = {}",
        id,
        release,
        due,
        periods
    )]
    BadWindow {
        id: String,
        release: usize,
        due: usize,
        periods: usize,
    },
    #[display(
        fmt = "flow {}: downstream capacity row has {} entries, expected {}",
        flow,
        got,
        expected
    )]
    BadDownstreamRow {
        flow: usize,
        got: usize,
        expected: usize,
    },
    #[display(fmt = "{}", _0)]
    Malformed(String),
}

impl std::error::Error for IngestError {}

/// A production order. The window is inclusive of `due`; production before
/// `release` is forbidden, production after `due` is allowed and priced
/// through the backorder penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub family: FamilyIndex,
    pub flow: FlowIndex,
    pub demand: Quantity,
    pub release: PeriodIndex,
    pub due: PeriodIndex,
    /// Machine resource consumed per produced unit.
    pub usage: f64,
    pub unit_cost: Cost,
    pub backorder_penalty: Cost,
    pub unmet_penalty: Cost,
}

/// A setup family: orders sharing one setup resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub setup_usage: f64,
    pub setup_cost: Cost,
}

/// A downstream flow: an inventory stream with a per-period processing cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub holding_cost: Cost,
    pub downstream_cap: Vec<Quantity>,
}

/// The immutable problem description. Created once at ingest and never
/// mutated; drivers only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    case_id: String,
    periods: usize,
    capacity: f64,
    orders: Vec<Order>,
    families: Vec<Family>,
    flows: Vec<Flow>,
}

impl Instance {
    /// Validate and construct an instance. Orders with non-positive demand
    /// are dropped; every other inconsistency is fatal.
    pub fn new(
        case_id: String,
        periods: usize,
        capacity: f64,
        orders: Vec<Order>,
        families: Vec<Family>,
        flows: Vec<Flow>,
    ) -> Result<Instance, IngestError> {
        if capacity <= 0.0 {
            return Err(IngestError::NonPositiveCapacity(capacity));
        }

        for (f, flow) in flows.iter().enumerate() {
            if flow.downstream_cap.len() != periods {
                return Err(IngestError::BadDownstreamRow {
                    flow: f,
                    got: flow.downstream_cap.len(),
                    expected: periods,
                });
            }
        }

        let mut kept = Vec::with_capacity(orders.len());
        for order in orders {
            if order.demand <= 0.0 {
                log::warn!("dropping order {} with demand {}", order.id, order.demand);
                continue;
            }
            if order.family >= families.len() {
                return Err(IngestError::FamilyOutOfRange {
                    id: order.id,
                    family: order.family,
                    families: families.len(),
                });
            }
            if order.flow >= flows.len() {
                return Err(IngestError::FlowOutOfRange {
                    id: order.id,
                    flow: order.flow,
                    flows: flows.len(),
                });
            }
            if order.release > order.due || order.due >= periods {
                return Err(IngestError::BadWindow {
                    id: order.id,
                    release: order.release,
                    due: order.due,
                    periods,
                });
            }
            kept.push(order);
        }

        Ok(Instance {
            case_id,
            periods,
            capacity,
            orders: kept,
            families,
            flows,
        })
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// The orders, ordered by index (continuous, starting at 0).
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// The number of planning periods T.
    pub fn periods(&self) -> usize {
        self.periods
    }

    /// Per-period machine capacity C.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Indices of the orders assigned to family `g`.
    pub fn orders_in_family(&self, g: FamilyIndex) -> impl Iterator<Item = OrderIndex> + '_ {
        self.orders
            .iter()
            .enumerate()
            .filter_map(move |(i, o)| (o.family == g).then_some(i))
    }

    /// Indices of the orders assigned to flow `f`.
    pub fn orders_in_flow(&self, f: FlowIndex) -> impl Iterator<Item = OrderIndex> + '_ {
        self.orders
            .iter()
            .enumerate()
            .filter_map(move |(i, o)| (o.flow == f).then_some(i))
    }

    pub fn total_demand(&self) -> Quantity {
        self.orders.iter().map(|o| o.demand).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, family: usize, flow: usize, demand: f64, release: usize, due: usize) -> Order {
        Order {
            id: id.to_string(),
            family,
            flow,
            demand,
            release,
            due,
            usage: 1.0,
            unit_cost: 1.0,
            backorder_penalty: 100.0,
            unmet_penalty: 10_000.0,
        }
    }

    fn family() -> Family {
        Family {
            setup_usage: 0.0,
            setup_cost: 0.0,
        }
    }

    fn flow(periods: usize) -> Flow {
        Flow {
            holding_cost: 0.5,
            downstream_cap: vec![1e9; periods],
        }
    }

    #[test]
    fn rejects_contradictory_window() {
        let err = Instance::new(
            "case".into(),
            3,
            100.0,
            vec![order("o1", 0, 0, 10.0, 2, 1)],
            vec![family()],
            vec![flow(3)],
        );
        assert!(matches!(err, Err(IngestError::BadWindow { .. })));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = Instance::new("case".into(), 3, 0.0, vec![], vec![], vec![]);
        assert!(matches!(err, Err(IngestError::NonPositiveCapacity(_))));
    }

    #[test]
    fn drops_zero_demand_orders() {
        let instance = Instance::new(
            "case".into(),
            3,
            100.0,
            vec![order("keep", 0, 0, 10.0, 0, 2), order("drop", 0, 0, 0.0, 0, 2)],
            vec![family()],
            vec![flow(3)],
        )
        .unwrap();
        assert_eq!(instance.orders().len(), 1);
        assert_eq!(instance.orders()[0].id, "keep");
    }

    #[test]
    fn membership_accessors_partition_orders() {
        let instance = Instance::new(
            "case".into(),
            3,
            100.0,
            vec![
                order("a", 0, 0, 10.0, 0, 2),
                order("b", 1, 0, 10.0, 0, 2),
                order("c", 1, 1, 10.0, 0, 2),
            ],
            vec![family(), family()],
            vec![flow(3), flow(3)],
        )
        .unwrap();

        assert_eq!(instance.orders_in_family(1).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(instance.orders_in_flow(0).collect::<Vec<_>>(), vec![0, 1]);
    }
}
