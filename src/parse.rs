use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::problem::{Family, Flow, IngestError, Instance, Order};

/// Order-level penalties used when the input file carries none (it never
/// does in the CSV format).
#[derive(Clone, Debug)]
pub struct PenaltyDefaults {
    pub backorder: f64,
    pub unmet: f64,
}

impl Default for PenaltyDefaults {
    fn default() -> Self {
        PenaltyDefaults {
            backorder: 100.0,
            unmet: 10_000.0,
        }
    }
}

/// Read an instance from the line-delimited CSV format:
/// case id; `T,<int>`; `F,<int>`; `G,<int>`; G setup costs; F inventory
/// costs; G setup resources; `N,<int>`; F rows of T downstream capacities;
/// N `order_` rows of (id, group, flow, demand, e, l, usage, cost).
pub fn read_instance(
    path: &Path,
    capacity: f64,
    penalties: &PenaltyDefaults,
) -> Result<Instance, IngestError> {
    let file = File::open(path)
        .map_err(|e| IngestError::Malformed(format!("cannot open {}: {}", path.display(), e)))?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .collect::<Result<_, _>>()
        .map_err(|e| IngestError::Malformed(format!("cannot read {}: {}", path.display(), e)))?;

    info!("reading instance from {}", path.display());
    parse_records(&lines, capacity, penalties)
}

/// Parse the record lines of one instance file.
pub fn parse_records(
    lines: &[String],
    capacity: f64,
    penalties: &PenaltyDefaults,
) -> Result<Instance, IngestError> {
    let mut pos = 0usize;

    let case_id = take(lines, &mut pos)?.trim().to_string();

    let periods = keyed_count(take(lines, &mut pos)?, "T")?;
    let flows_n = keyed_count(take(lines, &mut pos)?, "F")?;
    let groups_n = keyed_count(take(lines, &mut pos)?, "G")?;

    let setup_costs = tail_numbers(take(lines, &mut pos)?)?;
    if setup_costs.len() != groups_n {
        return Err(IngestError::Malformed(format!(
            "expected {} setup costs, found {}",
            groups_n,
            setup_costs.len()
        )));
    }

    let holding_costs = tail_numbers(take(lines, &mut pos)?)?;
    if holding_costs.len() != flows_n {
        return Err(IngestError::Malformed(format!(
            "expected {} inventory costs, found {}",
            flows_n,
            holding_costs.len()
        )));
    }

    let setup_usages = tail_numbers(take(lines, &mut pos)?)?;
    if setup_usages.len() != groups_n {
        return Err(IngestError::Malformed(format!(
            "expected {} setup resources, found {}",
            groups_n,
            setup_usages.len()
        )));
    }

    let orders_n = keyed_count(take(lines, &mut pos)?, "N")?;

    let mut flows = Vec::with_capacity(flows_n);
    for f in 0..flows_n {
        let caps = tail_numbers(take(lines, &mut pos)?)?;
        if caps.len() != periods {
            return Err(IngestError::BadDownstreamRow {
                flow: f,
                got: caps.len(),
                expected: periods,
            });
        }
        flows.push(Flow {
            holding_cost: holding_costs[f],
            downstream_cap: caps,
        });
    }

    let families = setup_costs
        .into_iter()
        .zip(setup_usages)
        .map(|(setup_cost, setup_usage)| Family {
            setup_usage,
            setup_cost,
        })
        .collect();

    let mut orders = Vec::with_capacity(orders_n);
    while orders.len() < orders_n {
        let line = match lines.get(pos) {
            Some(line) => line,
            None => {
                return Err(IngestError::Malformed(format!(
                    "expected {} orders, file ended after {}",
                    orders_n,
                    orders.len()
                )))
            }
        };
        pos += 1;
        if line.trim().is_empty() || !line.starts_with("order_") {
            continue;
        }
        orders.push(parse_order(line, penalties)?);
    }

    let instance = Instance::new(case_id, periods, capacity, orders, families, flows)?;
    info!(
        "loaded case {}: N={} T={} F={} G={}",
        instance.case_id(),
        instance.orders().len(),
        instance.periods(),
        instance.flows().len(),
        instance.families().len()
    );
    Ok(instance)
}

fn take<'a>(lines: &'a [String], pos: &mut usize) -> Result<&'a String, IngestError> {
    let line = lines
        .get(*pos)
        .ok_or_else(|| IngestError::Malformed("unexpected end of file".to_string()))?;
    *pos += 1;
    Ok(line)
}

fn parse_order(line: &str, penalties: &PenaltyDefaults) -> Result<Order, IngestError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 9 {
        return Err(IngestError::Malformed(format!(
            "order row has {} fields, expected 9: {}",
            fields.len(),
            line
        )));
    }

    let id = if fields[1].is_empty() {
        fields[0].to_string()
    } else {
        fields[1].to_string()
    };

    let group: usize = parse_field(fields[2], line)?;
    let flow: usize = parse_field(fields[3], line)?;
    if group == 0 || flow == 0 {
        return Err(IngestError::Malformed(format!(
            "order {}: group and flow are 1-based, got ({}, {})",
            id, fields[2], fields[3]
        )));
    }

    Ok(Order {
        id,
        family: group - 1,
        flow: flow - 1,
        demand: parse_field(fields[4], line)?,
        release: parse_field(fields[5], line)?,
        due: parse_field(fields[6], line)?,
        usage: parse_field(fields[7], line)?,
        unit_cost: parse_field(fields[8], line)?,
        backorder_penalty: penalties.backorder,
        unmet_penalty: penalties.unmet,
    })
}

fn parse_field<T: std::str::FromStr>(field: &str, line: &str) -> Result<T, IngestError> {
    field
        .parse()
        .map_err(|_| IngestError::Malformed(format!("invalid number '{}' in row: {}", field, line)))
}

/// `key,value` rows such as `T,30`.
fn keyed_count(line: &str, key: &str) -> Result<usize, IngestError> {
    let mut fields = line.split(',').map(str::trim);
    let label = fields.next().unwrap_or_default();
    if !label.eq_ignore_ascii_case(key) {
        return Err(IngestError::Malformed(format!(
            "expected a '{}' row, found: {}",
            key, line
        )));
    }
    let value = fields
        .next()
        .ok_or_else(|| IngestError::Malformed(format!("missing value in row: {}", line)))?;
    parse_field(value, line)
}

/// Numeric rows with a leading label column, e.g. `cost_y,10,20,30`.
fn tail_numbers(line: &str) -> Result<Vec<f64>, IngestError> {
    line.split(',')
        .skip(1)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| parse_field(f, line))
        .collect()
}
