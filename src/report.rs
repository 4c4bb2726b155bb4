use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use serde::Serialize;
use serde_json::Value;

use crate::big_order::SplitSolution;
use crate::drivers::RunOutcome;
use crate::problem::{Instance, EPSILON};
use crate::solution::{Metrics, PlanSolution};

#[derive(Serialize)]
struct Report<'a> {
    summary: Summary<'a>,
    problem: ProblemBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a Metrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<VariablesBlock>,
}

#[derive(Serialize)]
struct Summary<'a> {
    algorithm: &'a str,
    input_file: &'a str,
    status: &'a str,
    objective: f64,
    solve_time: f64,
    gap: f64,
    unmet_count: usize,
    unmet_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<Vec<StepSummary>>,
}

#[derive(Serialize)]
struct StepSummary {
    step: usize,
    objective: f64,
    time: f64,
    gap: f64,
}

#[derive(Serialize)]
struct ProblemBlock {
    #[serde(rename = "N")]
    n: usize,
    #[serde(rename = "T")]
    t: usize,
    #[serde(rename = "F")]
    f: usize,
    #[serde(rename = "G")]
    g: usize,
    capacity: f64,
}

#[derive(Serialize)]
struct VariablesBlock {
    #[serde(rename = "X")]
    x: VarTensor,
    #[serde(rename = "Y")]
    y: VarTensor,
    #[serde(rename = "L")]
    l: VarTensor,
    #[serde(rename = "I")]
    i: VarTensor,
    #[serde(rename = "B")]
    b: VarTensor,
    #[serde(rename = "U")]
    u: VarTensor,
}

#[derive(Serialize)]
struct VarTensor {
    description: &'static str,
    dimensions: Vec<usize>,
    data: Value,
}

/// Continuous quantities are reported as integers, rounded half-up.
fn rounded_grid(rows: &[Vec<f64>]) -> Value {
    let data: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| row.iter().map(|v| v.round() + 0.0).collect())
        .collect();
    serde_json::to_value(data).unwrap_or(Value::Null)
}

fn binary_grid(rows: &[Vec<u8>]) -> Value {
    serde_json::to_value(rows).unwrap_or(Value::Null)
}

fn variables_block(instance: &Instance, plan: &PlanSolution) -> VariablesBlock {
    let n = instance.orders().len();
    let t = instance.periods();
    let g = instance.families().len();
    let f = instance.flows().len();

    VariablesBlock {
        x: VarTensor {
            description: "Production quantity",
            dimensions: vec![n, t],
            data: rounded_grid(&plan.x),
        },
        y: VarTensor {
            description: "Setup decision",
            dimensions: vec![g, t],
            data: binary_grid(&plan.y),
        },
        l: VarTensor {
            description: "Setup carryover",
            dimensions: vec![g, t],
            data: binary_grid(&plan.lambda),
        },
        i: VarTensor {
            description: "Inventory level",
            dimensions: vec![f, t],
            data: rounded_grid(&plan.inventory),
        },
        b: VarTensor {
            description: "Backorder quantity",
            dimensions: vec![n, t],
            data: rounded_grid(&plan.backorder),
        },
        u: VarTensor {
            description: "Unmet demand indicator",
            dimensions: vec![n],
            data: serde_json::to_value(&plan.unmet).unwrap_or(Value::Null),
        },
    }
}

/// Write the result document to `<dir>/<algo>_result_<timestamp>.json` and
/// return the path.
pub fn write_report(
    dir: &Path,
    input_file: &str,
    instance: &Instance,
    outcome: &RunOutcome,
    metrics: Option<&Metrics>,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let status = match &outcome.plan {
        None => "NoSolution",
        Some(_) if outcome.gap.abs() <= EPSILON => "Optimal",
        Some(_) => "Feasible",
    };

    let n = instance.orders().len();
    let unmet_count = outcome
        .plan
        .as_ref()
        .map_or(0, |p| p.unmet.iter().filter(|&&u| u == 1).count());

    let steps = (outcome.algorithm == "RR").then(|| {
        outcome
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| StepSummary {
                step: i + 1,
                objective: stage.objective,
                time: stage.wall_time,
                gap: stage.gap,
            })
            .collect()
    });

    let report = Report {
        summary: Summary {
            algorithm: outcome.algorithm,
            input_file,
            status,
            objective: outcome.objective,
            solve_time: outcome.solve_time,
            gap: outcome.gap,
            unmet_count,
            unmet_rate: if n > 0 {
                unmet_count as f64 / n as f64
            } else {
                0.0
            },
            steps,
        },
        problem: ProblemBlock {
            n,
            t: instance.periods(),
            f: instance.flows().len(),
            g: instance.families().len(),
            capacity: instance.capacity(),
        },
        metrics,
        variables: outcome
            .plan
            .as_ref()
            .map(|plan| variables_block(instance, plan)),
    };

    let filename = format!(
        "{}_result_{}.json",
        outcome.algorithm.to_lowercase(),
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(filename);
    let file = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(file, &report)?;

    info!("result written to {}", path.display());
    Ok(path)
}

#[derive(Serialize)]
struct SplitReport<'a> {
    orders: Vec<&'a str>,
    #[serde(rename = "X")]
    x: VarTensor,
    #[serde(rename = "B")]
    b: VarTensor,
    #[serde(rename = "Y")]
    y: VarTensor,
    #[serde(rename = "L")]
    l: VarTensor,
    #[serde(rename = "U")]
    u: VarTensor,
}

/// Write the per-original-order projection next to the merged-level
/// result.
pub fn write_split_report(
    dir: &Path,
    original: &Instance,
    split: &SplitSolution,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let n = original.orders().len();
    let t = original.periods();

    let report = SplitReport {
        orders: original.orders().iter().map(|o| o.id.as_str()).collect(),
        x: VarTensor {
            description: "Production quantity per original order",
            dimensions: vec![n, t],
            data: rounded_grid(&split.x),
        },
        b: VarTensor {
            description: "Backorder quantity per original order",
            dimensions: vec![n, t],
            data: rounded_grid(&split.backorder),
        },
        y: VarTensor {
            description: "Setup attributed to the primary sub-order",
            dimensions: vec![n, t],
            data: binary_grid(&split.setup),
        },
        l: VarTensor {
            description: "Carryover attributed to the primary sub-order",
            dimensions: vec![n, t],
            data: binary_grid(&split.carryover),
        },
        u: VarTensor {
            description: "Unmet flag inherited from the composite",
            dimensions: vec![n],
            data: serde_json::to_value(&split.unmet).unwrap_or(Value::Null),
        },
    };

    let path = dir.join(format!(
        "split_result_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(file, &report)?;

    info!("split projection written to {}", path.display());
    Ok(path)
}
