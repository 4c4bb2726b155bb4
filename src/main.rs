use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;

use lotplan::big_order;
use lotplan::drivers::{rf, rfo, rr, DriverContext, RunOutcome};
use lotplan::logging::{FileSink, RunLog};
use lotplan::oracle::microlp::MicrolpOracle;
use lotplan::oracle::SolveParams;
use lotplan::parse::{read_instance, PenaltyDefaults};
use lotplan::problem::DEFAULT_CAPACITY;
use lotplan::report;
use lotplan::solution::Metrics;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Algo {
    #[value(name = "RF", alias = "rf")]
    Rf,
    #[value(name = "RFO", alias = "rfo")]
    Rfo,
    #[value(name = "RR", alias = "rr")]
    Rr,
}

/// Cost-minimizing production planning on a single capacitated machine
/// with setup carryover.
#[derive(Parser, Debug)]
#[command(name = "lotplan", version)]
struct Args {
    /// Input data file (CSV)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Input data file (alternative to the positional argument)
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    file: Option<PathBuf>,

    /// Solver driver
    #[arg(long, value_enum, default_value = "RF")]
    algo: Algo,

    /// Result directory
    #[arg(short, long, default_value = "./results")]
    output: PathBuf,

    /// Log path prefix
    #[arg(short, long, default_value = "./logs/solve")]
    log: PathBuf,

    /// Per-oracle-call time limit in seconds
    #[arg(short = 't', long = "time", default_value_t = 30.0)]
    time: f64,

    /// Per-period machine capacity
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: f64,

    /// Default unmet-demand penalty for orders without one
    #[arg(long = "u-penalty", default_value_t = 10_000)]
    u_penalty: i64,

    /// Default backorder penalty for orders without one
    #[arg(long = "b-penalty", default_value_t = 100)]
    b_penalty: i64,

    /// Big-order bucketing threshold
    #[arg(long, default_value_t = 1000.0)]
    threshold: f64,

    /// Disable the big-order pre-pass
    #[arg(long = "no-merge")]
    no_merge: bool,

    /// Exit non-zero when the driver ends without an incumbent
    #[arg(long = "require-success")]
    require_success: bool,

    /// Solver scratch directory
    #[arg(long = "cplex-workdir", value_name = "PATH")]
    cplex_workdir: Option<PathBuf>,

    /// Solver working-memory limit in MB
    #[arg(long = "cplex-workmem", value_name = "MB")]
    cplex_workmem: Option<usize>,

    /// Solver thread count, 0 = auto
    #[arg(long = "cplex-threads", value_name = "N", default_value_t = 0)]
    cplex_threads: usize,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let Some(input) = args.file.clone().or_else(|| args.input.clone()) else {
        eprintln!("error: no input file given (positional FILE or -f/--file)");
        return ExitCode::FAILURE;
    };

    let mut run_log = RunLog::new(Box::new(FileSink::create(&args.log)));
    run_log.line(&format!(
        "lotplan starting: algo={:?} input={} output={}",
        args.algo,
        input.display(),
        args.output.display()
    ));

    let penalties = PenaltyDefaults {
        backorder: args.b_penalty as f64,
        unmet: args.u_penalty as f64,
    };

    let original = match read_instance(&input, args.capacity, &penalties) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("error: {}", e);
            run_log.line(&format!("ingest failed: {}", e));
            return ExitCode::FAILURE;
        }
    };

    run_log.status(&format!(
        "[LOAD:OK:{}:{}:{}:{}]",
        original.orders().len(),
        original.periods(),
        original.flows().len(),
        original.families().len()
    ));

    let merged = if args.no_merge {
        run_log.status("[MERGE:SKIP]");
        None
    } else {
        let before = original.orders().len();
        let (instance, map) = big_order::merge(&original, args.threshold);
        run_log.status(&format!("[MERGE:{}:{}]", before, instance.orders().len()));
        Some((instance, map))
    };

    let solved_instance = merged
        .as_ref()
        .map(|(instance, _)| instance)
        .unwrap_or(&original);

    let oracle = MicrolpOracle::new();
    let params = SolveParams {
        time_limit: Duration::from_secs_f64(args.time.max(0.0)),
        threads: args.cplex_threads,
        work_dir: args.cplex_workdir.clone(),
        work_mem_mb: args.cplex_workmem,
    };

    let outcome: RunOutcome = {
        let mut ctx = DriverContext::new(&oracle, params, None, &mut run_log);
        match args.algo {
            Algo::Rf => rf::solve(solved_instance, &rf::RfConfig::default(), &mut ctx),
            Algo::Rfo => rfo::solve(solved_instance, &rfo::RfoConfig::default(), &mut ctx),
            Algo::Rr => rr::solve(solved_instance, &rr::RrConfig::default(), &mut ctx),
        }
    };

    run_log.line(&format!(
        "{} finished: objective={} gap={} time={:.3}s",
        outcome.algorithm, outcome.objective, outcome.gap, outcome.solve_time
    ));

    let metrics = outcome
        .plan
        .as_ref()
        .map(|plan| Metrics::compute(solved_instance, plan));

    match report::write_report(
        &args.output,
        &input.display().to_string(),
        solved_instance,
        &outcome,
        metrics.as_ref(),
    ) {
        Ok(path) => run_log.line(&format!("result saved to {}", path.display())),
        Err(e) => {
            eprintln!("error: cannot write results: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let (Some((_, map)), Some(plan)) = (&merged, &outcome.plan) {
        let projection = big_order::split(map, &original, plan);
        match report::write_split_report(&args.output, &original, &projection) {
            Ok(path) => run_log.line(&format!("split projection saved to {}", path.display())),
            Err(e) => run_log.line(&format!("cannot write split projection: {}", e)),
        }
    }

    run_log.status("[DONE:SUCCESS]");
    run_log.flush();

    if args.require_success && !outcome.succeeded() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
