use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use traj_eval_rs::{ComparisonTable, ResultArchive, StatisticsType};

#[derive(Parser, Debug)]
#[command(name = "res_compare")]
#[command(about = "Compare the statistics of saved result archives", long_about = None)]
struct Args {
    /// Result archives (.json.gz)
    #[arg(required = true)]
    results: Vec<PathBuf>,

    /// Statistic used to rank the results
    #[arg(long, value_enum, default_value_t = StatArg::Rmse)]
    rank_by: StatArg,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatArg {
    Rmse,
    Mean,
    Median,
    Std,
    Min,
    Max,
    Sse,
}

impl From<StatArg> for StatisticsType {
    fn from(arg: StatArg) -> Self {
        match arg {
            StatArg::Rmse => StatisticsType::Rmse,
            StatArg::Mean => StatisticsType::Mean,
            StatArg::Median => StatisticsType::Median,
            StatArg::Std => StatisticsType::Std,
            StatArg::Min => StatisticsType::Min,
            StatArg::Max => StatisticsType::Max,
            StatArg::Sse => StatisticsType::Sse,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let rank_by = StatisticsType::from(args.rank_by);

    let mut archives = Vec::with_capacity(args.results.len());
    for path in &args.results {
        let archive = ResultArchive::load(path)
            .with_context(|| format!("loading {}", path.display()))?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().trim_end_matches(".json.gz").to_string())
            .unwrap_or_else(|| archive.est_name.clone());
        archives.push((label, archive));
    }

    let table = ComparisonTable::new(archives.iter().map(|(l, a)| (l.clone(), a)));
    if table.common.is_none() {
        log::warn!("Archives mix different metrics or pose relations, values are not comparable");
    }
    print!("{}", table.render(&StatisticsType::ALL));
    if let Some(best) = table.best(rank_by) {
        println!("\nlowest {}: {}", rank_by, best);
    }
    Ok(())
}
