use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "rcu-lfq workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full-size producer/consumer stress test in release mode
    Stress,

    /// Run the stress tests under AddressSanitizer (nightly toolchain)
    Sanitize {
        /// Target triple to build for
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
    },

    /// Run the loom model-checking tests
    Loom,

    /// Run the queue benchmarks against a mutex-protected VecDeque
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Generate report only (skip running benchmarks)
        #[arg(long, default_value_t = false)]
        report_only: bool,
    },
}

const BASELINE: &str = "std_mutex_vec_deque";
const CANDIDATE: &str = "lf_queue";

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stress => {
            let start = Instant::now();
            cargo(
                &["test", "--release", "--test", "stress", "--", "--include-ignored", "--nocapture"],
                &[],
            )?;
            println!("Stress run finished in {:.2?}", start.elapsed());
        }
        Commands::Sanitize { target } => {
            cargo(
                &[
                    "+nightly",
                    "test",
                    "-Zbuild-std",
                    "--target",
                    &target,
                    "--test",
                    "stress",
                    "--",
                    "--include-ignored",
                ],
                &[
                    ("RUSTFLAGS", "-Zsanitizer=address"),
                    ("RUSTDOCFLAGS", "-Zsanitizer=address"),
                    ("ASAN_OPTIONS", "detect_leaks=1"),
                ],
            )?;
        }
        Commands::Loom => {
            cargo(
                &["test", "--release", "--test", "loom_queue"],
                &[("RUSTFLAGS", "--cfg loom"), ("LOOM_MAX_PREEMPTIONS", "3")],
            )?;
        }
        Commands::Bench { quick, report_only } => {
            if !report_only {
                run_benchmarks(quick)?;
            }
            generate_report()?;
        }
    }

    Ok(())
}

fn cargo(args: &[&str], env: &[(&str, &str)]) -> Result<()> {
    println!(">>> cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .envs(env.iter().copied())
        .status()
        .with_context(|| format!("failed to spawn cargo {}", args.join(" ")))?;
    if !status.success() {
        anyhow::bail!("cargo {} failed with {status}", args.join(" "));
    }
    Ok(())
}

fn run_benchmarks(quick: bool) -> Result<()> {
    let mut args = vec!["bench", "--bench", "queue_benchmark", "--"];
    if quick {
        args.extend(["--measurement-time", "0.1", "--noplot", "--sample-size", "10"]);
    }
    cargo(&args, &[("CARGO_INCREMENTAL", "0")])
}

fn generate_report() -> Result<()> {
    println!("\n>>> Generating Report...");
    let criterion_dir = Path::new("target/criterion");
    if !criterion_dir.exists() {
        eprintln!("No criterion output found at {}", criterion_dir.display());
        return Ok(());
    }

    // workload -> implementation -> ops/s
    let mut results: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    collect_results(criterion_dir, &mut results)?;

    let report_path = Path::new("benchmark_results/report.md");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }

    use std::fmt::Write;
    let mut out = String::from("# Queue Benchmark Report\n\n");
    writeln!(out, "| Workload | {BASELINE} (Ops/s) | {CANDIDATE} (Ops/s) | Speedup |")?;
    writeln!(out, "|---|---|---|---|")?;
    for (workload, by_impl) in &results {
        let base = by_impl.get(BASELINE).copied();
        let cand = by_impl.get(CANDIDATE).copied();
        let speedup = match (base, cand) {
            (Some(b), Some(c)) if b > 0.0 => format!("**{:.2}x**", c / b),
            _ => "-".to_owned(),
        };
        writeln!(out, "| {workload} | {} | {} | {speedup} |", fmt_ops(base), fmt_ops(cand))?;
    }

    fs::write(report_path, out).with_context(|| format!("writing {}", report_path.display()))?;
    println!("Report written to {}", report_path.display());
    Ok(())
}

fn fmt_ops(ops: Option<f64>) -> String {
    match ops {
        Some(ops) if ops > 1_000_000.0 => format!("{:.2}M", ops / 1_000_000.0),
        Some(ops) if ops > 1_000.0 => format!("{:.2}K", ops / 1_000.0),
        Some(ops) => format!("{ops:.0}"),
        None => "N/A".to_owned(),
    }
}

/// Walks `target/criterion/<group>/<impl>[/<param>]/new/estimates.json`.
fn collect_results(dir: &Path, results: &mut BTreeMap<String, BTreeMap<String, f64>>) -> Result<()> {
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|s| s.to_str()) == Some("report") {
                continue;
            }
            collect_results(&path, results)?;
            continue;
        }
        if path.file_name().and_then(|s| s.to_str()) != Some("estimates.json") {
            continue;
        }
        let Some(run_dir) = path.parent().filter(|p| p.ends_with("new")) else {
            continue;
        };
        let Some(bench_dir) = run_dir.parent() else {
            continue;
        };

        let bench_json = bench_dir.join("benchmark.json");
        let meta: serde_json::Value = match fs::read_to_string(&bench_json) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", bench_json.display()))?,
            Err(_) => continue,
        };
        let (Some(group), Some(function)) = (
            meta.get("group_id").and_then(|v| v.as_str()),
            meta.get("function_id").and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        let workload = match meta.get("value_str").and_then(|v| v.as_str()) {
            Some(param) => format!("{group}/{param}"),
            None => group.to_owned(),
        };
        let elements = meta
            .get("throughput")
            .and_then(|t| t.get("Elements"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0);

        let estimates: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)
            .with_context(|| format!("parsing {}", path.display()))?;
        let time_ns = estimates
            .get("mean")
            .and_then(|m| m.get("point_estimate"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        if time_ns > 0.0 {
            results
                .entry(workload)
                .or_default()
                .insert(function.to_owned(), elements * 1e9 / time_ns);
        }
    }
    Ok(())
}
