use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use log::info;

use sbt::data::{CsvFile, DataSource, JsonFile, RandomWalk, split_train_test};
use sbt::engine::{Backtest, BacktestConfig, BacktestReport, Bar, FeeModel, SizingPolicy, run_backtest};
use sbt::metrics::{BARS_PER_YEAR, Metrics};
use sbt::optimizer::{Optimizer, ParameterCombination, best};
use sbt::signals::ConsensusSignals;

#[derive(Parser)]
#[command(name = "sbt")]
#[command(about = "Backtest signal-driven long/short strategies bar by bar")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest and print its metrics
    Run {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        metrics: MetricsArgs,
        /// Write the full report (bars, equity, realized P&L, trades) as JSON
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Draw portfolio vs buy-and-hold (.png or .svg)
        #[arg(long, value_name = "PATH")]
        plot: Option<PathBuf>,
    },
    /// Grid-search stop-loss, take-profit, RSI, EMA and MACD parameters on the train split,
    /// maximizing Calmar. Sizing and fees stay as given
    Optimize {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        metrics: MetricsArgs,
        /// Train ratio
        #[arg(long, default_value_t = 0.6)]
        train: f64,
        /// Test ratio
        #[arg(long, default_value_t = 0.2)]
        test: f64,
        /// Validation ratio
        #[arg(long, default_value_t = 0.2)]
        validation: f64,
        /// Write the best parameters as JSON
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Bars file (.csv or .json); a seeded random walk is used when omitted
    #[arg(long = "data", value_name = "PATH")]
    path: Option<PathBuf>,
    /// Number of random-walk bars
    #[arg(long, default_value_t = 2_000)]
    bars: usize,
    /// Random-walk seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Replace the input signals with the RSI/EMA/MACD consensus
    #[arg(long)]
    generate_signals: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file; flags below override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Stop-loss distance as a fraction of the entry price
    #[arg(long)]
    stop_loss: Option<f64>,
    /// Take-profit distance as a fraction of the entry price
    #[arg(long)]
    take_profit: Option<f64>,
    /// Fixed share count per position
    #[arg(long, conflicts_with = "risk")]
    shares: Option<f64>,
    /// Fraction of the cash committed per position
    #[arg(long)]
    risk: Option<f64>,
    /// Fee rate of longs
    #[arg(long)]
    long_fee: Option<f64>,
    /// Borrow cost added to the fee rate of shorts
    #[arg(long)]
    short_fee_addon: Option<f64>,
    /// Starting cash
    #[arg(long)]
    initial_cash: Option<f64>,
    /// Do not record the per-bar realized P&L
    #[arg(long)]
    no_realized_pnl: bool,
}

#[derive(Args, Clone, Copy)]
struct MetricsArgs {
    /// Bars per year used to annualize ratios
    #[arg(long, default_value_t = BARS_PER_YEAR)]
    bars_per_year: f64,
    /// Annual risk-free rate
    #[arg(long, default_value_t = 0.0)]
    risk_free_rate: f64,
}

impl MetricsArgs {
    fn metrics(&self, report: &BacktestReport) -> Metrics {
        Metrics::with_report(report, self.bars_per_year, self.risk_free_rate)
    }
}

impl ConfigArgs {
    fn build(&self) -> Result<BacktestConfig> {
        let mut config = match &self.config {
            Some(path) => BacktestConfig::from_json_file(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?,
            None => BacktestConfig::default(),
        };

        if let Some(stop_loss) = self.stop_loss {
            config.stop_loss_pct = stop_loss;
        }
        if let Some(take_profit) = self.take_profit {
            config.take_profit_pct = take_profit;
        }
        if let Some(shares) = self.shares {
            config.sizing = SizingPolicy::Fixed(shares);
        }
        if let Some(risk) = self.risk {
            config.sizing = SizingPolicy::RiskProportional(risk);
        }
        if let Some(cash) = self.initial_cash {
            config.initial_cash = cash;
        }
        config.fees = FeeModel::new(
            self.long_fee.unwrap_or(config.fees.long_fee_rate()),
            self.short_fee_addon.unwrap_or(config.fees.short_fee_rate_addon()),
        )?;
        if self.no_realized_pnl {
            config.track_realized_pnl = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn load_bars(args: &DataArgs) -> Result<Vec<Bar>> {
    let bars = match &args.path {
        Some(path) if has_extension(path, "json") => JsonFile::new(path).load(),
        Some(path) => CsvFile::new(path).load(),
        None => RandomWalk {
            len: args.bars,
            seed: args.seed,
            ..Default::default()
        }
        .load(),
    }
    .context("Failed to load bars")?;
    info!("Loaded {} bars", bars.len());

    // a random walk carries no signal of its own
    if args.generate_signals || args.path.is_none() {
        return Ok(ConsensusSignals::default().apply(&bars)?);
    }
    Ok(bars)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn print_summary(label: &str, report: &BacktestReport, metrics: &Metrics) {
    println!("{}", "=".repeat(60));
    println!("{label}");
    println!("{}", "=".repeat(60));
    println!("Initial Cash: {:.2}", report.initial_cash());
    println!("Final Cash: {:.2}", report.final_cash());
    println!("Trades: {}", report.trades().count());
    println!("{metrics}");
}

fn run(
    data: DataArgs,
    config: ConfigArgs,
    metrics: MetricsArgs,
    output: Option<PathBuf>,
    plot: Option<PathBuf>,
) -> Result<()> {
    let config = config.build()?;
    let bars = Arc::from(load_bars(&data)?);

    let mut backtest = Backtest::new(bars, config)?;
    let report = backtest.run()?;
    print_summary("STRATEGY PERFORMANCE SUMMARY", &report, &metrics.metrics(&report));

    if let Some(path) = output {
        report
            .to_json_file(&path)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if let Some(path) = plot {
        draw(&report, path)?;
    }
    Ok(())
}

#[cfg(feature = "draws")]
fn draw(report: &BacktestReport, path: PathBuf) -> Result<()> {
    use sbt::draws::{Draw, DrawOptions, DrawOutput};

    let options = DrawOptions::default().draw_output(DrawOutput::from_path(path.clone()));
    Draw::with_report(report).with_options(options).plot()?;
    info!("Chart written to {}", path.display());
    Ok(())
}

#[cfg(not(feature = "draws"))]
fn draw(_report: &BacktestReport, _path: PathBuf) -> Result<()> {
    bail!("Charts need the `draws` feature")
}

/// One point of the search grid.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    stop_loss_pct: f64,
    take_profit_pct: f64,
    signals: ConsensusSignals,
}

/// Stop-loss, take-profit, RSI period and thresholds, EMA periods and MACD periods. Sizing and
/// fees come from the command line.
struct Grid;

impl ParameterCombination for Grid {
    type Output = Candidate;

    fn generate() -> Vec<Self::Output> {
        let stops = [0.02, 0.05, 0.10];
        let takes = [0.05, 0.10, 0.20];
        let rsi_periods = [7, 14, 21];
        let rsi_levels = [(70.0, 30.0), (75.0, 25.0)];
        let ema_periods = [(8, 21), (12, 26), (20, 50)];
        let macd_periods = [(8, 21, 7), (12, 26, 9), (16, 30, 12)];

        let mut grid = Vec::new();
        for &stop_loss_pct in &stops {
            for &take_profit_pct in &takes {
                for &rsi_period in &rsi_periods {
                    for &(rsi_overbought, rsi_oversold) in &rsi_levels {
                        for &(ema_short, ema_long) in &ema_periods {
                            for &(macd_fast, macd_slow, macd_signal) in &macd_periods {
                                grid.push(Candidate {
                                    stop_loss_pct,
                                    take_profit_pct,
                                    signals: ConsensusSignals {
                                        rsi_period,
                                        rsi_overbought,
                                        rsi_oversold,
                                        ema_short,
                                        ema_long,
                                        macd_fast,
                                        macd_slow,
                                        macd_signal,
                                    },
                                });
                            }
                        }
                    }
                }
            }
        }
        grid
    }
}

fn configure(config: &BacktestConfig, candidate: &Candidate) -> (ConsensusSignals, BacktestConfig) {
    let config = BacktestConfig {
        stop_loss_pct: candidate.stop_loss_pct,
        take_profit_pct: candidate.take_profit_pct,
        ..*config
    };
    (candidate.signals, config)
}

fn optimize(
    data: DataArgs,
    config: ConfigArgs,
    metrics: MetricsArgs,
    (train, test, validation): (f64, f64, f64),
    output: Option<PathBuf>,
) -> Result<()> {
    let config = config.build()?;
    let bars = load_bars(&data)?;
    let (train_bars, test_bars, validation_bars) = split_train_test(&bars, train, test, validation)?;
    info!(
        "Split: {} train, {} test, {} validation bars",
        train_bars.len(),
        test_bars.len(),
        validation_bars.len()
    );

    let optimizer = Optimizer::<Grid>::new(Arc::from(train_bars), config);
    let results = optimizer.with(
        |data, config, params| {
            let (signals, config) = configure(config, params);
            Ok((Arc::from(signals.apply(data)?), config))
        },
        |report| metrics.metrics(report).calmar_ratio(),
    )?;
    let (candidate, score) = best(&results).ok_or_else(|| anyhow!("No combination has a finite Calmar ratio"))?;

    println!("Best parameters (train Calmar {score:.4}):");
    println!(
        "  stop_loss_pct = {}, take_profit_pct = {}",
        candidate.stop_loss_pct, candidate.take_profit_pct
    );
    println!("  {:?}", candidate.signals);

    let (signals, best_config) = configure(&config, candidate);
    for (label, split) in [("TEST", test_bars), ("VALIDATION", validation_bars)] {
        if split.is_empty() {
            continue;
        }
        let report = run_backtest(Arc::from(signals.apply(split)?), best_config)?;
        print_summary(label, &report, &metrics.metrics(&report));
    }

    if let Some(path) = output {
        let json = serde_json::json!({
            "calmar_ratio": score,
            "signals": signals,
            "config": best_config,
        });
        std::fs::write(&path, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("Failed to write parameters: {}", path.display()))?;
        info!("Parameters written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let Cli { command } = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match command {
        Commands::Run {
            data,
            config,
            metrics,
            output,
            plot,
        } => run(data, config, metrics, output, plot),
        Commands::Optimize {
            data,
            config,
            metrics,
            train,
            test,
            validation,
            output,
        } => {
            if data.path.is_some() && !data.generate_signals {
                bail!("`optimize` regenerates signals; pass --generate-signals to confirm");
            }
            optimize(data, config, metrics, (train, test, validation), output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_every_indicator() {
        let grid = Grid::generate();
        assert_eq!(grid.len(), 3 * 3 * 3 * 2 * 3 * 3);

        let distinct = |f: fn(&Candidate) -> usize| {
            let mut values = grid.iter().map(f).collect::<Vec<_>>();
            values.sort_unstable();
            values.dedup();
            values.len()
        };
        assert_eq!(distinct(|c| c.signals.rsi_period), 3);
        assert_eq!(distinct(|c| c.signals.ema_short), 3);
        assert_eq!(distinct(|c| c.signals.macd_fast), 3);
        assert_eq!(distinct(|c| c.signals.macd_signal), 3);

        assert!(grid.iter().all(|c| {
            c.signals.ema_short < c.signals.ema_long
                && c.signals.macd_fast < c.signals.macd_slow
                && c.signals.rsi_oversold < c.signals.rsi_overbought
        }));
    }

    #[test]
    fn configure_keeps_sizing_and_fees() {
        let base = BacktestConfig {
            sizing: SizingPolicy::RiskProportional(0.1),
            ..Default::default()
        };
        let candidate = Grid::generate()[0];
        let (signals, config) = configure(&base, &candidate);

        assert_eq!(signals, candidate.signals);
        assert_eq!(config.stop_loss_pct, candidate.stop_loss_pct);
        assert_eq!(config.take_profit_pct, candidate.take_profit_pct);
        assert_eq!(config.sizing, base.sizing);
        assert_eq!(config.fees, base.fees);
    }
}
