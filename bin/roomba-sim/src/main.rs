/*
 * Copyright (C) 2023 Asim Ihsan
 * SPDX-License-Identifier: AGPL-3.0-only
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU Affero General Public License as published by the Free
 * Software Foundation, version 3.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A
 * PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License along
 * with this program. If not, see <https://www.gnu.org/licenses/>
 */

//! Run the roomba simulation from the command line.
//!
//! A single run prints a JSON report with the final snapshot and one line per surviving roomba.
//! `--runs N` sweeps `N` consecutive seeds in parallel and prints one JSON line per seed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use roomba::{Coordination, Model, RoombaSummary, SimulationConfig, Snapshot};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "roomba-sim")]
#[command(author, version, about = "Cleaning robots on a grid", long_about = None)]
struct Cli {
    /// JSON file holding a simulation config. Flags override its fields.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed of the random source
    #[arg(long)]
    seed: Option<u64>,

    /// Grid width, border included
    #[arg(long)]
    width: Option<i32>,

    /// Grid height, border included
    #[arg(long)]
    height: Option<i32>,

    /// Number of roombas
    #[arg(short, long)]
    agents: Option<usize>,

    /// Fraction of the interior covered by obstacles
    #[arg(long)]
    rate_obstacles: Option<f64>,

    /// Fraction of the interior covered by trash
    #[arg(long)]
    rate_trash: Option<f64>,

    /// Tick budget
    #[arg(short, long)]
    max_steps: Option<u32>,

    /// Single-agent or multi-agent rules
    #[arg(long, value_enum)]
    coordination: Option<CoordinationArg>,

    /// Number of consecutive seeds to run in parallel
    #[arg(short, long, default_value_t = 1)]
    runs: u64,

    /// Print every per-tick snapshot of a single run instead of the report
    #[arg(long)]
    history: bool,

    /// Verbose output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CoordinationArg {
    Solo,
    Cooperative,
}

impl From<CoordinationArg> for Coordination {
    fn from(arg: CoordinationArg) -> Self {
        match arg {
            CoordinationArg::Solo => Coordination::Solo,
            CoordinationArg::Cooperative => Coordination::Cooperative,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    seed: u64,
    #[serde(flatten)]
    snapshot: Snapshot,
    roombas: Vec<RoombaSummary>,
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn build_config(cli: &Cli) -> Result<SimulationConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(width) = cli.width {
        config.width = width;
    }
    if let Some(height) = cli.height {
        config.height = height;
    }
    if let Some(agents) = cli.agents {
        config.num_agents = agents;
    }
    if let Some(rate) = cli.rate_obstacles {
        config.rate_obstacles = rate;
    }
    if let Some(rate) = cli.rate_trash {
        config.rate_trash = rate;
    }
    if let Some(max_steps) = cli.max_steps {
        config.max_steps = max_steps;
    }
    if let Some(coordination) = cli.coordination {
        config.coordination = coordination.into();
    }
    config.validate().context("invalid simulation config")?;
    Ok(config)
}

fn simulate(config: SimulationConfig) -> Result<Model> {
    let seed = config.seed;
    let mut model =
        Model::new(config).with_context(|| format!("failed to build world for seed {}", seed))?;
    model.run();
    Ok(model)
}

fn report(model: &Model) -> Result<RunReport> {
    let snapshot = *model.latest().context("model recorded no snapshot")?;
    Ok(RunReport {
        seed: model.config().seed,
        snapshot,
        roombas: model.roomba_summaries(),
    })
}

fn sweep(config: &SimulationConfig, runs: u64) -> Result<Vec<RunReport>> {
    (0..runs)
        .into_par_iter()
        .map(|offset| {
            let config = SimulationConfig {
                seed: config.seed.wrapping_add(offset),
                ..config.clone()
            };
            report(&simulate(config)?)
        })
        .collect()
}

fn level(verbose: u8) -> Level {
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(level(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli)?;
    info!(
        seed = config.seed,
        width = config.width,
        height = config.height,
        agents = config.num_agents,
        coordination = %config.coordination,
        runs = cli.runs,
        "starting"
    );

    if cli.runs > 1 {
        for report in sweep(&config, cli.runs)? {
            println!("{}", serde_json::to_string(&report)?);
        }
        return Ok(());
    }

    let model = simulate(config)?;
    if cli.history {
        println!("{}", model.collector().to_json()?);
    } else {
        println!("{}", serde_json::to_string_pretty(&report(&model)?)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("roomba-sim").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = build_config(&parse(&[])).expect("config");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--seed",
            "9",
            "--agents",
            "3",
            "--width",
            "12",
            "--coordination",
            "cooperative",
            "-vv",
        ]);
        assert_eq!(level(cli.verbose), Level::TRACE);
        let config = build_config(&cli).expect("config");
        assert_eq!(config.seed, 9);
        assert_eq!(config.num_agents, 3);
        assert_eq!(config.width, 12);
        assert_eq!(config.height, 8);
        assert_eq!(config.coordination, Coordination::Cooperative);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        assert!(build_config(&parse(&["--rate-trash", "1.5"])).is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let path = std::env::temp_dir().join(format!("roomba-sim-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"num_agents": 2, "max_steps": 40, "seed": 1}"#)
            .expect("write config");
        let cli = parse(&["--config", path.to_str().expect("utf-8 path"), "--seed", "5"]);
        let config = build_config(&cli);
        std::fs::remove_file(&path).expect("remove config");

        let config = config.expect("config");
        assert_eq!(config.num_agents, 2);
        assert_eq!(config.max_steps, 40);
        assert_eq!(config.seed, 5);
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["--config", "/nonexistent/roomba.json"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_sweep_is_ordered_and_reproducible() {
        let config = SimulationConfig {
            max_steps: 100,
            ..SimulationConfig::default()
        };
        let first = sweep(&config, 4).expect("sweep");
        let second = sweep(&config, 4).expect("sweep");

        let seeds: Vec<u64> = first.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![42, 43, 44, 45]);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.snapshot, b.snapshot);
            assert_eq!(a.roombas, b.roombas);
        }
    }
}
