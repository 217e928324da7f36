//! Command-line pricing and risk runner.
//!
//! ```text
//! ferricnote price --term-sheet FILE --paths N --seed S [--block-size B]
//!                  [--antithetic] [--steps-per-year N]
//! ferricnote risk  --term-sheet FILE --paths N --seed S [--block-size B]
//!                  [--spot-bump E] [--vol-bump E] [--include-rho] [--forward]
//! ```
//!
//! Results print as JSON on stdout. Exit codes: 0 success, 2 validation
//! error, 1 runtime error.

use std::process::ExitCode;

use ferricnote::core::PricingError;
use ferricnote::engines::{price, RunConfig};
use ferricnote::instruments::TermSheet;
use ferricnote::risk::{risk, BumpConfig, Differencing};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let outcome = match command.as_str() {
        "price" => run_price(&args[1..]),
        "risk" => run_risk(&args[1..]),
        "--help" | "-h" | "help" => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        other => {
            eprintln!("unknown command `{other}`\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match outcome {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}\n{USAGE}");
            ExitCode::from(2)
        }
        Err(CliError::Pricing(err)) => {
            eprintln!("error: {err}");
            match err {
                PricingError::InvalidSchema(_) | PricingError::InvalidDate(_) => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

const USAGE: &str = "usage:
  ferricnote price --term-sheet FILE --paths N --seed S [--block-size B] [--antithetic] [--steps-per-year N]
  ferricnote risk  --term-sheet FILE --paths N --seed S [--block-size B] [--spot-bump E] [--vol-bump E] [--include-rho] [--forward]";

enum CliError {
    Usage(String),
    Pricing(PricingError),
}

impl From<PricingError> for CliError {
    fn from(err: PricingError) -> Self {
        Self::Pricing(err)
    }
}

struct ParsedArgs {
    term_sheet: TermSheet,
    run_config: RunConfig,
    spot_bump: Option<f64>,
    vol_bump: Option<f64>,
    include_rho: bool,
    forward: bool,
}

fn parse_common(args: &[String]) -> Result<ParsedArgs, CliError> {
    let mut term_sheet_path: Option<String> = None;
    let mut paths: Option<usize> = None;
    let mut seed: Option<u64> = None;
    let mut block_size: Option<usize> = None;
    let mut steps_per_year: Option<u32> = None;
    let mut antithetic = false;
    let mut spot_bump = None;
    let mut vol_bump = None;
    let mut include_rho = false;
    let mut forward = false;

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value_for = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| CliError::Usage(format!("{name} requires a value")))
        };
        match flag.as_str() {
            "--term-sheet" => term_sheet_path = Some(value_for("--term-sheet")?),
            "--paths" => paths = Some(parse_number(&value_for("--paths")?, "--paths")?),
            "--seed" => seed = Some(parse_number(&value_for("--seed")?, "--seed")?),
            "--block-size" => {
                block_size = Some(parse_number(&value_for("--block-size")?, "--block-size")?)
            }
            "--steps-per-year" => {
                steps_per_year = Some(parse_number(
                    &value_for("--steps-per-year")?,
                    "--steps-per-year",
                )?)
            }
            "--antithetic" => antithetic = true,
            "--spot-bump" => spot_bump = Some(parse_number(&value_for("--spot-bump")?, "--spot-bump")?),
            "--vol-bump" => vol_bump = Some(parse_number(&value_for("--vol-bump")?, "--vol-bump")?),
            "--include-rho" => include_rho = true,
            "--forward" => forward = true,
            other => return Err(CliError::Usage(format!("unknown flag `{other}`"))),
        }
    }

    let term_sheet_path =
        term_sheet_path.ok_or_else(|| CliError::Usage("--term-sheet is required".to_string()))?;
    let paths = paths.ok_or_else(|| CliError::Usage("--paths is required".to_string()))?;
    let seed = seed.ok_or_else(|| CliError::Usage("--seed is required".to_string()))?;

    let json = std::fs::read_to_string(&term_sheet_path).map_err(|e| {
        CliError::Pricing(PricingError::InvalidSchema(format!(
            "cannot read term sheet `{term_sheet_path}`: {e}"
        )))
    })?;
    let term_sheet = TermSheet::from_json(&json)?;

    let mut run_config = RunConfig::new(paths, seed).with_antithetic(antithetic);
    if let Some(block) = block_size {
        run_config = run_config.with_block_size(block);
    }
    if let Some(steps) = steps_per_year {
        run_config = run_config.with_steps_per_year(steps);
    }

    Ok(ParsedArgs {
        term_sheet,
        run_config,
        spot_bump,
        vol_bump,
        include_rho,
        forward,
    })
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, CliError> {
    value
        .parse()
        .map_err(|_| CliError::Usage(format!("{flag}: cannot parse `{value}`")))
}

fn run_price(args: &[String]) -> Result<String, CliError> {
    let parsed = parse_common(args)?;
    let result = price(&parsed.term_sheet, &parsed.run_config)?;
    serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::Pricing(PricingError::NumericFailure(e.to_string())))
}

fn run_risk(args: &[String]) -> Result<String, CliError> {
    let parsed = parse_common(args)?;
    let defaults = BumpConfig::default();
    let bumps = BumpConfig {
        spot_bump: parsed.spot_bump.unwrap_or(defaults.spot_bump),
        vol_bump: parsed.vol_bump.unwrap_or(defaults.vol_bump),
        include_rho: parsed.include_rho,
        differencing: if parsed.forward {
            Differencing::Forward
        } else {
            Differencing::Central
        },
        ..defaults
    };
    let result = risk(&parsed.term_sheet, &parsed.run_config, &bumps)?;
    serde_json::to_string_pretty(&result)
        .map_err(|e| CliError::Pricing(PricingError::NumericFailure(e.to_string())))
}
