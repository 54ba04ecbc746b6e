//! `recmerge run` / `recmerge validate` — config-driven reconciliation and
//! survivorship merge.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use recmerge_recon::{Dataset, ReconConfig, ReconResult, Side};

use crate::exit_codes::{
    recon_exit_code, EXIT_RECON_AMBIGUOUS, EXIT_RECON_DIFFERENCES, EXIT_RECON_IO, EXIT_USAGE,
};
use crate::input::load_csv_dataset;
use crate::output::{write_outputs, RunReport, REVIEW_CSV};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Reconcile two datasets and write merged output per a TOML config
    #[command(after_help = "\
Examples:
  recmerge run students.recon.toml
  recmerge run students.recon.toml --out-dir out/ --json
  recmerge run students.recon.toml --source admissions.csv --target registry.csv
  recmerge run students.recon.toml --output result.json")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Source CSV (default: [inputs].source, relative to the config file)
        #[arg(long)]
        source: Option<PathBuf>,

        /// Target CSV (default: [inputs].target, relative to the config file)
        #[arg(long)]
        target: Option<PathBuf>,

        /// Directory for the CSV outputs and summary.json (default: `out/`
        /// next to the config file)
        #[arg(long, env = "RECMERGE_OUT_DIR")]
        out_dir: Option<PathBuf>,

        /// Output the full JSON result to stdout
        #[arg(long)]
        json: bool,

        /// Write the full JSON result to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  recmerge validate students.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, source, target, out_dir, json, output } => {
            cmd_recon_run(config, source, target, out_dir, json, output)
        }
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn load_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        recon_err(EXIT_RECON_IO, format!("cannot read config {}: {e}", config_path.display()))
    })?;
    ReconConfig::from_toml(&config_str).map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))
}

/// CLI flag first, then `[inputs]` resolved against the config directory.
fn resolve_input(
    side: Side,
    flag: Option<PathBuf>,
    config: &ReconConfig,
    base_dir: &Path,
) -> Result<PathBuf, CliError> {
    if let Some(path) = flag {
        return Ok(path);
    }
    let configured = config.inputs.as_ref().map(|inputs| match side {
        Side::Source => &inputs.source,
        Side::Target => &inputs.target,
    });
    match configured {
        Some(file) => Ok(base_dir.join(file)),
        None => Err(recon_err(EXIT_USAGE, format!("no {side} dataset given"))
            .with_hint(format!("pass --{side} or set [inputs].{side} in the config"))),
    }
}

fn load_side(path: &Path) -> Result<Dataset, CliError> {
    load_csv_dataset(path).map_err(|e| recon_err(EXIT_RECON_IO, e))
}

fn cmd_recon_run(
    config_path: PathBuf,
    source_flag: Option<PathBuf>,
    target_flag: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let source_path = resolve_input(Side::Source, source_flag, &config, base_dir)?;
    let target_path = resolve_input(Side::Target, target_flag, &config, base_dir)?;

    let source = load_side(&source_path)?;
    let target = load_side(&target_path)?;
    log::info!(
        "loaded {} source rows from {}, {} target rows from {}",
        source.len(),
        source_path.display(),
        target.len(),
        target_path.display()
    );

    let result = recmerge_recon::run(&config, &source, &target)
        .map_err(|e| recon_err(recon_exit_code(&e), e.to_string()))?;
    let run_at = chrono::Utc::now().to_rfc3339();

    let out_dir = out_dir.unwrap_or_else(|| base_dir.join("out"));
    let written = write_outputs(&out_dir, &result, &run_at)?;
    for path in &written {
        log::info!("wrote {}", path.display());
    }
    eprintln!("wrote {} files to {}", written.len(), out_dir.display());

    if json_output || output_file.is_some() {
        let report = RunReport { run_at, result: &result };
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| recon_err(EXIT_RECON_IO, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = output_file {
            std::fs::write(path, &json_str)
                .map_err(|e| recon_err(EXIT_RECON_IO, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }

        if json_output {
            println!("{json_str}");
        }
    }

    print_summary(&result);
    outcome(&result)
}

/// Human summary to stderr.
fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    eprintln!(
        "{}: {} source / {} target records; {} matched ({} exact, {} fuzzy), {} source-only, {} target-only, {} ambiguous",
        result.meta.config_name,
        s.source_records,
        s.target_records,
        s.matched,
        s.matched_exact,
        s.matched_fuzzy,
        s.source_only,
        s.target_only,
        s.ambiguous,
    );
    eprintln!(
        "fields: {} pairs with mismatches, {} conflicts resolved; merged {} records",
        s.pairs_with_mismatches, s.field_conflicts, s.merged_records,
    );
    if !s.mismatches_by_column.is_empty() {
        let by_column: Vec<String> = s
            .mismatches_by_column
            .iter()
            .map(|(column, n)| format!("{column}={n}"))
            .collect();
        eprintln!("mismatches by column: {}", by_column.join(", "));
    }
    if s.duplicate_keys.source + s.duplicate_keys.target > 0 {
        eprintln!(
            "duplicate keys: {} source, {} target (first occurrence paired)",
            s.duplicate_keys.source, s.duplicate_keys.target,
        );
    }
    if s.missing_key_rows.source + s.missing_key_rows.target > 0 {
        eprintln!(
            "rows without a key: {} source, {} target",
            s.missing_key_rows.source, s.missing_key_rows.target,
        );
    }
}

fn outcome(result: &ReconResult) -> Result<(), CliError> {
    let s = &result.summary;
    if s.has_differences() {
        return Err(recon_err(EXIT_RECON_DIFFERENCES, "differences found"));
    }
    if s.ambiguous > 0 {
        return Err(recon_err(
            EXIT_RECON_AMBIGUOUS,
            format!("{} ambiguous matches pending review", s.ambiguous),
        )
        .with_hint(format!("candidates are listed in {REVIEW_CSV}")));
    }
    Ok(())
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    let fuzzy = if config.fuzzy.enabled {
        format!(
            "fuzzy on ({}; threshold {}, margin {})",
            config.fuzzy.fields.join("+"),
            config.fuzzy.threshold,
            config.fuzzy.ambiguity_margin
        )
    } else {
        "fuzzy off".to_string()
    };
    eprintln!("{}: valid (key '{}', {})", config.name, config.key, fuzzy);
    Ok(())
}
