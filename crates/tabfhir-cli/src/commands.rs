//! Command implementations

use crate::ConfigFormat;
use crate::output::{ConvertSummary, print_issues};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tabfhir_core::{
    ConfigLoader, Converter, IdGenerator, ResultExt, SequentialIdGenerator, TabfhirConfig,
    UuidGenerator, load_input,
};
use tracing::{debug, info};

/// Convert every requested subject and write one bundle file each
///
/// Failed subjects are logged and skipped; the command fails once all
/// other subjects have been written.
pub fn convert_command(
    input: &Path,
    output: &Path,
    subjects: Vec<usize>,
    deterministic_ids: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = ConfigLoader::load(config_path, Some(input))?;
    let data = load_input(input, &config.input_config())?;
    let output_config = config.output_config();

    let available = data.subject_count();
    let subjects = if subjects.is_empty() {
        (0..available).collect()
    } else {
        if let Some(missing) = subjects.iter().find(|&&subject| subject >= available) {
            bail!("Subject {missing} out of range (input has {available} subjects)");
        }
        subjects
    };

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let converter = Converter::from_config(&config);
    info!("Converting {} subject(s)", subjects.len());

    let outcomes: Vec<_> = subjects
        .par_iter()
        .map(|&subject| {
            let mut ids: Box<dyn IdGenerator> = if deterministic_ids {
                Box::new(SequentialIdGenerator::new(subject as u64))
            } else {
                Box::new(UuidGenerator)
            };
            converter.convert_subject(&data, subject, ids.as_mut())
        })
        .collect();

    let mut summary = ConvertSummary::new(subjects.len());
    for outcome in outcomes {
        let Some(outcome) = outcome.log_and_continue() else {
            summary.failed += 1;
            continue;
        };

        let target = output.join(output_config.file_name_for(outcome.subject));
        let json = outcome
            .bundle
            .to_json_string(output_config.pretty())
            .context("Failed to serialize bundle")?;
        fs::write(&target, json)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        debug!("Wrote {}", target.display());

        summary.record(&outcome.stats);
    }

    summary.print();
    if summary.has_failures() {
        bail!(
            "{} of {} subject(s) failed to convert",
            summary.failed,
            summary.subjects
        );
    }
    Ok(())
}

/// Validate input without converting
pub fn check_command(input: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(config_path, Some(input))?;
    let data = load_input(input, &config.input_config())?;

    println!(
        "Checking {} definitions, {} links, {} fields",
        data.definitions.len(),
        data.links.len(),
        data.fields.len()
    );

    let errors = print_issues(&data.validate());
    if errors > 0 {
        bail!("{errors} error(s) found in {}", input.display());
    }
    Ok(())
}

/// Write a default configuration file
pub fn config_init_command(format: ConfigFormat, dir: Option<PathBuf>, force: bool) -> Result<()> {
    let filename = match format {
        ConfigFormat::Json => ".tabfhirrc.json",
        ConfigFormat::Toml => ".tabfhirrc.toml",
    };
    let config_path = dir.unwrap_or_else(|| PathBuf::from(".")).join(filename);

    if config_path.exists() && !force {
        bail!(
            "Configuration file '{}' already exists. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = TabfhirConfig::with_defaults();
    let content = match format {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(&config).context("Failed to serialize JSON")?
        }
        ConfigFormat::Toml => toml::to_string_pretty(&config).context("Failed to serialize TOML")?,
    };
    fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!(
        "{} Created {}",
        "✓".green(),
        config_path.display().to_string().bold()
    );
    Ok(())
}

/// Print the resolved configuration as JSON
pub fn config_show_command(config_path: Option<&Path>, start: Option<&Path>) -> Result<()> {
    let config = ConfigLoader::load(config_path, start)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Print the configuration JSON Schema
pub fn config_schema_command() -> Result<()> {
    let schema = schemars::schema_for!(TabfhirConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
