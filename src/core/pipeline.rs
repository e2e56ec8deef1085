//! Build pipeline: map data + profile -> servable .osrm dataset
//!
//! Runs the external OSRM build stages strictly in sequence. Which stages run
//! depends on the algorithm: contraction datasets are extracted then
//! contracted, multi-level datasets are extracted, partitioned, and
//! customized. Compiled datasets are cached purely by output name.

use std::path::{Path, PathBuf};

use crate::core::dataset::{Algorithm, BehaviorProfile, MapDataset};
use crate::core::env::Environment;
use crate::core::error::{Error, Result};
use crate::core::process;

/// Per-build configuration
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Rebuild even if the output dataset already exists
    pub overwrite: bool,
    /// Additional flags forwarded verbatim to every build stage
    pub extra_args: Vec<String>,
}

/// Full file name suffix (everything from the first dot), so the staged copy
/// keeps the format OSRM sniffs from the extension
fn full_suffix(path: &Path) -> String {
    path.file_name()
        .and_then(|f| f.to_str())
        .and_then(|f| f.find('.').map(|dot| f[dot..].to_string()))
        .unwrap_or_default()
}

/// Compile a servable dataset for (map, profile, algorithm) under `name`
///
/// Returns the dataset path. If `{work_dir}/{name}.osrm` already exists and
/// overwrite was not requested, no stage runs and the existing path is
/// returned: the cache is keyed by name alone, so callers must not reuse a
/// name across different (map, profile, algorithm) combinations.
pub async fn build(
    env: &Environment,
    map: &MapDataset,
    profile: &BehaviorProfile,
    algorithm: Algorithm,
    name: &str,
    opts: &BuildOptions,
) -> Result<PathBuf> {
    let dataset_path = env.work_dir().join(format!("{name}.osrm"));

    if dataset_path.is_file() && !opts.overwrite {
        log::info!("Using existing dataset {}", dataset_path.display());
        return Ok(dataset_path);
    }

    env.prepare()?;

    // Stage the map under the scenario name so extract derives the right
    // output paths and the source file is never touched.
    let staged_map = env
        .work_dir()
        .join(format!("{name}{}", full_suffix(map.path())));
    tokio::fs::copy(map.path(), &staged_map).await?;

    log::info!(
        "Compiling dataset '{}' ({} + {}, {})",
        name,
        map.name(),
        profile.name(),
        algorithm
    );

    let toolchain = env.toolchain();
    let dataset_arg = dataset_path.display().to_string();

    let mut extract_args = vec![
        staged_map.display().to_string(),
        "-p".to_string(),
        profile.path().display().to_string(),
    ];
    extract_args.extend(opts.extra_args.iter().cloned());
    run_stage(env, "extract", &toolchain.extract, &extract_args).await?;

    match algorithm {
        Algorithm::Contraction => {
            let mut args = vec![dataset_arg];
            args.extend(opts.extra_args.iter().cloned());
            run_stage(env, "contract", &toolchain.contract, &args).await?;
        }
        Algorithm::MultiLevel => {
            let mut args = vec![dataset_arg.clone()];
            args.extend(opts.extra_args.iter().cloned());
            run_stage(env, "partition", &toolchain.partition, &args).await?;

            let mut args = vec![dataset_arg];
            args.extend(opts.extra_args.iter().cloned());
            run_stage(env, "customize", &toolchain.customize, &args).await?;
        }
    }

    Ok(dataset_path)
}

/// Run one build stage to completion; non-zero exit is a build failure
async fn run_stage(
    env: &Environment,
    stage: &'static str,
    program: &str,
    args: &[String],
) -> Result<()> {
    let status = process::run_to_completion(program, args, env.verbose()).await?;
    if !status.success() {
        return Err(Error::Build {
            stage,
            status: status.code(),
        });
    }
    Ok(())
}
