//! `kiln cache` subcommands for the stored build graph.

use std::error::Error;
use std::path::{Path, PathBuf};

use kiln_cache::{read_head, BuildGraphCache, CacheStatus};
use kiln_config::{load_config, load_config_file, ProjectConfig};
use kiln_persist::HeadData;
use tracing::debug;

use crate::{CheckArgs, GlobalArgs, HeadArgs, ReportFormat};

/// Exit code of `kiln cache check` for a stale graph.
pub const EXIT_STALE: i32 = 2;

/// Exit code of `kiln cache check` when no graph is stored.
pub const EXIT_ABSENT: i32 = 3;

/// Runs `kiln cache head`.
pub fn head(args: &HeadArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let path = match &args.file {
        Some(file) => file.clone(),
        None => configured_cache(global)?.graph_path(),
    };
    let head = read_head(&path)?
        .ok_or_else(|| format!("no build graph found at {}", path.display()))?;
    println!("{}", render_head(&head, args.format)?);
    Ok(0)
}

/// Runs `kiln cache check`.
pub fn check(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let (config, project_dir) = project_config(global)?;
    let cache = match &args.file {
        Some(file) => cache_for_file(file, &config),
        None => cache_from_config(&config, &project_dir),
    };
    let path = cache.graph_path();
    let (code, message) = match cache.check()? {
        CacheStatus::Fresh => (0, format!("{} is up to date", path.display())),
        CacheStatus::Stale(reason) => (EXIT_STALE, format!("{} is stale: {reason}", path.display())),
        CacheStatus::Absent => (EXIT_ABSENT, format!("no build graph at {}", path.display())),
    };
    if !global.quiet {
        eprintln!("{message}");
    }
    Ok(code)
}

/// Runs `kiln cache clean`.
pub fn clean(global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let cache = configured_cache(global)?;
    let removed = cache.remove()?;
    if !global.quiet {
        if removed {
            eprintln!("     Removed {}", cache.graph_path().display());
        } else {
            eprintln!("     Nothing to remove at {}", cache.graph_path().display());
        }
    }
    Ok(0)
}

/// Loads the configuration selected by `--config`, or `kiln.toml` in the
/// current directory, along with the directory it belongs to.
fn project_config(global: &GlobalArgs) -> Result<(ProjectConfig, PathBuf), Box<dyn Error>> {
    match &global.config {
        Some(path) => {
            let config = load_config_file(path)?;
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((config, dir))
        }
        None => {
            let dir = std::env::current_dir()?;
            Ok((load_config(&dir)?, dir))
        }
    }
}

fn configured_cache(global: &GlobalArgs) -> Result<BuildGraphCache, Box<dyn Error>> {
    let (config, project_dir) = project_config(global)?;
    Ok(cache_from_config(&config, &project_dir))
}

fn cache_from_config(config: &ProjectConfig, project_dir: &Path) -> BuildGraphCache {
    let settings = &config.cache;
    debug!(dir = %settings.cache_dir(project_dir).display(), file = %settings.file, "using configured cache");
    BuildGraphCache::new(
        &settings.cache_dir(project_dir),
        &settings.file,
        config.head_data(),
    )
    .with_write_buffer(settings.write_buffer_bytes())
}

fn cache_for_file(file: &Path, config: &ProjectConfig) -> BuildGraphCache {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    BuildGraphCache::new(dir, &name, config.head_data())
}

fn render_head(head: &HeadData, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(&head.project_config),
        ReportFormat::Text => Ok(head
            .project_config
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}
