use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wlandiff_common::{
    load_config, ChangeStatus, ComparisonMetadata, ComparisonResult, MatchStrategy,
    ProjectVersion, UnchangedPolicy,
};
use wlandiff_core::{
    describe, merged_floors, render_floors, ComparisonArtifact, ComparisonEngine,
    VisualDiffRenderer,
};

#[derive(Parser)]
#[command(name = "wlandiff")]
#[command(author = "wlandiff Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Change report between two wireless network design snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two project snapshots (JSON-encoded project versions)
    Compare(CompareArgs),
}

#[derive(Args)]
struct CompareArgs {
    /// Old snapshot
    old: PathBuf,

    /// New snapshot
    new: PathBuf,

    /// Matching strategy: name, coordinates or combined
    #[arg(short, long)]
    strategy: Option<MatchStrategy>,

    /// Minimum displacement in meters reported as a move
    #[arg(short = 't', long)]
    move_threshold: Option<f64>,

    /// Same-location tolerance in meters for coordinate matching
    #[arg(long)]
    identity_radius: Option<f64>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show only changes (hide unchanged equipment)
    #[arg(short = 'd', long)]
    diff_only: bool,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,

    /// Disable ANSI colors in output
    #[arg(long)]
    no_color: bool,

    /// Write one visual diff PNG per changed floor into this directory
    #[arg(short, long)]
    render_dir: Option<PathBuf>,

    /// Draw unchanged equipment faintly on rendered plans
    #[arg(long)]
    faint_unchanged: bool,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare(args) => {
            if let Err(e) = run_compare(args) {
                error!("Comparison failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let loaded = load_config(args.config.as_deref())?;
    let mut config = loaded.config;
    if let Some(path) = loaded.path.as_ref().filter(|_| loaded.exists) {
        info!("Using config file: {}", path.display());
    }

    if let Some(strategy) = args.strategy {
        config.compare.match_strategy = strategy;
    }
    if let Some(threshold) = args.move_threshold {
        config.compare.move_threshold_m = threshold;
    }
    if let Some(radius) = args.identity_radius {
        config.compare.identity_radius_m = Some(radius);
    }
    if args.faint_unchanged {
        config.render.unchanged = UnchangedPolicy::Faint;
    }

    let old = read_project(&args.old)?;
    let new = read_project(&args.new)?;

    info!("Comparing:");
    info!("  Old: {} ({})", old.name, args.old.display());
    info!("  New: {} ({})", new.name, args.new.display());

    let engine = ComparisonEngine::new(config.compare.clone());
    let result = engine.compare(&old, &new, ComparisonMetadata::now(&old.name, &new.name))?;

    if let Some(dir) = &args.render_dir {
        let renderer = VisualDiffRenderer::new(config.render.clone());
        let floors = merged_floors(&old, &new);
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create render directory {}", dir.display()))?;

        let rendered_floors = render_floors(&renderer, &result, &floors);
        let names = render_file_names(rendered_floors.iter().map(|r| r.floor.as_str()));
        for (rendered, name) in rendered_floors.iter().zip(names) {
            let path = dir.join(name);
            rendered
                .image
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote visual diff for '{}' to {}", rendered.floor, path.display());
        }
    }

    if args.json {
        let mut artifact = ComparisonArtifact::from(&result);
        if args.diff_only {
            artifact = artifact.changes_only();
        }
        println!("{}", artifact.to_json()?);
        return Ok(());
    }

    let use_color = !args.no_color && std::io::stdout().is_terminal();
    print_report(&result, args.diff_only, use_color);
    Ok(())
}

/// Read a snapshot; relative plan-image paths resolve against the snapshot's directory
fn read_project(path: &Path) -> Result<ProjectVersion> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let mut project: ProjectVersion = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

    if let Some(base) = path.parent() {
        resolve_plan_paths(&mut project, base);
    }
    Ok(project)
}

fn resolve_plan_paths(project: &mut ProjectVersion, base: &Path) {
    for floor in &mut project.floors {
        if let Some(image) = floor.plan_image.as_mut() {
            if image.is_relative() {
                *image = base.join(&*image);
            }
        }
    }
}

fn print_report(result: &ComparisonResult, diff_only: bool, use_color: bool) {
    println!("\n{}", "=".repeat(80));
    println!(
        "Comparison Results: {} -> {}",
        result.metadata.project_a_name, result.metadata.project_b_name
    );
    println!("{}", "=".repeat(80));

    let mut current_floor: Option<&str> = None;
    for record in &result.changes {
        if diff_only && !record.is_change() {
            continue;
        }

        if current_floor != Some(record.floor.as_str()) {
            println!("\n[{}]", record.floor);
            current_floor = Some(record.floor.as_str());
        }

        let (color, reset) = if use_color {
            (status_color(record.status), "\x1b[0m")
        } else {
            ("", "")
        };

        let details = describe(record);
        if details.is_empty() {
            println!("{}{}{} {}", color, status_symbol(record.status), reset, record.name());
        } else {
            println!(
                "{}{}{} {}  {}",
                color,
                status_symbol(record.status),
                reset,
                record.name(),
                details
            );
        }
    }

    let summary = &result.summary;
    let mark = |status: ChangeStatus| {
        if use_color {
            format!("{}({}){}", status_color(status), status_symbol(status).trim(), "\x1b[0m")
        } else {
            format!("({})", status_symbol(status).trim())
        }
    };

    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  Old equipment:   {}", summary.old_total);
    println!("  New equipment:   {}", summary.new_total);
    println!("  Added:           {} {}", summary.added, mark(ChangeStatus::Added));
    println!("  Removed:         {} {}", summary.removed, mark(ChangeStatus::Removed));
    println!("  Modified:        {} {}", summary.modified, mark(ChangeStatus::Modified));
    println!("  Moved:           {} {}", summary.moved, mark(ChangeStatus::Moved));
    println!("  Renamed:         {} {}", summary.renamed, mark(ChangeStatus::Renamed));
    println!("  Unchanged:       {} {}", summary.unchanged, mark(ChangeStatus::Unchanged));
    if summary.old_skipped + summary.new_skipped > 0 {
        println!(
            "  Skipped:         {} old, {} new (malformed)",
            summary.old_skipped, summary.new_skipped
        );
    }
    println!("{}", "=".repeat(80));
}

fn status_symbol(status: ChangeStatus) -> &'static str {
    match status {
        ChangeStatus::Added => "  +  ",
        ChangeStatus::Removed => "  -  ",
        ChangeStatus::Modified => "  ~  ",
        ChangeStatus::Moved => "  >  ",
        ChangeStatus::Renamed => "  =  ",
        ChangeStatus::Unchanged => "     ",
    }
}

fn status_color(status: ChangeStatus) -> &'static str {
    match status {
        ChangeStatus::Added => "\x1b[32m",     // Green
        ChangeStatus::Removed => "\x1b[31m",   // Red
        ChangeStatus::Modified => "\x1b[33m",  // Yellow
        ChangeStatus::Moved => "\x1b[34m",     // Blue
        ChangeStatus::Renamed => "\x1b[35m",   // Magenta
        ChangeStatus::Unchanged => "\x1b[0m",
    }
}

/// Floor name reduced to characters safe in a file name
fn file_stem_for(floor: &str) -> String {
    let stem: String = floor
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "floor".to_string()
    } else {
        stem
    }
}

/// One `.png` name per floor; names that clean up identically get a numeric suffix
fn render_file_names<'a>(floors: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used = HashSet::new();
    floors
        .into_iter()
        .map(|floor| {
            let stem = file_stem_for(floor);
            let mut name = format!("{}.png", stem);
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{}-{}.png", stem, n);
                n += 1;
            }
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wlandiff_common::Floor;

    #[test]
    fn test_file_stem_for() {
        assert_eq!(file_stem_for("Ground Floor"), "Ground_Floor");
        assert_eq!(file_stem_for("L2/West"), "L2_West");
        assert_eq!(file_stem_for("B-1_east"), "B-1_east");
        assert_eq!(file_stem_for(""), "floor");
    }

    #[test]
    fn test_render_file_names_are_unique() {
        let names = render_file_names(["L 1", "L_1", "L/1", "Roof"]);
        assert_eq!(names, vec!["L_1.png", "L_1-2.png", "L_1-3.png", "Roof.png"]);

        let names = render_file_names(["A-2", "A", "A"]);
        assert_eq!(names, vec!["A-2.png", "A.png", "A-3.png"]);
    }

    #[test]
    fn test_resolve_plan_paths() {
        let mut project = ProjectVersion {
            name: "p".into(),
            floors: vec![
                Floor {
                    plan_image: Some(PathBuf::from("plans/l1.png")),
                    ..Floor::new("L1", Some(0.02))
                },
                Floor {
                    plan_image: Some(PathBuf::from("/abs/l2.png")),
                    ..Floor::new("L2", Some(0.02))
                },
                Floor::new("L3", None),
            ],
            equipment: vec![],
        };

        resolve_plan_paths(&mut project, Path::new("/data/site"));

        assert_eq!(
            project.floors[0].plan_image.as_deref(),
            Some(Path::new("/data/site/plans/l1.png"))
        );
        assert_eq!(
            project.floors[1].plan_image.as_deref(),
            Some(Path::new("/abs/l2.png"))
        );
        assert_eq!(project.floors[2].plan_image, None);
    }

    #[test]
    fn test_status_symbols_distinct() {
        let mut symbols: Vec<&str> = ChangeStatus::ALL.iter().map(|s| status_symbol(*s)).collect();
        symbols.sort();
        symbols.dedup();
        assert_eq!(symbols.len(), ChangeStatus::ALL.len());
    }

    #[test]
    fn test_cli_parses_compare() {
        let cli = Cli::try_parse_from([
            "wlandiff",
            "compare",
            "old.json",
            "new.json",
            "--strategy",
            "coordinates",
            "--move-threshold",
            "1.5",
            "--json",
        ])
        .unwrap();

        let Commands::Compare(args) = cli.command;
        assert_eq!(args.old, PathBuf::from("old.json"));
        assert_eq!(args.strategy, Some(MatchStrategy::Coordinates));
        assert_eq!(args.move_threshold, Some(1.5));
        assert!(args.json);
        assert!(!args.diff_only);
    }

    #[test]
    fn test_cli_rejects_unknown_strategy() {
        let parsed = Cli::try_parse_from(["wlandiff", "compare", "a.json", "b.json", "-s", "fuzzy"]);
        assert!(parsed.is_err());
    }
}
