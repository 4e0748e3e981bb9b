use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use groovescan::config::AppConfig;
use groovescan::container::{
    DrumTrackExtendedFeatureData, DrumTrackExtendedFeatureDataBuilder, DrumTrackFeatureData,
    DrumTrackFeatureDataBuilder, ExtendedBuildOptions, TrackHints,
};
use groovescan::events::{BarTrack, PartTrack};
use groovescan::patterns::anchors::AnchorReference;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "groovescan", version, about = "Drum performance feature extractor")]
struct Cli {
    /// Config file (defaults to ~/.config/groovescan/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Number of parallel workers (0 = auto-detect from config)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    jobs: usize,

    #[command(subcommand)]
    command: Commands,
}

/// Event source, ruler and hints shared by `extract` and `analyze`.
#[derive(Args)]
struct InputArgs {
    /// Part track JSON: {"notes": [{note_number, absolute_time_ticks, duration_ticks, velocity}, ...]}
    part: PathBuf,

    /// Bar ruler JSON: {"bars": [{bar_number, start_tick, length_ticks, beats_per_bar}, ...]}
    #[arg(long, conflicts_with = "bars")]
    ruler: Option<PathBuf>,

    /// Number of bars for a uniform ruler (default: enough to cover every note)
    #[arg(long)]
    bars: Option<u32>,

    /// Beats per bar for a uniform ruler
    #[arg(long, default_value = "4")]
    beats_per_bar: u32,

    /// Ticks per quarter note for a uniform ruler
    #[arg(long, default_value = "480")]
    ticks_per_quarter: u32,

    /// Grid slots per bar (overrides config)
    #[arg(long)]
    grid: Option<u32>,

    /// Genre hint
    #[arg(long)]
    genre: Option<String>,

    /// Artist hint
    #[arg(long)]
    artist: Option<String>,

    /// Tempo hint in BPM
    #[arg(long)]
    tempo: Option<f64>,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build base features (fingerprints, stats, role matrices) for a drum part
    Extract {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Build base features plus pattern and performance analysis
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        /// Skip cross-role coordination
        #[arg(long)]
        no_cross_role: bool,

        /// Skip anchor extraction
        #[arg(long)]
        no_anchors: bool,

        /// Skip structural markers
        #[arg(long)]
        no_structural: bool,

        /// Skip velocity and timing analysis
        #[arg(long)]
        no_performance: bool,

        /// Anchor reference style to compare against (e.g. PopRockBasic)
        #[arg(long)]
        reference: Option<String>,
    },

    /// Summarize a serialized feature file
    Inspect {
        /// Feature JSON produced by `extract` or `analyze`
        path: PathBuf,
    },

    /// Show the note → role table
    Roles,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Explicit --config must load; the default location is optional
    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path).context("Failed to load config")?,
        None => AppConfig::load(),
    };

    let workers = if cli.jobs > 0 { cli.jobs } else { config.resolve_workers() };
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .context("Failed to create thread pool")?;
    log::debug!("Using {} workers", workers);

    match cli.command {
        Commands::Extract { input } => {
            let data = build_base(&input, &config)?;
            let text = groovescan::serialize::serialize(&data, input.compact)
                .context("Serialization failed")?;
            write_output(input.output.as_deref(), &text)?;
            if input.output.is_some() {
                println!(
                    "Extracted {}: {} bars, {} events, {} roles",
                    data.track_id,
                    data.total_bars,
                    data.event_count(),
                    data.active_roles.len()
                );
            }
        }

        Commands::Analyze {
            input,
            no_cross_role,
            no_anchors,
            no_structural,
            no_performance,
            reference,
        } => {
            let mut options = ExtendedBuildOptions::from_config(&config)
                .context("Invalid [extended] config")?;
            options.include_cross_role &= !no_cross_role;
            options.include_anchors &= !no_anchors;
            options.include_structural &= !no_structural;
            options.include_performance &= !no_performance;
            if let Some(name) = reference {
                let reference = AnchorReference::builtin(&name)
                    .with_context(|| format!("Unknown anchor reference \"{}\"", name))?;
                options.anchor_reference = Some(reference);
            }

            let base = build_base(&input, &config)?;
            let data = DrumTrackExtendedFeatureDataBuilder::new().build(base, &options);
            let text = groovescan::serialize::serialize(&data, input.compact)
                .context("Serialization failed")?;
            write_output(input.output.as_deref(), &text)?;
            if input.output.is_some() {
                print_extended_summary(&data);
            }
        }

        Commands::Inspect { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match groovescan::serialize::deserialize::<DrumTrackExtendedFeatureData>(&text) {
                Ok(data) => print_extended_summary(&data),
                Err(_) => {
                    let data: DrumTrackFeatureData = groovescan::serialize::deserialize(&text)
                        .with_context(|| format!("Failed to parse {}", path.display()))?;
                    print_base_summary(&data);
                }
            }
        }

        Commands::Roles => {
            println!("{:<12} {:>7}  {}", "Role", "Primary", "Notes");
            println!("{}", "-".repeat(50));
            for role in groovescan::events::roles::all_roles() {
                let notes = groovescan::events::roles::notes_for_role(role);
                let primary = notes
                    .first()
                    .is_some_and(|&n| groovescan::events::roles::is_primary_role(n));
                let list: Vec<String> = notes.iter().map(|n| n.to_string()).collect();
                println!(
                    "{:<12} {:>7}  {}",
                    role,
                    if primary { "yes" } else { "" },
                    list.join(", ")
                );
            }
            println!();
            println!(
                "Other notes map to \"{}<note>\"",
                groovescan::events::roles::UNKNOWN_ROLE_PREFIX
            );
        }
    }

    Ok(())
}

/// Load the part and ruler, then run the base builder.
fn build_base(input: &InputArgs, config: &AppConfig) -> Result<DrumTrackFeatureData> {
    let part_text = std::fs::read_to_string(&input.part)
        .with_context(|| format!("Failed to read {}", input.part.display()))?;
    let part: PartTrack = serde_json::from_str(&part_text)
        .with_context(|| format!("Failed to parse {}", input.part.display()))?;
    let part = PartTrack::new(part.notes);

    let ruler = match &input.ruler {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let ruler: BarTrack = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            BarTrack::from_bars(ruler.bars().to_vec())
        }
        None => {
            let bar_ticks = input.ticks_per_quarter as i64 * input.beats_per_bar.max(1) as i64;
            let bars = input.bars.unwrap_or_else(|| {
                part.notes
                    .last()
                    .map(|n| (n.absolute_time_ticks.max(0) / bar_ticks.max(1)) as u32 + 1)
                    .unwrap_or(0)
            });
            BarTrack::uniform(bars, input.ticks_per_quarter, input.beats_per_bar)
        }
    };

    let hints = TrackHints {
        genre: input.genre.clone(),
        artist: input.artist.clone(),
        tempo_bpm: input.tempo,
    };

    let builder = DrumTrackFeatureDataBuilder::new(input.grid.unwrap_or(config.grid_resolution));
    let result = builder.build_with_validation(Some(&part), Some(&ruler), &hints);
    for msg in &result.messages {
        log::warn!("{}", msg);
    }
    result
        .data
        .with_context(|| format!("Build failed: {}", result.messages.join("; ")))
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

fn print_base_summary(data: &DrumTrackFeatureData) {
    println!("Track:   {} (schema {})", data.track_id, data.schema_version);
    println!(
        "Bars:    {} ({}/4 default, grid {})",
        data.total_bars, data.default_beats_per_bar, data.grid_resolution
    );
    println!("Events:  {}", data.event_count());
    if let Some(genre) = &data.genre_hint {
        println!("Genre:   {}", genre);
    }
    if let Some(artist) = &data.artist_hint {
        println!("Artist:  {}", artist);
    }
    if let Some(tempo) = data.tempo_estimate_bpm {
        println!("Tempo:   {:.1} BPM", tempo);
    }
    println!();

    println!("{:<14} {:>6} {:>8}  {}", "Role", "Hits", "Avg Vel", "Bar 1 slots");
    println!("{}", "-".repeat(60));
    for (role, matrix) in &data.role_matrices {
        let slots: Vec<String> = matrix
            .get_hit_positions(1)
            .iter()
            .map(|s| s.to_string())
            .collect();
        println!(
            "{:<14} {:>6} {:>8.1}  {}",
            role,
            matrix.hit_count(),
            matrix.get_average_velocity(),
            slots.join(" ")
        );
    }
}

fn print_extended_summary(data: &DrumTrackExtendedFeatureData) {
    print_base_summary(&data.base);
    println!();

    let rep = &data.pattern_repetition;
    println!(
        "Patterns: {} unique over {} bars ({:.0}% repeated)",
        rep.unique_pattern_count,
        rep.total_bars,
        rep.repetition_ratio * 100.0
    );
    if let Some(run) = rep.longest_run() {
        println!(
            "Longest run: bars {}-{} ({} bars, {})",
            run.start_bar, run.end_bar, run.length, run.pattern_hash
        );
    }
    println!(
        "Similarity: {} similar pairs, {} families, mean {:.3}",
        data.pattern_similarity.similar_pairs.len(),
        data.pattern_similarity.pattern_families.len(),
        data.pattern_similarity.average_similarity
    );
    println!(
        "Sequences: {} repeating 2-bar, {} repeating 4-bar",
        data.sequence_patterns.repeating(2).len(),
        data.sequence_patterns.repeating(4).len()
    );

    if !data.cross_role_coordination.is_empty() {
        println!();
        println!("{:<24} {:>6} {:>6}", "Pair", "Coinc", "Lock");
        println!("{}", "-".repeat(38));
        for (key, pair) in &data.cross_role_coordination.pairs {
            println!("{:<24} {:>6} {:>6.3}", key, pair.coincidence_count, pair.lock_score);
        }
    }

    if !data.anchor_candidates.is_empty() {
        println!();
        println!("Anchors:");
        for (role, anchors) in &data.anchor_candidates.candidates {
            let slots: Vec<String> = anchors.iter().map(|a| a.slot.to_string()).collect();
            println!("  {:<14} {}", role, slots.join(" "));
        }
        if let Some(cmp) = &data.anchor_candidates.reference_comparison {
            println!(
                "  vs {}: variance {:.3} ({} missing, {} extra)",
                cmp.reference_name,
                cmp.variance,
                cmp.missing.len(),
                cmp.extra.len()
            );
        }
    }

    let markers = &data.structural_markers;
    if !markers.is_empty() {
        println!();
        println!("Crash bars:     {:?}", markers.crash_bars);
        println!("Fill bars:      {:?}", markers.fill_candidates());
        println!("Breakdown bars: {:?}", markers.breakdown_candidates());
    }

    if !data.velocity_dynamics.is_empty() {
        println!();
        println!(
            "Dynamics: {} ghost notes ({:.1}%), {} accents",
            data.velocity_dynamics.ghost_notes.len(),
            data.velocity_dynamics.ghost_ratio() * 100.0,
            data.velocity_dynamics.accents.len()
        );
    }
    if !data.timing_feel.is_empty() {
        let feel = &data.timing_feel;
        println!(
            "Feel: {:?} ({:+.1} ticks), consistency {:.3}, swing {:.2}",
            feel.feel, feel.ahead_behind_score, feel.consistency_score, feel.swing_ratio
        );
    }
}
