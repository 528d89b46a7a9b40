use clap::{ArgAction, Parser, Subcommand};
use risum_mod::codec::{get_codec, CodecId};
use risum_mod::container::{self, split_frames};
use risum_mod::extract::{extract, Selection};
use risum_mod::ingest::{ingest_paths, original_fragments};
use risum_mod::merge::{validate_result, MergeOptions, DEFAULT_TOGGLE_GROUP_TITLE};
use risum_mod::package::{assemble, load_base_file, PackageOptions};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "risum-mod", about = "Merge mods into character cards and build RISUM modules")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge mod files (.json / .zip) into a .charx archive
    Merge {
        #[arg(short, long)]
        base: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Codec: rpack (default), zstd, none
        #[arg(short, long, default_value = "rpack")]
        codec: String,
        /// Skip the accessory module for card-shaped bases
        #[arg(long)]
        no_accessory: bool,
        /// Where to write the lorebook-stripped module (module bases only)
        #[arg(long)]
        toggle_module: Option<PathBuf>,
        /// Fragment names to leave out (original items listed here are removed)
        #[arg(long)]
        deselect: Vec<String>,
        /// Title of the mod toggle group
        #[arg(long, default_value = DEFAULT_TOGGLE_GROUP_TITLE)]
        toggle_title: String,
        /// Character name for the toggle menu
        #[arg(long)]
        character: Option<String>,
        #[arg(required = true, num_args = 1..)]
        mods: Vec<PathBuf>,
    },
    /// Encode a module JSON and asset files into a .risum container
    Pack {
        #[arg(short, long)]
        module: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value = "rpack")]
        codec: String,
        /// Asset files, in container order
        #[arg(short, long)]
        asset: Vec<PathBuf>,
    },
    /// Decode a .risum container into module.json and numbered assets
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long, default_value = "rpack")]
        codec: String,
    },
    /// Show the block layout of a .risum container
    Inspect {
        input: PathBuf,
        #[arg(short, long, default_value = "rpack")]
        codec: String,
    },
    /// List the fragments mod files provide
    List {
        #[arg(required = true, num_args = 1..)]
        mods: Vec<PathBuf>,
    },
    /// Turn lorebook entries and assets of a .charx into a mod pack
    Extract {
        #[arg(short, long)]
        base: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        lorebook: Vec<usize>,
        #[arg(long)]
        asset: Vec<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {

        // ── Merge ────────────────────────────────────────────────────────────
        Commands::Merge { base, output, codec, no_accessory, toggle_module, deselect, toggle_title, character, mods } => {
            let options = PackageOptions {
                codec: parse_codec(&codec),
                accessory_module: !no_accessory,
                merge: MergeOptions {
                    toggle_group_title: toggle_title,
                    character_name: character,
                    ..Default::default()
                },
                ..Default::default()
            };
            let loaded = load_base_file(&base, &options)?;

            let report = ingest_paths(mods.as_slice());
            for error in &report.errors {
                eprintln!("  skipped  {error}");
            }
            let mut fragments = original_fragments(&loaded.document);
            fragments.extend(report.fragments);
            for fragment in &mut fragments {
                if deselect.contains(&fragment.name) {
                    fragment.selected = false;
                }
            }

            let out = assemble(&loaded, &fragments, &options)?;
            for problem in validate_result(&out.outcome.document) {
                eprintln!("  warning  {problem}");
            }
            for id in &out.outcome.vetoed {
                println!("  vetoed   {id}");
            }
            fs::write(&output, &out.archive)?;

            let counts = &out.outcome.counts;
            println!(
                "Merged: {} lorebook, {} asset, {} regex, {} slot, {} removed",
                counts.lorebook, counts.asset, counts.regex, counts.slot, counts.removed_originals
            );
            println!("Created: {}", output.display());

            match (out.toggle_module, toggle_module) {
                (Some(bytes), Some(path)) => {
                    fs::write(&path, bytes)?;
                    println!("Toggle module: {}", path.display());
                }
                (None, Some(_)) => eprintln!("Base is not a module; no toggle module written"),
                _ => {}
            }
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { module, output, codec, asset } => {
            let value: Value = serde_json::from_slice(&fs::read(&module)?)?;
            // Accept either a bare module or an exported `{"module": ...}` wrapper.
            let body = match value.get("module") {
                Some(inner) if inner.is_object() => inner.clone(),
                _ => value,
            };
            let assets = asset.iter().map(fs::read).collect::<Result<Vec<_>, _>>()?;
            let bytes = container::encode(&body, &assets, get_codec(parse_codec(&codec)).as_ref())?;
            fs::write(&output, &bytes)?;
            println!("Created: {} ({} assets, {} B)", output.display(), assets.len(), bytes.len());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, codec } => {
            let decoded = container::read_from(fs::File::open(&input)?, get_codec(parse_codec(&codec)).as_ref())?;
            fs::create_dir_all(output_dir.join("assets"))?;
            fs::write(output_dir.join("module.json"), serde_json::to_vec_pretty(&decoded.module)?)?;
            for (i, data) in decoded.assets.iter().enumerate() {
                fs::write(output_dir.join("assets").join(format!("asset_{i}.bin")), data)?;
            }
            println!("Unpacked to: {} ({} assets)", output_dir.display(), decoded.assets.len());
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input, codec } => {
            let bytes = fs::read(&input)?;
            let framing = split_frames(&bytes)?;
            let codec = get_codec(parse_codec(&codec));

            println!("── RISUM container ──────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Size           {} B", bytes.len());
            println!("  Codec          {}", codec.codec_id());
            println!("  Main block     {} B at {}", framing.main.payload.len(), framing.main.offset);
            println!("  Terminated     {}", framing.terminated);
            println!("  Assets         {}", framing.assets.len());
            println!("{:>5} {:>10} {:>12} {:>12}  BLAKE3", "#", "Offset", "Encoded", "Decoded");
            for (i, frame) in framing.assets.iter().enumerate() {
                let data = codec.decode(frame.payload)?;
                let digest = blake3::hash(&data);
                println!(
                    "{:>5} {:>10} {:>12} {:>12}  {}",
                    i, frame.offset, frame.payload.len(), data.len(), hex::encode(&digest.as_bytes()[..8])
                );
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { mods } => {
            let report = ingest_paths(mods.as_slice());
            println!("{:<9} {:<40} {:>6}  Id", "Section", "Name", "Order");
            for f in &report.fragments {
                println!("{:<9} {:<40} {:>6}  {}", f.section().as_str(), f.name, f.order(), f.id);
            }
            for error in &report.errors {
                println!("  error    {error}");
            }
            println!("{} fragment(s), {} error(s)", report.fragments.len(), report.errors.len());
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { base, output, lorebook, asset } => {
            let loaded = load_base_file(&base, &PackageOptions::default())?;
            let bytes = extract(&loaded, &Selection { lorebook, asset })?;
            fs::write(&output, bytes)?;
            println!("Created: {}", output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_codec(s: &str) -> CodecId {
    CodecId::from_name(s).unwrap_or_else(|| {
        tracing::warn!(codec = s, "unknown codec, defaulting to rpack");
        CodecId::RPack
    })
}
