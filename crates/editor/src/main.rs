use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use te3_editor::export::ExportOptions;
use te3_editor::loader::FsLoader;
use te3_editor::map_man::MapMan;
use te3_editor::settings::{SETTINGS_FILE, Settings};
use te3_engine::assets::AssetCache;
use te3_engine::world::{Extent, MAX_VOLUME};

/// Command-line front end for te3 maps.
#[derive(Parser)]
#[command(name = "te3", version, about)]
struct Cli {
    /// Settings file (JSON). Missing or unreadable files give the defaults.
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    settings: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Write an empty map.
    New {
        out: PathBuf,
        /// Width, height and length in cells.
        #[arg(long, num_args = 3, value_names = ["W", "H", "L"])]
        size: Option<Vec<usize>>,
    },
    /// Print a map's dimensions and contents.
    Info { map: PathBuf },
    /// Load a `.te3` or legacy `.ti` map and save it as `.te3`.
    Convert { input: PathBuf, out: PathBuf },
    /// Export a map as `.gltf` or `.glb`, chosen by the extension of `out`.
    Export {
        map: PathBuf,
        out: PathBuf,
        /// One node and mesh per texture.
        #[arg(long)]
        separate: bool,
        /// Keep faces hidden between neighboring tiles.
        #[arg(long)]
        no_cull: bool,
    },
    /// Crop a map to its contents.
    Shrink {
        map: PathBuf,
        /// Write the result here instead of overwriting the map.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli.settings);
    let cache = Rc::new(AssetCache::new(FsLoader::from_settings(&settings)));
    let mut map = MapMan::new(cache, settings.default_extent(), settings.undo_max);

    match cli.cmd {
        Cmd::New { out, size } => {
            let extent = match size.as_deref() {
                Some(&[w, h, l]) => Extent::new(w, h, l),
                _ => settings.default_extent(),
            };
            ensure!(
                extent.is_allocatable(),
                "a {}x{}x{} map exceeds the {} cell limit",
                extent.width,
                extent.height,
                extent.length,
                MAX_VOLUME
            );
            map.new_map(extent);
            map.save(&out)?;
        }
        Cmd::Info { map: path } => {
            load(&mut map, &path)?;
            print_info(&map, &path);
        }
        Cmd::Convert { input, out } => {
            load(&mut map, &input)?;
            map.save(&out)?;
        }
        Cmd::Export { map: path, out, separate, no_cull } => {
            load(&mut map, &path)?;
            let mut options = ExportOptions::from_settings(&settings);
            options.separate_geometry |= separate;
            options.cull_faces &= !no_cull;
            map.export(&out, &options)?;
        }
        Cmd::Shrink { map: path, out } => {
            load(&mut map, &path)?;
            let before = map.extent();
            if !map.shrink_map() {
                tracing::info!("Nothing to shrink");
            }
            let after = map.extent();
            tracing::info!(
                "{}x{}x{} -> {}x{}x{}",
                before.width,
                before.height,
                before.length,
                after.width,
                after.height,
                after.length
            );
            map.save(out.as_deref().unwrap_or(&path))?;
        }
    }
    Ok(())
}

fn load(map: &mut MapMan, path: &Path) -> Result<()> {
    map.load(path).with_context(|| format!("opening {}", path.display()))
}

fn print_info(map: &MapMan, path: &Path) {
    let extent = map.extent();
    println!("{}", path.display());
    println!("  size      {} x {} x {}", extent.width, extent.height, extent.length);
    println!("  tiles     {} of {}", map.tiles().occupied_count(), extent.volume());
    println!("  ents      {}", map.ents().count());
    println!("  textures  {}", map.assets().texture_count());
    for path in map.assets().texture_paths() {
        println!("    {}", path.display());
    }
    println!("  shapes    {}", map.assets().model_count());
    for path in map.assets().model_paths() {
        println!("    {}", path.display());
    }
}
