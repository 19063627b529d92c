use clap::Parser;
use mipmap_bench::{decode_file, Benchmark, Error, GpuContext, PixelDepth};
use std::path::PathBuf;
#[cfg(feature = "debug")]
use renderdoc::{RenderDoc, V110};

/// Times blit, per-level compute and subgroup compute mipmap generation and
/// writes the resulting pyramids as atlases.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Image to build the pyramids from
    image_path: PathBuf,
    /// Directory receiving blit.png, compute_per_level_barriers.png and compute_subgroup.png
    output_dir: PathBuf,
}

fn run(args: &Args) -> Result<(), Error> {
    let image = decode_file(&args.image_path, PixelDepth::U8)?;
    let ctx = GpuContext::new()?;
    let mut benchmark = Benchmark::new(&ctx, &image)?;
    let report = benchmark.run(&args.output_dir)?;
    print!("{}", report);
    Ok(())
}

fn main() {
    // exits with a usage message before any device work on bad arguments
    let args = Args::parse();
    env_logger::init();

    #[cfg(feature = "debug")]
    let mut rd: Option<RenderDoc<V110>> = RenderDoc::new()
        .map_err(|e| log::warn!("RenderDoc is not available: {}", e))
        .ok();
    #[cfg(feature = "debug")]
    if let Some(rd) = rd.as_mut() {
        rd.start_frame_capture(std::ptr::null(), std::ptr::null());
    }

    let result = run(&args);

    #[cfg(feature = "debug")]
    if let Some(rd) = rd.as_mut() {
        rd.end_frame_capture(std::ptr::null(), std::ptr::null());
    }

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
