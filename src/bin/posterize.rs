use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use image::imageops::FilterType;
use log::info;
use posterize_stencils::{
    AlphaMatte, CommandSegmenter, OutputPlan, PosterizeConfig, Segmenter, posterize,
};
use serde_json::json;

/// Reduce a cut-out image to K colors and write one stencil mask per color.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input image path
    image: PathBuf,

    /// Number of palette colors (K)
    #[arg(short = 'k', long = "colours", visible_alias = "colors", default_value_t = 3)]
    colours: usize,

    /// Resize factor applied after background removal
    #[arg(short, long, default_value_t = 1.0)]
    scalar: f32,

    /// Quantized image path. Defaults to `<stem>_processed_<K>.<ext>` next to the input.
    #[arg(short, long = "output-filename")]
    output_filename: Option<PathBuf>,

    /// Seed for k-means++ initialization
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Iteration cap per k-means run
    #[arg(long, default_value_t = 300)]
    max_iter: usize,

    /// Number of k-means restarts; the best one is kept
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// Resampling filter used by --scalar
    #[arg(long, value_enum, default_value_t = Filter::Nearest)]
    filter: Filter,

    /// Background removal command: reads a PNG on stdin, writes the cut-out PNG
    /// to stdout. Without it the input's own alpha channel is the matte.
    #[arg(long)]
    segmenter_cmd: Option<String>,

    /// Print a JSON summary of the palette and written files
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Filter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<Filter> for FilterType {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Nearest => FilterType::Nearest,
            Filter::Triangle => FilterType::Triangle,
            Filter::CatmullRom => FilterType::CatmullRom,
            Filter::Gaussian => FilterType::Gaussian,
            Filter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PosterizeConfig {
        colors: args.colours,
        scale: args.scalar,
        filter: args.filter.into(),
        seed: args.seed,
        max_iter: args.max_iter,
        runs: args.runs,
    };

    let img = image::open(&args.image)
        .with_context(|| format!("unable to open {}", args.image.display()))?
        .to_rgba8();

    let segmenter: Box<dyn Segmenter> = match &args.segmenter_cmd {
        Some(cmd) => Box::new(CommandSegmenter::from_command_line(cmd)?),
        None => Box::new(AlphaMatte),
    };

    let result = posterize(img, segmenter.as_ref(), &config).context("posterize failed")?;
    info!("palette: {:?}", result.palette_hex());

    let plan = OutputPlan::new(&args.image, args.colours, args.output_filename.as_deref());
    let written = plan.write(&result).context("writing output failed")?;

    if args.json {
        let summary = json!({
            "palette": result.palette_hex(),
            "quantized": written.quantized.display().to_string(),
            "masks": written
                .masks
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Saved → {}", written.quantized.display());
        for mask in &written.masks {
            println!("Saved → {}", mask.display());
        }
    }

    Ok(())
}
