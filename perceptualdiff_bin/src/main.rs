use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use image::{Rgba, RgbaImage};
use perceptualdiff::{buffer_diff, compare, DiffMap, PdiffParams, PixelBuffer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Perceptual image comparison
///
/// Reports whether two images would look the same to a viewer, ignoring
/// differences below the threshold of visibility.
#[derive(Parser, Debug)]
#[command(name = "perceptualdiff")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXIT CODES:
    0 - Images match
    1 - Images are visibly different or their sizes differ
    2 - Error (file not found, invalid image, bad parameter)")]
struct Cli {
    /// First image
    #[arg(value_name = "IMAGE_A")]
    image_a: PathBuf,

    /// Second image
    #[arg(value_name = "IMAGE_B")]
    image_b: PathBuf,

    /// Display gamma
    #[arg(long, default_value_t = 2.2, value_name = "F")]
    gamma: f32,

    /// Display white luminance in cd/m²
    #[arg(long, default_value_t = 100.0, value_name = "CD_M2")]
    luminance: f32,

    /// Horizontal field of view covered by the image, in degrees
    #[arg(long, default_value_t = 45.0, value_name = "DEGREES")]
    fov: f32,

    /// Images match if fewer than this many pixels differ visibly
    #[arg(long, default_value_t = 100, value_name = "PIXELS")]
    threshold: usize,

    /// Print the parameters in effect and debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the map of visibly different pixels as PNG
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the exact per-channel difference image as PNG
    #[arg(long, value_name = "FILE")]
    exact_diff: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "perceptualdiff=debug"
    } else {
        "perceptualdiff=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the images match.
fn run(cli: &Cli) -> Result<bool> {
    let params = PdiffParams::default()
        .with_gamma(cli.gamma)
        .with_luminance(cli.luminance)
        .with_field_of_view(cli.fov)
        .with_threshold_pixels(cli.threshold)
        .with_compute_map(cli.output.is_some());
    params.validate()?;

    if cli.verbose {
        println!("Field of view is {} degrees", params.field_of_view());
        println!("Threshold pixels is {} pixels", params.threshold_pixels());
        println!("The gamma is {}", params.gamma());
        println!(
            "The display's luminance is {} candela per meter squared",
            params.luminance()
        );
    }

    let img_a = load_argb(&cli.image_a)?;
    let img_b = load_argb(&cli.image_b)?;
    if img_a.dimensions() != img_b.dimensions() {
        tracing::debug!(a = ?img_a.dimensions(), b = ?img_b.dimensions(), "size mismatch");
        println!("FAIL: Image dimensions do not match");
        return Ok(false);
    }
    let a = img_a.buffer()?;
    let b = img_b.buffer()?;

    if let Some(path) = &cli.exact_diff {
        let diff = buffer_diff(&a, &b)?;
        if cli.verbose {
            println!(
                "{} pixels changed, maximum channel difference {}",
                diff.pixels_changed, diff.max_diff
            );
        }
        save_exact_diff(&diff.image, img_a.width, img_a.height, path)?;
    }

    let verdict = compare(&a, &b, &params)?;

    if verdict.binary_identical {
        println!("PASS: Images are binary identical");
    } else if verdict.matches {
        println!("PASS: Images are perceptually indistinguishable");
    } else {
        println!("FAIL: Images are visibly different");
        println!("{} pixels are different", verdict.pixels_failed);
    }

    if let (Some(path), Some(map)) = (&cli.output, &verdict.map) {
        save_map(map, path)?;
    }

    Ok(verdict.matches)
}

/// A decoded image as premultiplied native-endian ARGB words.
struct ArgbImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ArgbImage {
    const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn buffer(&self) -> Result<PixelBuffer<'_>> {
        Ok(PixelBuffer::packed(
            &self.data,
            self.width as usize,
            self.height as usize,
        )?)
    }
}

fn load_argb(path: &Path) -> Result<ArgbImage> {
    let rgba = image::open(path)
        .with_context(|| format!("failed to load '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();

    let data = rgba
        .pixels()
        .flat_map(|&Rgba([r, g, b, a])| {
            let premul = |c: u8| (u32::from(c) * u32::from(a) + 127) / 255;
            let word = u32::from(a) << 24 | premul(r) << 16 | premul(g) << 8 | premul(b);
            word.to_ne_bytes()
        })
        .collect();

    Ok(ArgbImage {
        data,
        width,
        height,
    })
}

fn save_map(map: &DiffMap, path: &Path) -> Result<()> {
    let raw = map
        .as_slice()
        .iter()
        .flat_map(|&failed| {
            if failed {
                [255, 0, 0, 255]
            } else {
                [0, 0, 0, 255]
            }
        })
        .collect();
    let img = RgbaImage::from_raw(map.width() as u32, map.height() as u32, raw)
        .context("map image size")?;
    img.save(path)
        .with_context(|| format!("failed to save map to '{}'", path.display()))
}

fn save_exact_diff(pixels: &[u32], width: u32, height: u32, path: &Path) -> Result<()> {
    let raw = pixels
        .iter()
        .flat_map(|&p| [(p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8])
        .collect();
    let img = RgbaImage::from_raw(width, height, raw).context("difference image size")?;
    img.save(path)
        .with_context(|| format!("failed to save difference image to '{}'", path.display()))
}
