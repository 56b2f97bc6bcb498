use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use argh::FromArgs;
use hough_circles::{HoughCircles, HoughCirclesConfig};
use hough_image::Image;

/// A ring to render, in pixels.
#[derive(Debug, Clone, Copy)]
struct Ring {
    x: f64,
    y: f64,
    radius: f64,
}

fn parse_ring(value: &str) -> Result<Ring, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid ring '{value}': {e}"))?;

    match parts.as_slice() {
        [x, y, radius] => Ok(Ring {
            x: *x,
            y: *y,
            radius: *radius,
        }),
        _ => Err(format!("expected a ring as x,y,radius, got '{value}'")),
    }
}

/// Detects circles in a synthetic image made of bright rings
#[derive(Debug, FromArgs)]
struct Args {
    /// ring to draw as x,y,radius, can be repeated
    #[argh(option, short = 'r', from_str_fn(parse_ring))]
    ring: Vec<Ring>,

    /// width of the image
    #[argh(option, default = "128")]
    width: usize,

    /// height of the image
    #[argh(option, default = "128")]
    height: usize,

    /// json file with the detector configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// smallest radius to search
    #[argh(option)]
    min_radius: Option<f64>,

    /// largest radius to search
    #[argh(option)]
    max_radius: Option<f64>,

    /// intensity a pixel must exceed to vote
    #[argh(option)]
    threshold: Option<f64>,

    /// variance of the accumulator blur
    #[argh(option)]
    variance: Option<f64>,

    /// maximum number of circles to extract
    #[argh(option, short = 'n')]
    circles: Option<usize>,

    /// suppression disc radius as a multiple of the circle radius
    #[argh(option)]
    disc_radius_ratio: Option<f64>,
}

/// Render the rings with a gaussian cross-section over a dark background.
fn render(
    width: usize,
    height: usize,
    rings: &[Ring],
) -> Result<Image<u8, 1>, Box<dyn std::error::Error>> {
    let data = (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f64, (i / width) as f64);
            let value = rings
                .iter()
                .map(|ring| {
                    let d = (x - ring.x).hypot(y - ring.y) - ring.radius;
                    255.0 * (-d * d / 4.5).exp()
                })
                .fold(0.0, f64::max);
            value.round() as u8
        })
        .collect();

    Ok(Image::new([width, height].into(), data)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => HoughCirclesConfig {
            minimum_radius: 5.0,
            maximum_radius: 30.0,
            threshold: 100.0,
            ..Default::default()
        },
    };

    if let Some(v) = args.min_radius {
        config.minimum_radius = v;
    }
    if let Some(v) = args.max_radius {
        config.maximum_radius = v;
    }
    if let Some(v) = args.threshold {
        config.threshold = v;
    }
    if let Some(v) = args.variance {
        config.variance = v;
    }
    if let Some(v) = args.circles {
        config.number_of_circles = v;
    }
    if let Some(v) = args.disc_radius_ratio {
        config.disc_radius_ratio = v;
    }

    let rings = if args.ring.is_empty() {
        vec![Ring {
            x: args.width as f64 / 2.0,
            y: args.height as f64 / 2.0,
            radius: args.width.min(args.height) as f64 / 4.0,
        }]
    } else {
        args.ring.clone()
    };
    log::info!(
        "rendering {} rings on a {}x{} image",
        rings.len(),
        args.width,
        args.height
    );

    let image = render(args.width, args.height, &rings)?;

    let mut detector = HoughCircles::new(config)?;
    detector.set_input(image);
    let circles = detector.circles()?;

    println!("{}", serde_json::to_string_pretty(circles)?);

    Ok(())
}
