use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Write a synthetic VD device table with known defects: a few misplaced
/// devices, a duplicated ID, skipped sequence numbers, and a row without
/// coordinates.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output CSV path
    #[arg(short, long, default_value = "output.csv")]
    output: PathBuf,

    /// Number of regular devices
    #[arg(short = 'n', long, default_value_t = 200)]
    devices: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Serialize)]
struct Row {
    #[serde(rename = "VDID")]
    vdid: String,
    #[serde(rename = "RoadName")]
    road: &'static str,
    #[serde(rename = "LaneNum")]
    lanes: u8,
    #[serde(rename = "PositionLon")]
    lon: Option<f64>,
    #[serde(rename = "PositionLat")]
    lat: Option<f64>,
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn vdid(n: usize) -> String {
    format!("VD-N1-N-{n:04}")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    // Freeway corridor from Keelung (north) to Kaohsiung (south).
    let (start_lon, start_lat) = (121.74, 25.13);
    let (end_lon, end_lat) = (120.30, 22.62);

    // Sequence numbers left out on purpose.
    let skipped = [17, 18, 91];

    let mut rows = Vec::with_capacity(args.devices + 4);
    for i in 1..=args.devices + skipped.len() {
        if skipped.contains(&i) {
            continue;
        }
        let t = i as f64 / (args.devices + skipped.len()) as f64;
        rows.push(Row {
            vdid: vdid(i),
            road: "National Freeway 1",
            lanes: rng.gen_range(2..=5),
            lon: Some(start_lon + (end_lon - start_lon) * t + gauss(&mut rng, 0.0, 0.005)),
            lat: Some(start_lat + (end_lat - start_lat) * t + gauss(&mut rng, 0.0, 0.005)),
        });
    }

    // Devices registered far off the corridor.
    let next = args.devices + skipped.len() + 1;
    rows.push(Row {
        vdid: vdid(next),
        road: "National Freeway 1",
        lanes: 3,
        lon: Some(119.56),
        lat: Some(23.57),
    });
    rows.push(Row {
        vdid: vdid(next + 1),
        road: "National Freeway 1",
        lanes: 3,
        lon: Some(122.10),
        lat: Some(21.90),
    });

    // Same ID registered twice.
    if let Some(first) = rows.first() {
        let dup = Row {
            vdid: first.vdid.clone(),
            road: first.road,
            lanes: first.lanes,
            lon: first.lon,
            lat: first.lat,
        };
        rows.push(dup);
    }

    // Missing coordinates.
    rows.push(Row {
        vdid: vdid(next + 2),
        road: "National Freeway 1",
        lanes: 2,
        lon: None,
        lat: Some(24.0),
    });

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    for row in &rows {
        writer.serialize(row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;

    println!(
        "Wrote {} device rows to {} (seed {})",
        rows.len(),
        args.output.display(),
        args.seed
    );
    Ok(())
}
