//! Example: Fetch an elevation raster for a bounding box.
//!
//! Usage: cargo run --example fetch_bbox -- <min_lon> <min_lat> <max_lon> <max_lat> <zoom> [output.tif] [crs]

use elevatr_dem::{AlwaysConfirm, ElevationClient, ElevationRequest, Settings};
use std::env;
use std::time::Instant;

fn parse<T: std::str::FromStr>(value: &str, what: &str) -> T {
    match value.parse() {
        Ok(v) => v,
        Err(_) => {
            eprintln!("Invalid {}: {}", what, value);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 6 {
        eprintln!("Usage: {} <min_lon> <min_lat> <max_lon> <max_lat> <zoom> [output.tif] [crs]", args[0]);
        eprintln!("Example: {} 6.8 45.8 6.9 45.9 12 mont_blanc.tif EPSG:4326", args[0]);
        std::process::exit(1);
    }

    let bbox = (
        parse(&args[1], "min_lon"),
        parse(&args[2], "min_lat"),
        parse(&args[3], "max_lon"),
        parse(&args[4], "max_lat"),
    );
    let zoom: u8 = parse(&args[5], "zoom");
    let output = args.get(6).map(|s| s.as_str()).unwrap_or("elevation.tif");

    let mut request = ElevationRequest::new(bbox, zoom);
    request.crs = args.get(7).cloned();

    let client = match ElevationClient::new(Settings::default()) {
        Ok(client) => client.with_progress(|p| {
            println!(
                "  tile {} ({}/{}){}",
                p.coord,
                p.completed,
                p.total,
                if p.cached { " [cached]" } else { "" }
            );
        }),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Fetching zoom {} tiles for {:?}...", zoom, bbox);
    let start = Instant::now();

    let raster = match client.get_elevation_raster(&request, &AlwaysConfirm) {
        Ok(Some(raster)) => raster,
        Ok(None) => {
            println!("Aborted");
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Built {}x{} raster in {} in {:.2}s",
        raster.width(),
        raster.height(),
        raster.crs(),
        start.elapsed().as_secs_f64()
    );
    if let Some(stats) = raster.statistics() {
        println!(
            "Elevation: min {:.1} m, max {:.1} m, mean {:.1} m ({} valid samples)",
            stats.min, stats.max, stats.mean, stats.valid_count
        );
    }

    if let Err(e) = raster.to_tif(output, "lzw") {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    println!("Wrote {}", output);
}
