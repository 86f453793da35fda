//! Chapter 5: great-circle distance with the haversine formula
//!
//! Run with: cargo run --bin ch05_haversine -- 37.983972 23.727806 52.366667 4.9

use std::f64::consts::PI;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

fn to_radians(deg: f64) -> f64 {
    deg * PI / 180.0
}

pub fn calculate_distance(a: Point, b: Point) -> f64 {
    let lat_a = to_radians(a.lat);
    let lat_b = to_radians(b.lat);
    let lng_a = to_radians(a.lng);
    let lng_b = to_radians(b.lng);

    let h = ((lat_a - lat_b) / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * ((lng_a - lng_b) / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 near antipodal points.
    let h = h.min(1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    c * EARTH_RADIUS_KM
}

const CITIES: [(&str, Point); 3] = [
    ("Athens", Point::new(37.983972, 23.727806)),
    ("Amsterdam", Point::new(52.366667, 4.9)),
    ("Berlin", Point::new(52.516667, 13.388889)),
];

#[derive(Parser, Debug)]
#[command(about = "Distance in km between two points, or between a few known cities")]
struct Args {
    /// lat1 lng1 lat2 lng2, in degrees
    #[arg(num_args = 4, allow_negative_numbers = true)]
    coords: Option<Vec<f64>>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(false);

    match args.coords.as_deref() {
        Some([lat1, lng1, lat2, lng2]) => {
            let km = calculate_distance(Point::new(*lat1, *lng1), Point::new(*lat2, *lng2));
            println!("{} km", km);
        }
        _ => {
            for (i, (from, p)) in CITIES.iter().enumerate() {
                let (to, q) = CITIES[(i + 1) % CITIES.len()];
                println!("{} -> {}: {} km", from, to, calculate_distance(*p, q));
            }
        }
    }
    Ok(())
}
