use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};

const CATEGORIES: &[&str] = &[
    "FURTO",
    "ROUBO",
    "FURTO DE VEICULO",
    "ROUBO DE VEICULO",
    "LESAO CORPORAL",
];

/// Hot spots as (latitude, longitude, spread in degrees, relative weight).
const HOTSPOTS: &[(f64, f64, f64, f64)] = &[
    (-23.5505, -46.6333, 0.02, 0.45),
    (-23.5874, -46.6576, 0.03, 0.25),
    (-23.5329, -46.7920, 0.04, 0.20),
    (-23.6500, -46.5300, 0.05, 0.10),
];

/// Deterministic splitmix64 stream, so every run writes the same file.
struct IncidentRng(u64);

impl IncidentRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.uniform() * n as f64) as usize % n.max(1)
    }

    /// Normal draw (Box-Muller, cosine branch only).
    fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let radius = (-2.0 * self.uniform().max(f64::MIN_POSITIVE).ln()).sqrt();
        let angle = std::f64::consts::TAU * self.uniform();
        mean + std_dev * radius * angle.cos()
    }

    fn pick_hotspot(&mut self) -> (f64, f64, f64) {
        let mut r = self.uniform();
        for &(lat, lon, spread, weight) in HOTSPOTS {
            if r < weight {
                return (lat, lon, spread);
            }
            r -= weight;
        }
        let (lat, lon, spread, _) = HOTSPOTS[HOTSPOTS.len() - 1];
        (lat, lon, spread)
    }
}

/// Incidents per hour follow a day/night cycle peaking in the evening.
fn hourly_rate(hour: u32) -> f64 {
    let phase = (f64::from(hour) - 19.0) / 24.0 * 2.0 * std::f64::consts::PI;
    6.0 + 5.0 * phase.cos()
}

fn main() -> Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_incidents.csv"));
    let days: i64 = 60;

    let mut rng = IncidentRng(42);
    let start = NaiveDate::from_ymd_opt(2018, 11, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;

    let mut writer = csv::Writer::from_path(&output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;
    writer.write_record([
        "id",
        "data_hora_inclusao",
        "natureza_descricao",
        "numero_latitude",
        "numero_longitude",
    ])?;

    let mut row_id: u64 = 0;
    for hour in 0..days * 24 {
        let slot_start = start + Duration::hours(hour);
        let expected = hourly_rate((hour % 24) as u32);
        let count = rng.normal(expected, expected.sqrt()).round().max(0.0) as u64;

        for _ in 0..count {
            let ts = slot_start + Duration::seconds((rng.uniform() * 3600.0) as i64);
            let (lat, lon, spread) = rng.pick_hotspot();
            let category = CATEGORIES[rng.below(CATEGORIES.len())];

            // A small share of rows is malformed the way real exports are.
            let roll = rng.uniform();
            let (lat_text, lon_text) = if roll < 0.01 {
                (String::new(), format!("{:.6}", rng.normal(lon, spread)))
            } else if roll < 0.015 {
                // Geocoding failures far outside the city.
                ("0.0".to_string(), "0.0".to_string())
            } else {
                (
                    format!("{:.6}", rng.normal(lat, spread)),
                    format!("{:.6}", rng.normal(lon, spread)),
                )
            };

            writer.write_record([
                row_id.to_string(),
                ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                category.to_string(),
                lat_text,
                lon_text,
            ])?;
            row_id += 1;
        }
    }
    writer.flush()?;

    println!(
        "Wrote {row_id} incidents over {days} days to {}",
        output_path.display()
    );
    Ok(())
}
