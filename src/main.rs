use anyhow::{Context, Result};
use clap::Parser;
use corrosion_common::{FeatureVector, IterationRecord, SimulationConfig};
use log::{debug, error, info, trace, warn};
use pitting_engine::{CorrosionSimulation, Grid};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pitting corrosion cellular automaton", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `grid.seed`.
    #[arg(long)]
    seed: Option<u64>,

    /// Overrides `timing.iterations`.
    #[arg(short, long)]
    iterations: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting Pitting Corrosion Engine...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.grid.seed = Some(seed);
    }
    if let Some(iterations) = args.iterations {
        config.timing.iterations = iterations;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let mut sim = CorrosionSimulation::new(config)?;
    debug!("Simulation Parameters: {:#?}", sim.params());

    let total = sim.params().iterations;
    info!(
        "Starting simulation loop for {} iterations ({} substeps each)...",
        total,
        sim.params().substeps
    );
    let start_time = Instant::now();

    for _ in 0..total {
        let iteration_start = Instant::now();
        let record = match sim.run_iteration() {
            Ok(record) => record,
            Err(e) => {
                error!("Iteration failed: {}", e);
                return Err(e.into());
            }
        };
        info!(
            "Iteration [{}/{}] | Pits: red {} green {} blue {} | Time: {:6.2} ms",
            record.iteration,
            total,
            record.extents.red.cells,
            record.extents.green.cells,
            record.extents.blue.cells,
            iteration_start.elapsed().as_secs_f64() * 1000.0
        );
        trace!("Events this iteration: {:?}", record.events);
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds. Cumulative events: {:?}",
        total_duration.as_secs_f64(),
        sim.state().cumulative
    );

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    let records = sim.records();

    if output.save_features {
        let filename = format!("{}_features.csv", output.base_filename);
        write_features_csv(&filename, records)
            .with_context(|| format!("Failed to write features to '{}'", filename))?;
        info!("Feature time series saved to {}", filename);

        let filename = format!("{}_pit_sizes.csv", output.base_filename);
        write_pit_sizes_csv(&filename, records)
            .with_context(|| format!("Failed to write pit sizes to '{}'", filename))?;
        info!("Pit sizes saved to {}", filename);

        let filename = format!("{}_events.csv", output.base_filename);
        write_events_csv(&filename, records)
            .with_context(|| format!("Failed to write events to '{}'", filename))?;
        info!("Event counts saved to {}", filename);
    } else {
        info!("Skipping feature export as per config (save_features is false).");
    }

    if output.save_records {
        let format = output.format.as_deref().unwrap_or("json");
        write_records(&output.base_filename, format, records)?;
    }

    if output.save_final_grid {
        let filename = format!("{}_final_grid.csv", output.base_filename);
        write_grid_csv(&filename, sim.grid())
            .with_context(|| format!("Failed to write final grid to '{}'", filename))?;
        info!("Final grid saved to {}", filename);
    } else {
        info!("Skipping saving final grid as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Legacy features table: one row of eight `{:.3}` values per iteration.
fn write_features_csv(filename: &str, records: &[IterationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record(FeatureVector::CSV_HEADER.split(','))?;
    for record in records {
        writer.write_record(record.features.as_array().iter().map(|v| format!("{:.3}", v)))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_pit_sizes_csv(filename: &str, records: &[IterationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record([
        "iteration",
        "red_cells", "red_width", "red_height", "red_peak",
        "green_cells", "green_width", "green_height", "green_peak",
        "blue_cells", "blue_width", "blue_height", "blue_peak",
    ])?;
    for record in records {
        let mut row = vec![record.iteration.to_string()];
        for extent in [record.extents.red, record.extents.green, record.extents.blue] {
            row.push(extent.cells.to_string());
            row.push(extent.width.to_string());
            row.push(extent.height.to_string());
            row.push(format!("{:.1}", extent.peak));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_events_csv(filename: &str, records: &[IterationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    writer.write_record([
        "iteration", "nucleated", "died", "grew", "saturated",
        "total_nucleated", "total_died", "total_grew", "total_saturated",
    ])?;
    for r in records {
        writer.write_record(&[
            r.iteration.to_string(),
            r.events.nucleated.to_string(),
            r.events.died.to_string(),
            r.events.grew.to_string(),
            r.events.saturated.to_string(),
            r.cumulative.nucleated.to_string(),
            r.cumulative.died.to_string(),
            r.cumulative.grew.to_string(),
            r.cumulative.saturated.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_grid_csv(filename: &str, grid: &Grid) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;
    for row in grid.severity().chunks(grid.cols()) {
        writer.write_record(row.iter().map(|v| format!("{:.2}", v)))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_records(base: &str, format: &str, records: &[IterationRecord]) -> Result<()> {
    match format {
        "bincode" => {
            let filename = format!("{}_records.bin", base);
            let file = File::create(&filename)
                .with_context(|| format!("Error creating record file '{}'", filename))?;
            bincode::serialize_into(file, records)?;
            info!("All records saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_records.msgpack", base);
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating record file '{}'", filename))?;
            rmp_serde::encode::write(&mut file, records)?;
            info!("All records saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                warn!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_records.json", base);
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating record file '{}'", filename))?;
            let json_string = serde_json::to_string(records)?;
            file.write_all(json_string.as_bytes())?;
            info!("All records saved to {}", filename);
        }
    }
    Ok(())
}

