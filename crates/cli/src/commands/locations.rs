//! Cache preview command

use agent_lib::models::Observation;
use agent_lib::source::{default_cache_path, FindMyCacheSource, ObservationSource};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::output::{format_coordinate, print_info, print_table, OutputFormat};

/// Row for the locations table
#[derive(Tabled, Serialize)]
struct LocationRow {
    #[tabled(rename = "Device")]
    device_id: String,
    #[tabled(rename = "Latitude")]
    latitude: String,
    #[tabled(rename = "Longitude")]
    longitude: String,
    #[tabled(rename = "Observed At")]
    observed_at: String,
}

impl From<&Observation> for LocationRow {
    fn from(obs: &Observation) -> Self {
        Self {
            device_id: obs.device_id.clone(),
            latitude: format_coordinate(obs.latitude),
            longitude: format_coordinate(obs.longitude),
            observed_at: obs.observed_at.clone(),
        }
    }
}

/// Print every observation the cache currently yields
pub async fn list_locations(
    db_path: Option<PathBuf>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let path = db_path
        .or_else(default_cache_path)
        .context("Could not determine the Find My cache location; pass --db-path")?;
    let source = FindMyCacheSource::new(path);
    if verbose {
        print_info(&format!("Reading {}", source.describe()));
    }

    let observations = source.current_observations().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&observations)?),
        OutputFormat::Table => {
            let rows: Vec<LocationRow> = observations.iter().map(LocationRow::from).collect();
            print_table(&rows, format);
            if !rows.is_empty() {
                println!("\nTotal: {} locations", rows.len());
            }
        }
    }

    Ok(())
}
