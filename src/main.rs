// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod config;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{info, warn};
use radar_loop::{Category, HttpTileSource, RadarLoop};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Weerplaza radar and satellite loops as animated GIFs")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the configured categories at the configured interval (default)
    Run,

    /// Poll every configured category once and exit
    Once,

    /// Rebuild animations from stored frames without fetching
    Refresh,

    /// Update the location marker and rebuild animations
    Marker {
        /// Marker latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Marker longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Whether the marker is drawn
        #[arg(long)]
        show: Option<bool>,
    },

    /// Copy the current animation of a category to a file
    Export {
        /// Category directory name, e.g. rain_radar
        category: Category,

        /// Destination file
        output: PathBuf,
    },

    /// Print the configuration file path
    ConfigPath,
}

type BoxResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> BoxResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command.unwrap_or(Command::Run) {
        Command::ConfigPath => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => AppConfig::get_config_path()?,
            };
            println!("{}", path.display());
        }
        Command::Run => {
            let config = AppConfig::load(config_path)?;
            let radar = start(&config).await?;
            run(&radar, config.poll_interval(), shutdown_token()).await;
        }
        Command::Once => {
            let config = AppConfig::load(config_path)?;
            let radar = start(&config).await?;
            let report = radar.poll_all().await;
            println!("{report}");
        }
        Command::Refresh => {
            let config = AppConfig::load(config_path)?;
            let radar = start(&config).await?;
            print_refresh(&radar.force_refresh().await);
        }
        Command::Marker { lat, lon, show } => {
            update_marker(config_path, lat, lon, show).await?;
        }
        Command::Export { category, output } => {
            let config = AppConfig::load(config_path)?;
            let radar = RadarLoop::new(
                HttpTileSource::new(config.http_config())?,
                config.radar_config()?,
            );
            let Some(bytes) = radar.animated_image(category).await? else {
                return Err(format!("no animation for {category} yet").into());
            };
            tokio::fs::write(&output, bytes).await?;
            println!("Wrote {}", output.display());
        }
    }

    Ok(())
}

/// Build the radar loop and register every configured category.
async fn start(config: &AppConfig) -> BoxResult<RadarLoop<HttpTileSource>> {
    let source = HttpTileSource::new(config.http_config())?;
    let radar = RadarLoop::new(source, config.radar_config()?);

    for category in config.categories()? {
        radar.register_category(category).await?;
    }
    info!(
        "Storing frames under {}",
        config.storage_root().display()
    );
    Ok(radar)
}

/// Poll until `cancel_token` fires. A poll in progress is allowed to finish.
async fn run(radar: &RadarLoop<HttpTileSource>, interval: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Polling every {}s", interval.as_secs());

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Shutting down");
                return;
            }
            _ = ticker.tick() => {
                let report = radar.poll_all().await;
                info!("{}", report);
            }
        }
    }
}

fn shutdown_token() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => token.cancel(),
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });
    cancel_token
}

/// Validate and persist a marker change, then redraw the animations.
async fn update_marker(
    config_path: Option<&Path>,
    lat: Option<f64>,
    lon: Option<f64>,
    show: Option<bool>,
) -> BoxResult<()> {
    if lat.is_none() && lon.is_none() && show.is_none() {
        return Err("nothing to change: pass --lat, --lon or --show".into());
    }

    let mut config = AppConfig::load(config_path)?;
    let radar = start(&config).await?;

    if lat.is_some() || lon.is_some() {
        radar.set_marker_location(lat, lon)?;
    }
    if let Some(show) = show {
        radar.set_show_marker(show);
    }

    config.set_marker(radar.marker());
    config.save(config_path)?;

    print_refresh(&radar.force_refresh().await);
    Ok(())
}

fn print_refresh(results: &[(Category, Option<usize>)]) {
    if results.is_empty() {
        println!("No active categories");
    }
    for (category, count) in results {
        match count {
            Some(n) => println!("{category}: {n} frame(s)"),
            None => println!("{category}: no animation"),
        }
    }
}
