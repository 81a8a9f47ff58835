use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nyc_tree_health::{config, data, processing, render, server, Borough, Health, Steward};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every species' charts to the chart directory
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print both tables for one selection
    Summary {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Species common name (defaults to the dashboard default)
        #[arg(short, long)]
        species: Option<String>,
        /// Borough for the steward table (defaults to the dashboard default)
        #[arg(short, long)]
        borough: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { config } => {
            info!("Generating charts with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let dataset = data::load_dataset(&app_config)?;
            render::generate_charts(&app_config, &dataset)?;
            info!("Generation complete");
        }
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let dataset = data::load_dataset(&app_config)?;
            server::start_server(app_config, dataset).await?;
        }
        Commands::Summary { config, species, borough } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let dataset = data::load_dataset(&app_config)?;

            let species = species.unwrap_or_else(|| app_config.dashboard.default_species.clone());
            let borough: Borough = borough
                .as_deref()
                .unwrap_or(app_config.dashboard.default_borough.as_str())
                .parse()
                .context("Invalid borough")?;

            print_summary(&dataset, &species, borough);
        }
    }

    Ok(())
}

fn print_summary(dataset: &data::Dataset, species: &str, borough: Borough) {
    let bars = processing::aggregate_condition_proportions(dataset.filter_species(species));
    println!("{}", render::bar_chart_title(species));
    if bars.is_empty() {
        println!("  {}", render::NO_DATA_MESSAGE);
    } else {
        println!("  {:<15}{:>8}{:>8}{:>8}", "borough", "Good", "Fair", "Poor");
        for b in Borough::ALL {
            print!("  {:<15}", b.label());
            for h in Health::ALL {
                print!("{:>8.2}", bars.get(b, h));
            }
            println!();
        }
    }

    println!();
    let heat = processing::aggregate_steward_health(dataset.filter_borough_species(borough, species));
    println!("Steward by health, {} ({} trees)", borough, heat.total);
    if heat.is_empty() {
        println!("  {}", render::NO_DATA_MESSAGE);
        return;
    }
    print!("  {:<8}", "");
    for s in Steward::HEATMAP_ORDER {
        print!("{:>10}", s.label());
    }
    println!();
    for h in Health::ALL {
        print!("  {:<8}", h.label());
        for s in Steward::HEATMAP_ORDER {
            print!("{:>10.4}", heat.get(h, s));
        }
        println!();
    }
}
