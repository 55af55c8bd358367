use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod error;
mod models;
mod regression;
mod report;
mod sample;
mod sanitize;
mod store;
mod summary;
mod table;

use models::{BracketScheme, RegressionBatch};
use sample::SampleDistribution;

#[derive(Parser)]
#[command(name = "survey-analytics")]
#[command(about = "Survey response store and statistical analytics", long_about = None)]
struct Cli {
    /// Path to the JSON response store
    #[arg(long, default_value = "survey-data.json")]
    data: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append synthetic responses for demos
    Generate {
        #[arg(long, default_value_t = 25)]
        count: usize,
        #[arg(long, value_enum, default_value = "uniform")]
        distribution: SampleDistribution,
    },
    /// Import responses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Export all responses to a CSV file
    Export {
        #[arg(long, default_value = "responses.csv")]
        out: PathBuf,
    },
    /// Remove every stored response
    Clear,
    /// Fit one model per survey item
    Regress {
        #[arg(long)]
        json: bool,
    },
    /// Fit one bracket-membership model per age bracket
    Brackets {
        #[arg(long)]
        json: bool,
    },
    /// Emit the full analytics payload as JSON
    Summary {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_battery(batch: &RegressionBatch) {
    for model in &batch.models {
        let adj = model
            .adj_r2
            .map(|v| format!("{v:.3}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "- {}: R² {:.3} (adj {adj}, RMSE {:.3}, n = {}, {})",
            model.target, model.r2, model.rmse, model.n, model.method
        );
    }
    for skip in &batch.skipped {
        println!("- {} skipped: {}", skip.target, skip.reason);
    }
}

fn emit_battery(batch: &RegressionBatch, json: bool) -> anyhow::Result<()> {
    if json {
        let value = sanitize::to_sanitized_value(batch)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_battery(batch);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let scheme = BracketScheme::default();

    match cli.command {
        Commands::Generate {
            count,
            distribution,
        } => {
            let responses = sample::generate(count, distribution, &scheme)?;
            let total = store::append(&cli.data, responses)?;
            println!("Generated {count} responses ({total} total).");
        }
        Commands::Import { csv } => {
            let imported = store::import_csv(&cli.data, &csv)?;
            println!("Imported {imported} responses from {}.", csv.display());
        }
        Commands::Export { out } => {
            let exported = store::export_csv(&cli.data, &out)?;
            println!("Exported {exported} responses to {}.", out.display());
        }
        Commands::Clear => {
            store::clear(&cli.data)?;
            println!("Store cleared.");
        }
        Commands::Regress { json } => {
            let responses = store::load(&cli.data)?;
            let batch = regression::per_item_regressions(&responses, &scheme)?;
            emit_battery(&batch, json)?;
        }
        Commands::Brackets { json } => {
            let responses = store::load(&cli.data)?;
            let batch = regression::per_category_regressions(&responses, &scheme)?;
            emit_battery(&batch, json)?;
        }
        Commands::Summary { out } => {
            let responses = store::load(&cli.data)?;
            let payload = summary::summary_payload(&responses, &scheme);
            let value = sanitize::to_sanitized_value(&payload)?;
            let rendered = serde_json::to_string_pretty(&value)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Summary written to {}.", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Report { out } => {
            let responses = store::load(&cli.data)?;
            let rendered = report::build_report(&responses, &scheme);
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
