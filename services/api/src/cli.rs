use crate::infra::seed_lookups;
use crate::server;
use afp_claims::claims::{LookupRegistry, WeightedEntry, WeightedTable};
use afp_claims::error::AppError;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "afp-api",
    about = "Serve and inspect the AFP academic claims service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the weighted reference tables loaded at startup
    Lookups(LookupsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
struct LookupsArgs {
    /// Only print the table with this slug, e.g. `award-levels`
    #[arg(long)]
    table: Option<String>,
    /// Emit JSON instead of a text listing
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct TableListing {
    slug: &'static str,
    label: &'static str,
    min_weight: f64,
    max_weight: f64,
    decimal_places: u32,
    entries: Vec<WeightedEntry>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Lookups(args) => print_lookups(args),
    }
}

fn print_lookups(args: LookupsArgs) -> Result<(), AppError> {
    let lookups = LookupRegistry::new();
    seed_lookups(&lookups)?;

    let tables: Vec<WeightedTable> = match args.table.as_deref() {
        Some(slug) => match WeightedTable::from_slug(slug) {
            Some(table) => vec![table],
            None => {
                let known: Vec<&str> = WeightedTable::ALL.iter().map(|table| table.slug()).collect();
                eprintln!("unknown table `{slug}`; expected one of: {}", known.join(", "));
                return Ok(());
            }
        },
        None => WeightedTable::ALL.to_vec(),
    };

    let listings: Vec<TableListing> = tables
        .into_iter()
        .map(|table| {
            let (min_weight, max_weight) = table.bounds();
            TableListing {
                slug: table.slug(),
                label: table.label(),
                min_weight,
                max_weight,
                decimal_places: table.decimal_places(),
                entries: lookups.weighted_entries(table),
            }
        })
        .collect();

    if args.json {
        match serde_json::to_string_pretty(&listings) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => eprintln!("failed to render lookups: {err}"),
        }
        return Ok(());
    }

    for listing in &listings {
        println!(
            "{} ({}) weights {}..={}, {} decimal places",
            listing.label,
            listing.slug,
            listing.min_weight,
            listing.max_weight,
            listing.decimal_places
        );
        if listing.entries.is_empty() {
            println!("  (empty)");
        }
        for entry in &listing.entries {
            println!("  #{:<4} {:<32} {}", entry.id, entry.name, entry.weight);
        }
    }
    Ok(())
}
