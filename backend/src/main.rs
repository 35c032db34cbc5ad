//! Gradebridge CLI - Merge provider grade reports into a gradebook export
//!
//! # Commands
//!
//! ```bash
//! gradebridge assignments provider.csv                    # List gradeable assignments
//! gradebridge merge gradebook.csv provider.csv -a Quiz1   # Merge selected assignments
//! gradebridge merge gradebook.csv provider.csv --all      # Merge every assignment
//! gradebridge mapping                                     # Show the assignment mapping table
//! gradebridge serve                                       # Start HTTP server (port 3000)
//! ```

use clap::{Parser, Subcommand};
use gradebridge::{
    list_assignments_from_file, update_grades_from_files, BlankPolicy, MappingTable,
    MergeOptions, Settings, OUTPUT_FILE_NAME,
};
use gradebridge::parser::parse_delimiter;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gradebridge")]
#[command(about = "Merge provider assignment scores into a gradebook CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List gradeable assignments of a provider report
    Assignments {
        /// Provider CSV file
        provider: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long, value_parser = delimiter_arg)]
        delimiter: Option<char>,
    },

    /// Copy selected assignment scores into the gradebook
    Merge {
        /// Gradebook CSV file
        gradebook: PathBuf,

        /// Provider CSV file
        provider: PathBuf,

        /// Assignment to merge (repeatable)
        #[arg(short, long = "assignment")]
        assignments: Vec<String>,

        /// Merge every gradeable assignment of the provider report
        #[arg(long)]
        all: bool,

        /// Write 0 where the provider score is blank
        #[arg(long)]
        zero_blanks: bool,

        /// JSON assignment mapping table (overrides the built-in one)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// CSV delimiter for both inputs (auto-detect if not specified)
        #[arg(short, long, value_parser = delimiter_arg)]
        delimiter: Option<char>,

        /// Output file
        #[arg(short, long, default_value = OUTPUT_FILE_NAME)]
        output: PathBuf,
    },

    /// Print the effective assignment mapping table
    Mapping {
        /// JSON assignment mapping table (overrides the built-in one)
        #[arg(long)]
        mapping: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: GRADEBRIDGE_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// ASCII delimiter, `\t` or `tab`.
fn delimiter_arg(value: &str) -> Result<char, String> {
    parse_delimiter(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    // Reads .env as well
    let settings = Settings::from_env();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Assignments {
            provider,
            delimiter,
        } => cmd_assignments(&provider, delimiter),

        Commands::Merge {
            gradebook,
            provider,
            assignments,
            all,
            zero_blanks,
            mapping,
            delimiter,
            output,
        } => {
            let options = MergeOptions {
                selected: assignments,
                select_all: all,
                blank_policy: BlankPolicy::from_flag(zero_blanks),
                delimiter,
                mapping_path: settings.mapping_path(mapping),
            };
            cmd_merge(&gradebook, &provider, &options, &output)
        }

        Commands::Mapping { mapping } => cmd_mapping(settings.mapping_path(mapping).as_deref()),

        Commands::Serve { port } => {
            let settings = Settings {
                port: port.unwrap_or(settings.port),
                ..settings
            };
            cmd_serve(settings).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_assignments(provider: &Path, delimiter: Option<char>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Reading provider report: {}", provider.display());

    let listing = list_assignments_from_file(provider, delimiter)?;

    eprintln!("   Encoding: {}", listing.csv_info.encoding);
    eprintln!("   Rows: {}", listing.csv_info.row_count);
    eprintln!("✅ {} gradeable assignment(s)\n", listing.assignments.len());

    let width = listing
        .assignments
        .iter()
        .map(|a| a.name.chars().count())
        .max()
        .unwrap_or(0);

    for a in &listing.assignments {
        let points = if a.max_points.is_empty() { "-" } else { a.max_points.as_str() };
        println!(
            "  {:<width$}  max {:>6}  {:>4}/{:<4} {:>6}",
            a.name,
            points,
            a.completed,
            a.total,
            a.completion,
            width = width
        );
    }

    Ok(())
}

fn cmd_merge(
    gradebook: &Path,
    provider: &Path,
    options: &MergeOptions,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = update_grades_from_files(gradebook, provider, options)?;
    let outcome = &result.outcome;

    if let Some(ref err) = outcome.setup_error {
        return Err(err.to_string().into());
    }

    fs::write(output, &result.csv)?;
    eprintln!("💾 Output written to: {}", output.display());

    eprintln!("\n📊 Summary:");
    for (label, value) in outcome.summary.metrics() {
        eprintln!("   {:<22} {}", label, value);
    }

    if !outcome.issues.is_empty() {
        eprintln!("\n⚠️  {} row/column issue(s):", outcome.issues.len());
        for issue in outcome.issues.iter().take(10) {
            eprintln!("   - {}", issue);
        }
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_mapping(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let table = MappingTable::load_or_builtin(path)?;

    match path {
        Some(p) => eprintln!("🗺️  Mapping table from {} ({} entries)\n", p.display(), table.len()),
        None => eprintln!("🗺️  Built-in mapping table ({} entries)\n", table.len()),
    }

    for (assignment, fragment) in table.sorted_entries() {
        println!("  {} → {}", assignment, fragment);
    }

    Ok(())
}

async fn cmd_serve(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    gradebridge::server::start_server(settings).await?;
    Ok(())
}
