//! Classifier CLI - group object inventories by type
//!
//! # Main Commands
//!
//! ```bash
//! classifier group objects.xlsx              # Write classified_result.xlsx
//! classifier group objects.csv -s "; " --json
//! classifier serve                           # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! classifier parse objects.csv               # Parsed table as JSON
//! classifier validate objects.xlsx           # Check required columns
//! classifier example                         # Built-in example data
//! ```

use clap::{Parser, Subcommand};
use classifier::{
    example_table, missing_columns, parse_file, process_file, process_table, AppConfig,
    GroupedResult, TransformOptions, REQUIRED_COLUMNS,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "classifier")]
#[command(about = "Group a spreadsheet of objects by Type and join their names", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: read, validate, group and export
    Group {
        /// Input .xlsx, .xls or .csv file
        input: PathBuf,

        /// Separator between joined names (default from CLASSIFIER_SEPARATOR or " OR ")
        #[arg(short, long, allow_hyphen_values = true)]
        separator: Option<String>,

        /// Output workbook (default from CLASSIFIER_OUTPUT_NAME)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the grouped table as JSON instead of writing a workbook
        #[arg(long)]
        json: bool,
    },

    /// Check that the file has the required columns
    Validate {
        /// Input .xlsx, .xls or .csv file
        input: PathBuf,
    },

    /// Parse a file and output the table as JSON
    Parse {
        /// Input .xlsx, .xls or .csv file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the built-in example and its grouping
    Example {
        #[arg(short, long, allow_hyphen_values = true)]
        separator: Option<String>,

        /// Export as a workbook instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default from CLASSIFIER_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Group {
            input,
            separator,
            output,
            json,
        } => cmd_group(&config, &input, separator, output.as_deref(), json),

        Commands::Validate { input } => cmd_validate(&input),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Example { separator, output } => {
            cmd_example(&config, separator, output.as_deref())
        }

        Commands::Serve { port } => cmd_serve(config, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_group(
    config: &AppConfig,
    input: &Path,
    separator: Option<String>,
    output: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = TransformOptions {
        separator: separator.unwrap_or_else(|| config.separator.clone()),
        max_bytes: Some(config.max_upload_bytes),
    };

    let output_data = process_file(input, &options)?;
    let result = &output_data.processed.grouped;

    if json {
        let json = serde_json::to_string_pretty(&result.grouped)?;
        println!("{}", json);
        return Ok(());
    }

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.output_name));
    write_workbook(result, &path)?;

    eprintln!("\n📊 Total rows: {}", result.total_rows());
    eprintln!("   Total groups: {}", result.total_groups());
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let parsed = parse_file(input)?;
    let missing = missing_columns(&parsed.table, &REQUIRED_COLUMNS);

    eprintln!("   Columns: {}", parsed.table.columns().join(", "));
    eprintln!("   Rows: {}", parsed.table.len());

    if missing.is_empty() {
        eprintln!("✅ All required columns present");
        Ok(())
    } else {
        Err(format!(
            "File must contain columns: {}; missing: {}",
            REQUIRED_COLUMNS.join(", "),
            missing.join(", ")
        )
        .into())
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let result = parse_file(input)?;
    if let Some(ref encoding) = result.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    if let Some(delimiter) = result.delimiter {
        eprintln!("   Delimiter: '{}'", classifier::transform::format_delimiter(delimiter));
    }
    if let Some(ref sheet) = result.sheet_name {
        eprintln!("   Sheet: {}", sheet);
    }
    eprintln!("   Columns: {}", result.table.columns().join(", "));
    eprintln!("✅ Parsed {} rows", result.table.len());

    let json = serde_json::to_string_pretty(&result.table)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_example(
    config: &AppConfig,
    separator: Option<String>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let separator = separator.unwrap_or_else(|| config.separator.clone());
    let result = process_table(example_table(), &separator)?;

    match output {
        Some(path) => write_workbook(&result, path),
        None => {
            let json = json!({
                "raw": result.raw,
                "grouped": result.grouped,
                "separator": result.separator,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
    }
}

async fn cmd_serve(mut config: AppConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        config.port = port;
    }
    classifier::server::start_server(config).await
}

fn write_workbook(result: &GroupedResult, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = result.to_workbook()?;
    fs::write(path, &bytes)?;
    eprintln!("💾 Workbook written to: {}", path.display());
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
