use anyhow::{anyhow, Context, Error, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use csvw_rdf::api::{csvw_to_rdf, rdf_to_csvw, validate, write_tables};
use csvw_rdf::config::{ConversionOptions, PathOverride};
use csvw_rdf::descriptor::DescriptorInput;
use csvw_rdf::io::{DefaultResolver, Resolver};
use csvw_rdf::issues::IssueType;
use csvw_rdf::options::{IssuePolicy, LogLevel};
use csvw_rdf::util::{location_to_url, write_quads};
use log::info;
use oxigraph::io::RdfFormat;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "csvw-rdf")]
#[command(about = "Convert between CSV on the Web and RDF")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
    /// JSON file with conversion options; command line flags override it
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    /// Base IRI used to resolve relative URLs
    #[clap(long, short, global = true)]
    base_iri: Option<String>,
    /// URL rewrite applied before every fetch, as PATTERN=REPLACEMENT. PATTERN is a prefix,
    /// a glob, or a regex prefixed with 're:'. May be repeated.
    #[clap(long = "path-override", short = 'p', global = true)]
    path_overrides: Vec<String>,
    /// Strict mode - stop at the first error instead of collecting them
    #[clap(long, action, default_value = "false", global = true)]
    strict: bool,
    /// Which issues to record: one of [error, warn, debug]
    #[clap(long, global = true)]
    issue_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Turtle,
    Ntriples,
    Nquads,
}

impl From<OutputFormat> for RdfFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Turtle => RdfFormat::Turtle,
            OutputFormat::Ntriples => RdfFormat::NTriples,
            OutputFormat::Nquads => RdfFormat::NQuads,
        }
    }
}

#[derive(Debug, Args)]
struct InferenceArgs {
    /// Number of quads kept in memory while reading the RDF input
    #[clap(long)]
    window_size: Option<usize>,
    /// Number of quads read each time the window moves
    #[clap(long)]
    window_step: Option<usize>,
    /// Fetch vocabularies to label inferred tables and columns
    #[clap(long, action, default_value = "false")]
    use_vocab_metadata: bool,
    /// Preferred language of vocabulary labels
    #[clap(long)]
    language: Option<String>,
    /// Collect subjects without rdf:type into their own table
    #[clap(long, action, default_value = "false")]
    unknown_type_table: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a CSVW metadata document, or a CSV file whose metadata is located, to RDF
    Csvw2rdf {
        /// Path or URL of the metadata document or CSV file
        input: String,
        /// Output file; if omitted, writes to STDOUT
        #[clap(long, short)]
        output: Option<PathBuf>,
        /// Serialization format
        #[clap(long, short, value_enum, default_value = "turtle")]
        format: OutputFormat,
        /// Only emit triples describing the data, without the table structure
        #[clap(long, short, action, default_value = "false")]
        minimal: bool,
        /// Convert IRIs produced by URI templates to their decoded form
        #[clap(long, action, default_value = "false")]
        template_iris: bool,
    },
    /// Convert RDF to CSV tables, with a given descriptor or an inferred schema
    Rdf2csvw {
        /// Path or URL of the RDF document
        input: String,
        /// Descriptor to use instead of inferring one
        #[clap(long)]
        descriptor: Option<String>,
        /// Directory for the CSV files and csv-metadata.json
        #[clap(long, short, default_value = ".")]
        outdir: PathBuf,
        #[command(flatten)]
        inference: InferenceArgs,
    },
    /// Validate a CSVW metadata document or CSV file and print every issue
    Validate {
        /// Path or URL of the metadata document or CSV file
        input: String,
    },
}

pub fn run() -> Result<()> {
    csvw_rdf::api::init_logging();
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    csvw_rdf::api::init_logging();
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn base_options(cmd: &Cli) -> Result<ConversionOptions> {
    let mut options = match &cmd.config {
        Some(path) => ConversionOptions::from_file(path)
            .with_context(|| format!("Failed to read options from {}", path.display()))?,
        None => ConversionOptions::default(),
    };
    if let Some(base) = &cmd.base_iri {
        options.base_iri = Some(base.clone());
    }
    for spec in &cmd.path_overrides {
        options.path_overrides.push(PathOverride::parse(spec)?);
    }
    if cmd.strict {
        options.issue_policy = IssuePolicy::Throw;
    }
    if let Some(level) = cmd.issue_level {
        options.log_level = level;
    }
    Ok(options)
}

fn apply_inference_args(options: &mut ConversionOptions, args: &InferenceArgs) -> Result<()> {
    if let Some(size) = args.window_size {
        options.window_size = size;
    }
    if let Some(step) = args.window_step {
        options.window_step = step;
    }
    if options.window_step == 0 || options.window_step > options.window_size {
        return Err(anyhow!(
            "--window-step must be between 1 and the window size ({})",
            options.window_size
        ));
    }
    if args.use_vocab_metadata {
        options.use_vocab_metadata = true;
    }
    if let Some(language) = &args.language {
        options.preferred_language = language.clone();
    }
    if args.unknown_type_table {
        options.unknown_type_table = true;
    }
    Ok(())
}

fn execute(cmd: Cli) -> Result<()> {
    // The RUST_LOG env var is set by `init_logging` if CSVW_LOG is present.
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    let mut options = base_options(&cmd)?;

    match cmd.command {
        Commands::Csvw2rdf {
            input,
            output,
            format,
            minimal,
            template_iris,
        } => {
            options.minimal |= minimal;
            options.template_iris |= template_iris;
            if cmd.verbose || cmd.debug {
                options.print();
            }
            let url = location_to_url(&input)?;
            let (quads, issues) = csvw_to_rdf(&url, options, None)?;
            let count = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    let count = write_quads(quads, format.into(), BufWriter::new(file))?;
                    info!("Wrote {count} quads to {}", path.display());
                    count
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut writer = BufWriter::new(stdout.lock());
                    let count = write_quads(quads, format.into(), &mut writer)?;
                    writer.flush()?;
                    count
                }
            };
            let errors = issues.get_errors();
            if !errors.is_empty() {
                for issue in &errors {
                    eprintln!("{issue}");
                }
                return Err(anyhow!(
                    "Conversion produced {count} quads but reported {} errors",
                    errors.len()
                ));
            }
        }
        Commands::Rdf2csvw {
            input,
            descriptor,
            outdir,
            inference,
        } => {
            apply_inference_args(&mut options, &inference)?;
            if cmd.verbose || cmd.debug {
                options.print();
            }
            let descriptor = match descriptor {
                Some(location) => {
                    let url = location_to_url(&location)?;
                    let text = DefaultResolver::new().resolve_jsonld(&url, "")?;
                    Some(DescriptorInput::Text(text))
                }
                None => None,
            };
            let url = location_to_url(&input)?;
            let rows = rdf_to_csvw(&url, descriptor, options, None)?;
            let issues = rows.issues();
            let written = write_tables(rows, &outdir)?;
            println!(
                "Wrote {} rows to {} tables in {}",
                written.rows,
                written.tables.len(),
                outdir.display()
            );
            for issue in issues.get_errors() {
                eprintln!("{issue}");
            }
        }
        Commands::Validate { input } => {
            if cmd.verbose || cmd.debug {
                options.print();
            }
            let url = location_to_url(&input)?;
            let issues = validate(&url, options, None)?;
            let errors = issues.iter().filter(|i| i.kind == IssueType::Error).count();
            for issue in &issues {
                println!("{issue}");
            }
            if errors > 0 {
                return Err(anyhow!("Validation failed with {errors} errors"));
            }
            println!("Valid ({} warnings)", issues.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csvw2rdf_flags() {
        let cli = Cli::try_parse_from([
            "csvw-rdf",
            "csvw2rdf",
            "data.csv",
            "--format",
            "ntriples",
            "--minimal",
            "-p",
            "http://ex.org/=file:///data/",
        ])
        .unwrap();
        let options = base_options(&cli).unwrap();
        assert_eq!(options.rewrite_url("http://ex.org/a.csv"), "file:///data/a.csv");
        match cli.command {
            Commands::Csvw2rdf { minimal, format, .. } => {
                assert!(minimal);
                assert_eq!(RdfFormat::from(format), RdfFormat::NTriples);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_strict_and_issue_level() {
        let cli = Cli::try_parse_from(["csvw-rdf", "validate", "m.json", "--strict", "--issue-level", "error"])
            .unwrap();
        let options = base_options(&cli).unwrap();
        assert_eq!(options.issue_policy, IssuePolicy::Throw);
        assert_eq!(options.log_level, LogLevel::Error);
    }

    #[test]
    fn test_window_step_must_fit_the_window() {
        let mut options = ConversionOptions::default();
        let args = InferenceArgs {
            window_size: Some(10),
            window_step: Some(20),
            use_vocab_metadata: false,
            language: None,
            unknown_type_table: false,
        };
        assert!(apply_inference_args(&mut options, &args).is_err());
    }
}
