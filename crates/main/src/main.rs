use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use consultation_report::{
    Config, ConsultationForm, Error as ReportError, LogoUpload, RenderContext, ReportService,
};

mod logging;
mod server;

use logging::Verbosity;

/// Address printed in the footer of reports rendered from the command line.
const CLI_CLIENT_ADDRESS: &str = "localhost";

/// Consultation report generator: web form, storage and PDF rendering.
///
/// Fonts are looked up in `assets/fonts` (see `assets/fonts/README.md`) or in the directory
/// named by `CONSULTATION_REPORT_FONTS_DIR`.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Listen address, overriding `server.bind_addr`.
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },

    /// Validate a JSON form, store it and write the PDF.
    Render {
        /// JSON object with the form fields.
        #[arg(long, value_name = "FORM.json")]
        input: PathBuf,
        /// Clinic logo image.
        #[arg(long, value_name = "PATH")]
        logo: Option<PathBuf>,
        /// Output file (defaults to the report's file name).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Render without storing the report.
        #[arg(long)]
        no_save: bool,
    },

    /// List stored reports, newest first.
    List {
        /// Maximum number of reports.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print a stored report as JSON.
    Show {
        /// Report id.
        id: i64,
    },

    /// Render a stored report to PDF.
    Export {
        /// Report id.
        id: i64,
        /// Output file (defaults to the report's file name).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Delete a stored report and its logo.
    Delete {
        /// Report id.
        id: i64,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(Verbosity::from_flags(cli.quiet, cli.verbose));

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_from(cli.config).context("loading configuration")?;
    let service = ReportService::from_config(&config).context("opening report storage")?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(server::serve(&config, service))
        }
        Commands::Render {
            input,
            logo,
            output,
            no_save,
        } => render(&service, &input, logo.as_deref(), output, no_save),
        Commands::List { limit } => {
            let reports = service.list(limit)?;
            if reports.is_empty() {
                println!("No reports stored.");
            }
            for report in reports {
                println!(
                    "{:>6}  {}  {}",
                    report.id,
                    report.created_at.format("%Y-%m-%d %H:%M"),
                    report
                );
            }
            Ok(())
        }
        Commands::Show { id } => {
            let report = service.get(id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Export { id, output } => {
            let report = service.get(id)?;
            let rendered = service.render(&report, &RenderContext::now(CLI_CLIENT_ADDRESS))?;
            write_pdf(output, &rendered.filename, &rendered.bytes)
        }
        Commands::Delete { id } => {
            let report = service.delete(id)?;
            println!("Deleted report {} ({report})", report.id);
            Ok(())
        }
    }
}

fn render(
    service: &ReportService,
    input: &Path,
    logo: Option<&Path>,
    output: Option<PathBuf>,
    no_save: bool,
) -> Result<()> {
    let json = fs::read_to_string(input)
        .with_context(|| format!("reading form from {}", input.display()))?;
    let mut form: ConsultationForm = serde_json::from_str(&json)
        .with_context(|| format!("parsing form JSON in {}", input.display()))?;

    if let Some(path) = logo {
        let bytes =
            fs::read(path).with_context(|| format!("reading logo from {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        form.clinic_logo = Some(LogoUpload::new(filename, None, bytes));
    }

    let context = RenderContext::now(CLI_CLIENT_ADDRESS);
    let result = if no_save {
        service.preview(&form, &context)
    } else {
        service.submit(&form, &context).map(|(report, rendered)| {
            println!("Stored report {}", report.id);
            rendered
        })
    };

    let rendered = match result {
        Ok(rendered) => rendered,
        Err(ReportError::Validation(errors)) => {
            for error in errors.flatten() {
                eprintln!("{}: {}", error.field.label(), error.message);
            }
            bail!("the form has {} invalid field(s)", errors.len());
        }
        Err(err) => return Err(err.into()),
    };

    write_pdf(output, &rendered.filename, &rendered.bytes)
}

fn write_pdf(output: Option<PathBuf>, filename: &str, bytes: &[u8]) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(filename));
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
