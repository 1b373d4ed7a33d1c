use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, MietteHandlerOpts, Result, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use freezec::freeze::{
    pipeline::{FreezeRequest, freeze},
    session::SessionConfig,
};

/// Variable holding the log filter, e.g. `FREEZE_LOG=debug`.
const LOG_VAR: &str = "FREEZE_LOG";

#[derive(Parser)]
#[command(
    name = "freeze_module",
    version,
    about = "Freeze a bootstrap script into a C byte array"
)]
struct Cli {
    /// Script to freeze
    input: PathBuf,
    /// Generated C source file
    output: PathBuf,
    /// Module name; the array is called `M_<module>`
    module: String,
    /// Let `FREEZE_OPTIMIZE` affect the generated code
    #[arg(long)]
    use_environment: bool,
}

fn init_logging() -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_target(false))
        .try_init()
        .into_diagnostic()
        .wrap_err("cannot initialize logging")?;
    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            MietteHandlerOpts::new()
                .color(true)
                .context_lines(3)
                .wrap_lines(false)
                .build(),
        )
    }))?;
    let _log = init_logging()?;

    println!("input: {}", cli.input.display());
    println!("output: {}", cli.output.display());
    println!("module: {}", cli.module);

    let config = if cli.use_environment {
        SessionConfig::from_env()?
    } else {
        SessionConfig::isolated()
    };
    freeze(
        &FreezeRequest {
            input: cli.input,
            output: cli.output,
            module: cli.module,
        },
        config,
    )
}
