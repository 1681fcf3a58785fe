use anyhow::Result;
use clap::Parser;
use fanbench::chaos::ChaosConfig;
use fanbench::cli::{Cli, OutputFormat};
use fanbench::{report, Dispatcher, WorkloadParams};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; RUST_LOG overrides the level flags
fn init_tracing(debug: bool, quiet: bool) {
    let default = if debug {
        "trace"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Parse arguments, exiting with status 1 on usage errors
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version print to stdout and succeed
            let code = if e.use_stderr() { 1 } else { 0 };
            e.print().ok();
            std::process::exit(code);
        }
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    init_tracing(args.debug, args.quiet);

    let mut params = WorkloadParams::new().with_loop_count(args.loop_count);
    if let Some(dir) = &args.tmp_dir {
        params = params.with_tmp_dir(dir);
    }
    let chaos: ChaosConfig = args.inject_fault.iter().copied().collect();
    if !chaos.is_empty() {
        tracing::warn!("fault injection enabled: {:?}", chaos);
    }

    let dispatcher = Dispatcher::from_args(&args.worker_type, &args.unit_count, args.strategy)?
        .with_params(params)
        .with_chaos(chaos);
    let summary = dispatcher.run()?;

    let include_header = !(args.no_header && args.format == OutputFormat::Csv);
    print!("{}", report::render(&summary, args.format, include_header)?);
    if args.format == OutputFormat::Json {
        println!();
    }

    Ok(())
}
