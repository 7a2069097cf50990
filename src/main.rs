use vareval::*;

use std::path::{Path, PathBuf};

use clap::Parser;

/// Logging options shared by every subcommand
#[derive(clap::Args, Debug)]
struct LogArgs {
    /// Disable terminal logging, even for high severity alerts. Strongly discouraged for normal
    /// use.
    #[clap(long)]
    debug_disable_terminal_logging: bool,
    /// Force blocking for terminal logging. If too many messages are being spewed the logger,
    /// by default, does not block, but instead dumps a dropped-messages alert. This option
    /// forces it to block and dump even if too many are being sent.
    #[clap(long)]
    debug_forced_blocking_terminal_logging: bool,
    /// Path to send log (as JSON) to
    ///
    /// Error or higher severity alerts will still continue being shown at stderr (in addition
    /// to being added to the log)
    #[clap(long = "log")]
    log_file: Option<PathBuf>,
    /// Debug level (repeat for more: 0-warn, 1-info, 2-debug, 3-trace)
    #[clap(short, long, parse(from_occurrences))]
    debug: usize,
    /// Advanced configuration options to tweak the comparison behavior
    #[clap(short = 'Z', long, arg_enum)]
    advanced_config: Vec<compare_config::CommandLineCompareConfig>,
}

/// Evaluate recovered variables and types against ground truth
#[derive(Parser, Debug)]
#[clap(about, version, author)]
enum Args {
    /// Compare a decompiled program against its ground truth
    Compare {
        /// Path to the ground-truth program, as a JSON stub table
        ground_truth: PathBuf,
        /// Path to the decompiled program, as a JSON stub table
        decompiled: PathBuf,
        /// Also show the comparison of the primitive components of every variable
        #[clap(long)]
        flattened: bool,
        /// Output the ground-truth type graph as a GraphViz `.dot` file to the given path
        #[clap(long)]
        debug_output_graphviz: Option<PathBuf>,
        #[clap(flatten)]
        log: LogArgs,
    },
    /// Show the normalized form of a program
    Show {
        /// Path to the program, as a JSON stub table
        program: PathBuf,
        /// Output the type graph as a GraphViz `.dot` file to the given path
        #[clap(long)]
        debug_output_graphviz: Option<PathBuf>,
        #[clap(flatten)]
        log: LogArgs,
    },
}

impl Args {
    fn log_args(&mut self) -> LogArgs {
        let log = match self {
            Args::Compare { log, .. } | Args::Show { log, .. } => log,
        };
        LogArgs {
            debug_disable_terminal_logging: log.debug_disable_terminal_logging,
            debug_forced_blocking_terminal_logging: log.debug_forced_blocking_terminal_logging,
            log_file: log.log_file.take(),
            debug: log.debug,
            advanced_config: std::mem::take(&mut log.advanced_config),
        }
    }
}

fn write_graphviz(types: &datatype::TypeArena, path: &Path) -> errors::Result<()> {
    let mut f = std::fs::File::create(path)?;
    types.write_dot(&mut f)?;
    log::info!("Wrote type graph"; "path" => %path.display());
    Ok(())
}

fn run(args: Args) -> errors::Result<()> {
    match args {
        Args::Compare {
            ground_truth,
            decompiled,
            flattened,
            debug_output_graphviz,
            log: _,
        } => {
            let gt = parse_json::parse_from_json_file(&ground_truth)?;
            let dc = parse_json::parse_from_json_file(&decompiled)?;

            if let Some(path) = debug_output_graphviz {
                write_graphviz(&gt.types, &path)?;
            }

            let cmp = compare_program::ProgramCompare2::new(&gt, &dc)?;
            println!("{}", cmp.summary(flattened)?);
            println!("BYTES OVERLAPPED = {}", cmp.bytes_overlapped());
            println!("TOTAL BYTES = {}", cmp.get_bytes());
            match cmp.bytes_overlapped_fraction() {
                Some(frac) => println!("BYTE RECOVERY = {:.2}%", 100.0 * frac),
                None => println!("BYTE RECOVERY = N/A"),
            }
        }
        Args::Show {
            program,
            debug_output_graphviz,
            log: _,
        } => {
            let prog = parse_json::parse_from_json_file(&program)?;
            if let Some(path) = debug_output_graphviz {
                write_graphviz(&prog.types, &path)?;
            }
            print!("{}", prog);
        }
    }
    log::trace!("Done");
    Ok(())
}

fn main() {
    let mut args = Args::parse();
    let log_args = args.log_args();

    let logger = match crate::log::FileAndTermDrain::new(
        log_args.debug,
        log_args.debug_disable_terminal_logging,
        log_args.debug_forced_blocking_terminal_logging,
        log_args.log_file,
    ) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Could not set up logging: {}", e);
            std::process::exit(2);
        }
    };
    let log_guard = slog_scope::set_global_logger(logger);

    compare_config::CompareConfig::initialize(log_args.advanced_config);

    if let Err(e) = run(args) {
        log::crit!("Failed"; "error" => %e);
        drop(log_guard);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
