//! basaltc: compile JSON-encoded Basalt syntax trees to bytecode.
//!
//! Every file is one compilation unit. Units are compiled in the order given,
//! against one shared namespace registry.

use std::path::PathBuf;
use std::process;

use basalt::error::Severity;
use basalt::{
    compile_file, disassemble, BasaltError, CompilerOptions, Diagnostic, NamespaceRegistry,
};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{debug, error};

#[derive(Parser)]
#[command(name = "basaltc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Basalt bytecode compiler", long_about = None)]
struct Cli {
    /// Syntax tree files (JSON), compiled in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// How to print compiled functions
    #[arg(long, value_enum, default_value_t = Format::Disasm)]
    format: Format,

    /// Do not report warnings
    #[arg(long)]
    no_warnings: bool,

    /// Disable colored diagnostics
    #[arg(long)]
    no_color: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Human-readable disassembly
    Disasm,
    /// The compiled function tree as JSON
    Json,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("BASALT_LOG", "warn")).init();

    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let registry = NamespaceRegistry::new();
    let mut failed = false;

    for path in &cli.files {
        let file = path.display().to_string();
        let options = CompilerOptions {
            warn_unused_values: !cli.no_warnings,
            warn_unreachable_code: !cli.no_warnings,
            ..CompilerOptions::for_file(file.clone())
        };

        let output = match compile_file(path, &options, &registry) {
            Ok(output) => output,
            Err(e) => {
                error!("{}: {}", file, e);
                eprintln!("{} {}: {}", "error:".red().bold(), file, e);
                failed = true;
                continue;
            }
        };

        for diagnostic in output.diagnostics.iter() {
            eprintln!("{}", render(diagnostic));
        }

        let Some(function) = output.function else {
            let e = BasaltError::Compile {
                failures: output.diagnostics.failures().count(),
            };
            error!("{}: {}", file, e);
            eprintln!("{} {}: {}", "error:".red().bold(), file, e);
            failed = true;
            continue;
        };
        debug!("{}: compiled {}", file, function.name);

        match cli.format {
            Format::Disasm => println!("{}", disassemble(&function)),
            Format::Json => match serde_json::to_string_pretty(&function) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("{} {}: {}", "error:".red().bold(), file, e);
                    failed = true;
                }
            },
        }
    }

    if failed {
        process::exit(1);
    }
}

fn render(diagnostic: &Diagnostic) -> String {
    let label = match diagnostic.severity() {
        Severity::Failure => "failure".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    };
    format!(
        "{}: {}: {}",
        diagnostic.location.to_string().dimmed(),
        label,
        diagnostic.message()
    )
}
