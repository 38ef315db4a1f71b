use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use myna::{
    expand_target, has_errors, module_summary, render_diagnostic, Environment, MynaError, Options,
    Source,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(MynaError::Diagnostics) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), MynaError> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "-h" | "--help" => {
            print_help();
            Ok(())
        }
        "compile" => cmd_compile(&rest),
        _ => {
            print_help();
            Ok(())
        }
    }
}

fn cmd_compile(args: &[String]) -> Result<(), MynaError> {
    let mut targets: Vec<String> = Vec::new();
    let mut output: Option<PathBuf> = None;
    let mut verbose = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let Some(dir) = iter.next() else {
                    print_help();
                    return Ok(());
                };
                output = Some(PathBuf::from(dir));
            }
            "-v" | "--verbose" => verbose = true,
            _ => targets.push(arg.clone()),
        }
    }
    if targets.is_empty() {
        print_help();
        return Ok(());
    }

    let mut sources: Vec<Source> = Vec::new();
    for target in &targets {
        sources.extend(expand_target(target)?);
    }

    let mut environment = Environment::new(Options { verbose });
    environment.parse_and_infer(&sources)?;

    for diag in environment.errors() {
        eprintln!("{}", render_diagnostic(diag));
    }

    if has_errors(environment.errors()) {
        return Err(MynaError::Diagnostics);
    }

    if let Some(output) = output {
        fs::create_dir_all(&output)?;
        for (name, module) in environment.modules() {
            let summary = module_summary(name, module);
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|err| MynaError::Io(std::io::Error::other(err)))?;
            fs::write(output.join(format!("{name}.json")), json)?;
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        "myna - the Myna compiler

Usage:
  myna compile <paths...> [-o DIR] [-v]

Options:
  -o, --output DIR   write typed module summaries to DIR
  -v, --verbose      report compilation progress
  -h, --help         show this help"
    );
}
