// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Command-line front end: argument parsing, criteria setup, exit
//! code mapping.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use dwarflint::debug;
use dwarflint::diag::{Cat, Sink, Term};
use dwarflint::{check_file, elf, Options};

/// Pedantic checking of DWARF stored in ELF files.
#[derive(Debug, Parser)]
#[command(name = "dwarflint", version, about)]
struct Args {
    /// Be extremely strict, flag level 2 features.
    #[arg(long)]
    strict: bool,

    /// Do not print anything if successful.
    #[arg(short, long)]
    quiet: bool,

    /// Don't complain if files have no DWARF at all.
    #[arg(short = 'i', long = "ignore-missing")]
    ignore_missing: bool,

    /// Binary has been created with GNU toolchain and is therefore
    /// known to be broken in certain ways.
    #[arg(long)]
    gnu: bool,

    /// Don't output certain common error messages.
    #[arg(long)]
    tolerant: bool,

    /// When validating .debug_loc and .debug_ranges, display
    /// information about the DIE referring to the entry in
    /// consideration.
    #[arg(long = "ref")]
    show_refs: bool,

    /// Don't run high-level tests.
    #[arg(long)]
    nohl: bool,

    /// Be verbose.
    #[arg(short, long)]
    verbose: bool,

    /// Input files.
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

/// Compile the CLI flags into warning and error criteria.
fn build_sink(args: &Args) -> Sink {
    let mut sink = Sink::default();
    sink.show_refs = args.show_refs;

    if args.ignore_missing {
        sink.warn_criteria.and(Term::rejects(Cat::ELF));
    }

    if args.gnu {
        sink.warn_criteria.and(Term::rejects(Cat::BLOAT));
    }

    if !args.strict {
        sink.warn_criteria.and(Term::rejects(Cat::STRINGS));
        sink.warn_criteria
            .and_not(Term::requires(Cat::LINE | Cat::HEADER | Cat::BLOAT));
        sink.warn_criteria.and(Term::rejects(Cat::PUBTYPES));
    }

    if args.tolerant {
        sink.warn_criteria.and(Term::rejects(Cat::LOC));
        sink.warn_criteria.and(Term::rejects(Cat::RANGES));
    }

    sink
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let verbose = args.verbose && !args.quiet;

    let mut sink = build_sink(&args);

    if verbose {
        dwarflint::dbglog::enable();
        println!("warning criteria: {}", sink.warn_criteria);
        println!("error criteria:   {}", sink.error_criteria);
    }

    let opts = Options {
        tolerate_nodebug: args.ignore_missing,
        tolerant_overlap: args.gnu || args.tolerant,
        range_coverage: false,
    };

    if args.nohl {
        // The high-level (post-structural) checks are layered on top
        // of this tool; the structural pass always runs.
        debug!("high-level checks disabled");
    }

    let only_one = args.files.len() == 1;
    for fname in &args.files {
        if !only_one {
            println!("\n{}:", fname.display());
        }

        let file = match elf::File::load(fname) {
            Ok(file) => file,
            Err(e) => {
                sink.error(
                    None,
                    format_args!("cannot open input file {}: {e}\n", fname.display()),
                );
                continue;
            }
        };

        let prev_error_count = sink.error_count;
        let checked = file
            .parse(&mut sink)
            .and_then(|elf| check_file(&elf, &opts, &mut sink));
        if let Err(e) = checked {
            debug!("{}: {e}", fname.display());
            sink.error(None, format_args!("Broken ELF.\n"));
            continue;
        }

        if prev_error_count == sink.error_count && !args.quiet {
            println!("No errors");
        }
    }

    Ok(if sink.error_count != 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
