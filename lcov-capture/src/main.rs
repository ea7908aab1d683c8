//! `lcov-capture` walks a directory tree for profile data files (`*.gcda`),
//! reconstructs coverage for each note/data pair with [`covinfo`], and
//! writes the accumulated result as an lcov tracefile named `app.info` in
//! the current directory.
//!
//! Problems with an individual pair (missing note file, stamp mismatch,
//! corruption) are reported to stderr and skip that pair only; the exit
//! status is non-zero only when the tracefile itself cannot be produced.
//!
//! [`covinfo`]: ../covinfo/index.html

#[macro_use]
extern crate clap;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate covinfo;
extern crate env_logger;
extern crate rustc_demangle;
extern crate termcolor;
extern crate walkdir;

/// Prints a progress line, similar to the cargo output.
macro_rules! progress {
    ($tag:expr, $fmt:expr $(, $args:expr)*) => {{
        (|| -> ::std::io::Result<()> {
            use ::termcolor::*;
            use ::std::io::Write;
            let stream = StandardStream::stderr(ColorChoice::Auto);
            let mut lock = stream.lock();
            lock.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
            write!(lock, "{:>12} ", $tag)?;
            lock.reset()?;
            writeln!(lock, $fmt $(, $args)*)?;
            Ok(())
        })().expect("print progress")
    }}
}

/// Prints a warning, similar to cargo output.
macro_rules! warning {
    ($fmt:expr $(, $args:expr)*) => {{
        (|| -> ::std::io::Result<()> {
            use ::termcolor::*;
            use ::std::io::Write;
            let stream = StandardStream::stderr(ColorChoice::Auto);
            let mut lock = stream.lock();
            lock.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
            write!(lock, "warning: ")?;
            lock.reset()?;
            writeln!(lock, $fmt $(, $args)*)?;
            Ok(())
        })().expect("print warning")
    }}
}

mod emit;
mod error;

use covinfo::Tables;
use error::{Error, Result};
use termcolor::*;
use walkdir::{DirEntry, WalkDir};

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

fn main() {
    if let Err(error) = run() {
        print_error(error).expect("error while printing error");
        exit(1);
    }
}

fn print_error(error: Error) -> io::Result<()> {
    let stream = StandardStream::stderr(ColorChoice::Auto);
    let mut lock = stream.lock();

    for (i, e) in error.iter().enumerate() {
        if i == 0 {
            lock.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_intense(true).set_bold(true))?;
            write!(lock, "error: ")?;
        } else {
            lock.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
            write!(lock, "caused by: ")?;
        }
        lock.reset()?;
        writeln!(lock, "{}", e)?;
    }
    if let Some(backtrace) = error.backtrace() {
        writeln!(lock, "\n{:?}", backtrace)?;
    }
    Ok(())
}

fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = parse_args();
    let directory = matches.value_of_os("DIRECTORY").map_or_else(|| PathBuf::from("."), PathBuf::from);

    progress!("Capturing", "coverage data from {}", directory.display());
    let data_files = find_data_files(&directory);
    progress!("Found", "{} data files in {}", data_files.len(), directory.display());

    let mut tables = Tables::new();
    for data_file in &data_files {
        progress!("Processing", "{}", data_file.display());
        if let Err(e) = process_one(data_file, &mut tables) {
            for (i, cause) in e.iter().enumerate() {
                if i == 0 {
                    warning!("{}: {}", data_file.display(), cause);
                } else {
                    warning!("  caused by: {}", cause);
                }
            }
        }
    }

    let tracefile = Path::new("app.info");
    emit::write_tracefile(tracefile, &tables)?;
    progress!("Finished", "{} creation", tracefile.display());

    Ok(())
}

/// Runs the whole pipeline for one data file, normalizing the library's
/// errors into the driver's chain.
fn process_one(data_file: &Path, tables: &mut Tables) -> Result<()> {
    covinfo::process_pair(data_file, tables)?;
    Ok(())
}

#[allow(dangerous_implicit_autorefs)]
fn parse_args() -> clap::ArgMatches<'static> {
    clap_app!(("lcov-capture") =>
        (author: crate_authors!(", "))
        (about: crate_description!())
        (version: crate_version!())
        (@arg DIRECTORY: "Root directory scanned for *.gcda files (default: current directory)")
    ).get_matches()
}

/// Walks the tree below `directory` collecting every data file, sorted
/// ascending so the aggregation order never depends on how the filesystem
/// enumerates entries. Hidden directories are pruned, as is conventional
/// for build trees.
fn find_data_files(directory: &Path) -> Vec<PathBuf> {
    fn is_hidden_dir(entry: &DirEntry) -> bool {
        entry.depth() > 0 && entry.file_type().is_dir()
            && entry.file_name().to_str().map_or(false, |name| name.starts_with('.'))
    }

    let mut data_files = Vec::new();
    let walk = WalkDir::new(directory).into_iter().filter_entry(|e| !is_hidden_dir(e));
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warning!("{}", e);
                continue;
            },
        };
        if entry.file_type().is_file() && entry.path().extension() == Some(OsStr::new("gcda")) {
            data_files.push(entry.path().to_owned());
        }
    }
    data_files.sort();
    data_files
}
