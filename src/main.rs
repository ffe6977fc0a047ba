mod cli;

use clap::Parser;
use cli::{Cli, Command};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use xdpatch::{DifferOptions, Error, IncludeMask, Transcript};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Create {
            original,
            edited,
            patchfile,
            memory,
            chsize,
            lensize,
            crccmp,
        } => run_create(&original, &edited, &patchfile, memory.as_bool(), chsize, lensize, crccmp.as_bool()),
        Command::Apply {
            original,
            patchfile,
            output,
            memory,
            includea,
            includer,
            included,
        } => run_apply(
            &original,
            &patchfile,
            output.as_deref(),
            memory.as_bool(),
            &IncludeMask {
                additions: includea.as_bool(),
                diffs: includer.as_bool(),
                deletions: included.as_bool(),
            },
        ),
    }
}

fn run_create(
    original: &Path,
    edited: &Path,
    patchfile: &Path,
    memory: bool,
    chsize: usize,
    lensize: usize,
    crccmp: bool,
) -> ExitCode {
    let original_meta = match std::fs::metadata(original) {
        Ok(m) => m,
        Err(err) => return usage_error(&format!("cannot stat {}: {err}", original.display())),
    };

    let options = DifferOptions {
        chunk_size: chsize,
        probe_size: lensize,
    };

    let (patch, transcript) = if original_meta.is_dir() {
        match xdpatch::create_directory_patch(original, edited, &options) {
            Ok(result) => result,
            Err(err) => return input_error(&format!("{err}")),
        }
    } else {
        let original_buf = match xdpatch::InputBuffer::open(original, memory) {
            Ok(b) => b,
            Err(err) => return input_error(&format!("cannot read {}: {err}", original.display())),
        };
        let edited_bytes = match std::fs::read(edited) {
            Ok(b) => b,
            Err(err) => return input_error(&format!("cannot read {}: {err}", edited.display())),
        };
        xdpatch::create_file_patch(
            original_buf.as_slice(),
            &edited_bytes,
            &options,
            crccmp,
            &original.display().to_string(),
        )
    };

    print_transcript(&transcript);

    if let Err(err) = std::fs::write(patchfile, &patch) {
        return input_error(&format!("cannot write {}: {err}", patchfile.display()));
    }

    println!("wrote {} bytes to {}", patch.len(), patchfile.display());
    ExitCode::SUCCESS
}

fn run_apply(
    original: &Path,
    patchfile: &Path,
    output: Option<&Path>,
    memory: bool,
    include: &IncludeMask,
) -> ExitCode {
    let original_meta = match std::fs::metadata(original) {
        Ok(m) => m,
        Err(err) => return usage_error(&format!("cannot stat {}: {err}", original.display())),
    };

    let patch_bytes = match std::fs::read(patchfile) {
        Ok(b) => b,
        Err(err) => return input_error(&format!("cannot read {}: {err}", patchfile.display())),
    };

    if original_meta.is_dir() {
        match xdpatch::apply_directory_patch(original, &patch_bytes, include) {
            Ok(0) => {
                println!("directory patch applied cleanly");
                ExitCode::SUCCESS
            }
            Ok(failures) => {
                eprintln!("{failures} entries failed to apply");
                ExitCode::from(failures.min(255) as u8)
            }
            Err(err) => patch_error(&err),
        }
    } else {
        let original_buf = match xdpatch::InputBuffer::open(original, memory) {
            Ok(b) => b,
            Err(err) => return input_error(&format!("cannot read {}: {err}", original.display())),
        };
        let original_bytes = original_buf.as_slice();
        match xdpatch::apply_file_patch(original_bytes, &patch_bytes) {
            Ok(result) => {
                let dest = output.unwrap_or(original);
                if let Err(err) = std::fs::write(dest, result) {
                    return input_error(&format!("cannot write {}: {err}", dest.display()));
                }
                println!("wrote {}", dest.display());
                ExitCode::SUCCESS
            }
            Err(err) => patch_error(&err),
        }
    }
}

fn print_transcript(transcript: &[Transcript]) {
    for entry in transcript {
        match entry {
            Transcript::Identical { path } => println!("{path}: identical"),
            Transcript::Instruction {
                path,
                index,
                og_offset,
                og_length,
                new_length,
                replacement,
            } => println!(
                "{path}: #{index} offset={og_offset} length={og_length} new_length={new_length} replacement={replacement}"
            ),
            Transcript::Added { path } => println!("{path}: added"),
            Transcript::Deleted { path } => println!("{path}: deleted"),
        }
    }
}

fn usage_error(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::from(1)
}

fn input_error(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::from(2)
}

fn patch_error(err: &Error) -> ExitCode {
    eprintln!("error: {err}");
    match err {
        Error::InvalidFileMagic | Error::InvalidDirectoryMagic | Error::TruncatedPatch => ExitCode::from(3),
        Error::CrcMismatch | Error::EntryCrcMismatch(_) => ExitCode::from(4),
        _ => ExitCode::from(5),
    }
}
