//! Command-line surface (spec.md §6). Two verbs, `create`/`c` and
//! `apply`/`patch`/`a`, with `--name=value` flags — clap's derive parser
//! accepts both `--name value` and `--name=value` natively, so no custom
//! splitting is needed, matching `arxdev`'s `cli.rs` shape elsewhere in the
//! retrieval pack.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// A `y`/`n` flag value, matching the wire vocabulary of spec.md §6
/// exactly rather than accepting any bool spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    #[must_use]
    pub fn as_bool(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl FromStr for YesNo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "y" => Ok(Self::Yes),
            "n" => Ok(Self::No),
            other => Err(format!("expected 'y' or 'n', got {other:?}")),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "xdpatch", about = "A binary differential patch engine for files and directory trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a patch from an original and an edited artifact.
    #[command(alias = "c")]
    Create {
        original: PathBuf,
        edited: PathBuf,
        patchfile: PathBuf,

        #[arg(long = "memory", default_value = "n")]
        memory: YesNo,

        #[arg(long = "chsize", default_value_t = 0x800)]
        chsize: usize,

        #[arg(long = "lensize", default_value_t = 0x200)]
        lensize: usize,

        #[arg(long = "crccmp", default_value = "n")]
        crccmp: YesNo,
    },

    /// Apply a patch to an original artifact.
    #[command(aliases = ["patch", "a"])]
    Apply {
        original: PathBuf,
        patchfile: PathBuf,
        output: Option<PathBuf>,

        #[arg(long = "memory", default_value = "y")]
        memory: YesNo,

        #[arg(long = "includea", default_value = "y")]
        includea: YesNo,

        #[arg(long = "includer", default_value = "y")]
        includer: YesNo,

        #[arg(long = "included", default_value = "y")]
        included: YesNo,
    },
}
