//! CLI argument definitions for `aulos`.

use clap::{Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("aulos")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Identify, inspect, and decode music files")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .subcommand(
            Command::new("identify")
                .about("Dispatch a file and print its classification as JSON")
                .arg(
                    Arg::new("FILE")
                        .required(true)
                        .help("Path of the music file to identify"),
                )
                .arg(
                    Arg::new("device")
                        .long("device")
                        .value_name("ID")
                        .default_value("-1")
                        .help("Requested MIDI device id (-1 default, 0 standard, 1 FM, 2 soft, 3 wavetable, 4 soundfont)"),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode a sample file to WAV through the decoder facade")
                .arg(
                    Arg::new("FILE")
                        .required(true)
                        .help("Path of the sample file to decode"),
                )
                .arg(
                    Arg::new("OUTPUT")
                        .required(true)
                        .help("Path of the WAV file to write"),
                ),
        )
        .subcommand(Command::new("settings").about("List every configuration key and its default"))
}
