//! CLI argument definitions for `fpace`.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("fpace")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Pace decoded audio and video against the playback clock")
        .arg_required_else_help(true)
        .subcommand_negates_reqs(true)
        .arg(
            Arg::new("INPUT")
                .help("Audio file to play")
                .required_unless_present_any(["synthetic"])
                .index(1),
        )
        .arg(
            Arg::new("synthetic")
                .long("synthetic")
                .action(ArgAction::SetTrue)
                .conflicts_with("INPUT")
                .help("Play a generated test pattern instead of a file"),
        )
        .arg(
            Arg::new("seconds")
                .long("seconds")
                .value_name("SECONDS")
                .default_value("3.0")
                .value_parser(value_parser!(f64))
                .help("Length of the synthetic pattern"),
        )
        .arg(
            Arg::new("jitter-seed")
                .long("jitter-seed")
                .value_name("SEED")
                .value_parser(value_parser!(u64))
                .help("Stall random synthetic pulls, seeded for reproducibility"),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .action(ArgAction::SetTrue)
                .conflicts_with("virtual-audio")
                .help("Do not open an audio device; pace on the wall clock"),
        )
        .arg(
            Arg::new("virtual-audio")
                .long("virtual-audio")
                .action(ArgAction::SetTrue)
                .help("Play audio into a headless virtual device"),
        )
        .arg(
            Arg::new("settings")
                .long("settings")
                .value_name("PATH")
                .help("JSON file with playback settings"),
        )
        .arg(
            Arg::new("max-read-ahead-ms")
                .long("max-read-ahead-ms")
                .value_name("MS")
                .value_parser(value_parser!(i64))
                .help("How far decoding may run ahead of playback"),
        )
        .arg(
            Arg::new("stop-after-ms")
                .long("stop-after-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Stop playback after this long"),
        )
        .arg(
            Arg::new("progress")
                .long("progress")
                .action(ArgAction::SetTrue)
                .help("Log playback progress while running"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Show debug output"),
        )
        .subcommand(
            Command::new("settings").about("Print the default playback settings as JSON"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_does_not_need_input() {
        let matches = build_cli()
            .try_get_matches_from(["fpace", "--synthetic", "--no-audio", "--seconds", "0.5"])
            .unwrap();
        assert!(matches.get_flag("synthetic"));
        assert_eq!(matches.get_one::<f64>("seconds"), Some(&0.5));
    }

    #[test]
    fn settings_subcommand_needs_no_input() {
        let matches = build_cli()
            .try_get_matches_from(["fpace", "settings"])
            .unwrap();
        assert_eq!(matches.subcommand_name(), Some("settings"));
        assert!(matches.get_one::<String>("INPUT").is_none());
    }

    #[test]
    fn playback_still_needs_input_or_synthetic() {
        assert!(build_cli()
            .try_get_matches_from(["fpace", "--no-audio"])
            .is_err());
    }

    #[test]
    fn input_and_synthetic_conflict() {
        assert!(build_cli()
            .try_get_matches_from(["fpace", "song.wav", "--synthetic"])
            .is_err());
    }

    #[test]
    fn audio_modes_conflict() {
        assert!(build_cli()
            .try_get_matches_from(["fpace", "--synthetic", "--no-audio", "--virtual-audio"])
            .is_err());
    }
}
