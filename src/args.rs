use clap::Parser;

/// This is a Single Transferable Vote tabulation program for ward counts.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The ballot data file for the ward. For more information
    /// about the file format, read the manual of the stv_counting crate.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (file path) A reference file containing the summary of a count in JSON
    /// format. If provided, wardcount will check that the tabulated output
    /// matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path or 'stdout') If specified, the per-stage summary of the
    /// count will be written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (default candidate-number) How to break ties between candidates with
    /// equal totals: 'candidate-number' or 'random'.
    #[clap(long, value_parser)]
    pub tiebreak: Option<String>,

    /// The seed for the 'random' tie-break mode.
    #[clap(long, value_parser)]
    pub random_seed: Option<u32>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard
    /// output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
