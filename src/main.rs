//! Command-line entry point for the ustar-unpack binary.

use clap::Parser;

fn main() {
    let cli = ustar_unpack::cli::Cli::parse();

    if let Err(err) = ustar_unpack::run(cli) {
        eprintln!("ustar-unpack: {err:#}");
        std::process::exit(ustar_unpack::error::exit_code(&err));
    }
}
