//! `wam` binary entry point.

fn main() {
    std::process::exit(wam::cli::run_cli());
}
