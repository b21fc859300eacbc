use std::process::ExitCode;

fn main() -> ExitCode {
    demande_cli::run()
}
