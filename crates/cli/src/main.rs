use std::process::ExitCode;

fn main() -> ExitCode {
    querent_cli::run()
}
