use std::process::ExitCode;

fn main() -> ExitCode {
    cantina_cli::run()
}
