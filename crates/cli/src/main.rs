use std::process::ExitCode;

fn main() -> ExitCode {
    knowbot_cli::run()
}
