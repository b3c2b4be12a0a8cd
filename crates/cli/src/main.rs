use std::process::ExitCode;

fn main() -> ExitCode {
    freightq_cli::run()
}
