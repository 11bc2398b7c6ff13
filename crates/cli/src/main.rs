use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    truthwatch_cli::run()
}
