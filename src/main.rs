use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    screenpilot::cli::main().await
}
