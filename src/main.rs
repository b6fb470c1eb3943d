//! Prototype Showcase - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match prototype_showcase::run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(_) => std::process::ExitCode::FAILURE,
    }
}
