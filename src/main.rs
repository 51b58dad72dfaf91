use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match termagent::cli::run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("termagent: {err:#}");
            ExitCode::FAILURE
        }
    }
}
