use placement_ai_api::{exit_code, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("application error: {err}");
        std::process::exit(exit_code(&err));
    }
}
