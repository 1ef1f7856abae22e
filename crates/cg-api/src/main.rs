#[tokio::main]
async fn main() {
    if let Err(err) = cg_api::run().await {
        tracing::error!(error = %err, "cg-api failed");
        std::process::exit(1);
    }
}
