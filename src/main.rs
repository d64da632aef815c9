#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tether_server::run().await
}
