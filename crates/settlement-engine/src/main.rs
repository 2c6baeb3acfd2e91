#[tokio::main]
async fn main() {
    settlement_engine::run(std::env::args()).await;
}
