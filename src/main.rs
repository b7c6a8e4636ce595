#[tokio::main]
async fn main() {
    rechub::start_server().await;
}
