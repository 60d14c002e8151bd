#[tokio::main]
async fn main() {
    if let Err(e) = autolabel::run().await {
        eprintln!("autolabel: {e}");
        std::process::exit(1);
    }
}
