use edgeside_web_api_example::worker;

#[tokio::main]
async fn main() -> edgeside::Result<()> {
    tracing_subscriber::fmt::init();

    edgeside::run(worker()?).await
}
