use edgeside_query_sql_example::worker;

#[tokio::main]
async fn main() -> edgeside::Result<()> {
    tracing_subscriber::fmt::init();

    edgeside::run(worker()?).await
}
