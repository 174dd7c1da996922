use courier::config::Config;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = Config::load()?;

    courier::run(config).await
}
