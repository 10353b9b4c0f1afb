use anyhow::Result;
use panelchat::api::logging::init_tracing;
use panelchat::app::App;
use panelchat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let config = Config::load()?;
    config.validate()?;

    let mut app = App::new(config)?;
    let result = app.run().await;
    if let Err(error) = &result {
        tracing::error!(error = %format!("{error:#}"), "exiting with error");
    }
    result
}
