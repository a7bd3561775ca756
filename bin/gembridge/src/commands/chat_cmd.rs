use gembridge_browser::ChromeLauncher;
use gembridge_core::{Config, Paths};
use gembridge_pipeline::{ChatService, SessionHandle};
use std::sync::Arc;
use tracing::warn;

/// One chat turn from the command line, on a browser started just for it.
pub async fn run(message: String, model: Option<String>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    paths.ensure_dirs()?;

    let session = Arc::new(SessionHandle::new());
    let launcher = ChromeLauncher::new(&config.browser, &paths);
    session.startup(&launcher).await;

    let service = ChatService::new(&config, &paths, Arc::clone(&session));
    let result = service.run_chat(&message, model.as_deref()).await;

    if let Some(page) = session.page() {
        if let Err(e) = page.close().await {
            warn!("Failed to close the browser: {}", e);
        }
    }

    let answer = result?;
    println!("{}", answer);
    Ok(())
}
