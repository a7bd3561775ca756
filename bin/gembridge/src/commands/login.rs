use gembridge_browser::{is_sign_in_url, ChromeLauncher, Launcher};
use gembridge_core::{Config, Paths};
use std::io::{self, Write};
use tracing::warn;

/// Open a visible browser on the gateway's profile so the user can sign in once.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    paths.ensure_dirs()?;

    let launcher = ChromeLauncher::new(&config.browser, &paths).with_headless(false);
    println!("Opening {} with profile {}", config.browser.app_url, launcher.profile_dir().display());
    let page = launcher.launch().await?;

    println!();
    println!("Sign in to your Google account in the browser window.");
    print!("Press Enter here once the chat page is showing... ");
    io::stdout().flush()?;

    tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        io::stdin().read_line(&mut input).map(|_| ())
    })
    .await??;

    match page.current_url().await {
        Ok(url) if is_sign_in_url(&url) => {
            warn!(url = %url, "Still on the sign-in page");
            println!("⚠️  Still on the sign-in page; the profile may not be signed in.");
        }
        Ok(url) => println!("✓ Signed in, page at {}", url),
        Err(e) => warn!("Could not read the page URL: {}", e),
    }

    page.close().await?;
    println!("✓ Profile saved: {}", launcher.profile_dir().display());
    Ok(())
}
