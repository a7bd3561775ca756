use gembridge_core::{Config, Paths};
use std::io::{self, Write};

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    if paths.config_file().exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    paths.ensure_dirs()?;

    let config = Config::default();
    config.save(&paths.config_file())?;
    println!("✓ Created config: {}", paths.config_file().display());
    println!("✓ Browser profile: {}", config.browser.profile_dir(&paths).display());
    println!("✓ Diagnostics: {}", paths.diagnostics_dir().display());
    println!();
    println!("Next steps:");
    println!("  1. Run `gembridge login` and sign in to your Google account");
    println!("  2. Optionally set gateway.apiToken in {}", paths.config_file().display());
    println!("  3. Run `gembridge gateway` to serve the API");

    Ok(())
}
