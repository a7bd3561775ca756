use gembridge_browser::find_browser_binary;
use gembridge_core::{Config, Paths};
use std::process::Command;

use super::gateway::API_TOKEN_ENV;

#[derive(Default)]
struct Tally {
    ok: u32,
    warn: u32,
    err: u32,
}

impl Tally {
    fn ok(&mut self, label: &str, detail: &str) {
        print_line("✅", label, detail);
        self.ok += 1;
    }

    fn warn(&mut self, label: &str, hint: &str) {
        print_line("⚠️ ", label, hint);
        self.warn += 1;
    }

    fn err(&mut self, label: &str, hint: &str) {
        print_line("❌", label, hint);
        self.err += 1;
    }
}

fn print_line(icon: &str, label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  {} {}", icon, label);
    } else {
        println!("  {} {}: {}", icon, label, detail);
    }
}

/// Check what the gateway needs before it can drive the web app.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut tally = Tally::default();

    println!();
    println!("🩺 gembridge doctor");
    println!("================================");
    println!();

    println!("📋 Configuration");
    let config_path = paths.config_file();
    let config = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(config) => {
                tally.ok("Config file valid", &config_path.display().to_string());
                config
            }
            Err(e) => {
                tally.err("Config file invalid", &e.to_string());
                Config::default()
            }
        }
    } else {
        tally.warn("Config file not found", "Run `gembridge onboard`; using defaults");
        Config::default()
    };
    println!("  App URL: {}", config.browser.app_url);
    println!();

    println!("🌍 Browser");
    match find_browser_binary(config.browser.binary.as_deref()) {
        Some(binary) => {
            let version = browser_version(&binary).unwrap_or_default();
            tally.ok(&format!("Browser found ({})", binary), &version);
        }
        None => tally.err(
            "No Chrome/Chromium/Edge binary found",
            "Install one or set browser.binary",
        ),
    }

    let profile = config.browser.profile_dir(&paths);
    let signed_in_marker = profile.join("Default").join("Cookies");
    if signed_in_marker.exists() {
        tally.ok("Browser profile", &profile.display().to_string());
    } else if profile.exists() {
        tally.warn(
            "Browser profile has no cookies yet",
            "Run `gembridge login` to sign in",
        );
    } else {
        tally.err("Browser profile missing", "Run `gembridge login` to sign in");
    }
    if config.browser.headless {
        println!("  Headless: yes");
    } else {
        println!("  Headless: no (a window will open)");
    }
    println!();

    println!("📁 Diagnostics");
    let diag = paths.diagnostics_dir();
    if !config.pipeline.screenshots {
        tally.ok("Failure screenshots disabled", "");
    } else if let Err(e) = std::fs::create_dir_all(&diag) {
        tally.err("Diagnostics directory not creatable", &e.to_string());
    } else {
        let probe = diag.join(".doctor_test");
        match std::fs::write(&probe, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                tally.ok("Diagnostics directory writable", &diag.display().to_string());
            }
            Err(e) => tally.err("Diagnostics directory not writable", &e.to_string()),
        }
    }
    println!();

    println!("🌐 Gateway");
    let bind_addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    println!("  Bind address: {}", bind_addr);
    match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(_) => tally.ok("Bind address available", ""),
        Err(e) => tally.warn("Bind address unavailable", &e.to_string()),
    }
    if std::env::var(API_TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty()) {
        tally.ok("API token configured", &format!("from {}", API_TOKEN_ENV));
    } else if config.api_token().is_some() {
        tally.ok("API token configured", "");
    } else {
        tally.warn(
            "API token not configured",
            "Recommended when exposed: set gateway.apiToken",
        );
    }
    println!("  Queue policy: {:?}", config.gateway.queue_policy);
    println!();

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  ✅ {} passed  ⚠️  {} warnings  ❌ {} errors",
        tally.ok, tally.warn, tally.err
    );
    println!();
    if tally.err > 0 {
        println!("  {} error(s) must be fixed before serving.", tally.err);
    } else if tally.warn > 0 {
        println!("  Ready to serve, with warnings.");
    } else {
        println!("  🎉 All good!");
    }
    println!();

    Ok(())
}

fn browser_version(binary: &str) -> Option<String> {
    let output = Command::new(binary).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Some(text.lines().next().unwrap_or("").trim().chars().take(40).collect())
}
