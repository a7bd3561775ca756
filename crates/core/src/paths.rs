use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".gembridge"))
            .unwrap_or_else(|| PathBuf::from(".gembridge"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Persisted Chrome profile holding the signed-in web session.
    pub fn profile_dir(&self) -> PathBuf {
        self.base.join("browser-profile")
    }

    /// Screenshots captured when a chat turn fails.
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.base.join("diagnostics")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.profile_dir())?;
        std::fs::create_dir_all(self.diagnostics_dir())?;
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
