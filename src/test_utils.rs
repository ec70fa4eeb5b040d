#[cfg(test)]
use std::path::PathBuf;

#[cfg(test)]
pub(crate) struct ScopedEnvVar {
    key: &'static str,
    original: Option<String>,
}

#[cfg(test)]
impl ScopedEnvVar {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self { key, original }
    }
}

#[cfg(test)]
impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        if let Some(value) = self.original.as_deref() {
            std::env::set_var(self.key, value);
        } else {
            std::env::remove_var(self.key);
        }
    }
}

// A unique config path under the system temp dir; tests own the cleanup.
#[cfg(test)]
pub(crate) fn temp_config_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "thinkgate-test-{}.json",
        uuid::Uuid::new_v4().simple()
    ))
}
