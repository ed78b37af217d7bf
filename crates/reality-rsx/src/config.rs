//! Process-wide analyser configuration.
//!
//! Diagnostics are toggled through environment variables so they can be
//! enabled in production builds without code changes. Values are parsed once
//! on first use; invalid values are ignored with a warning rather than
//! failing the process.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// When set, every vertex program analysis first dumps its raw input
    /// window to `<cache_dir>/shaderlog/vp_analyser.bin`.
    pub debug_program_analyser: bool,
    /// Root directory for diagnostic dumps.
    pub cache_dir: PathBuf,
}

impl AnalyserConfig {
    const DEBUG_PROGRAM_ANALYSER_VAR: &'static str = "REALITY_RSX_DEBUG_PROGRAM_ANALYSER";
    const CACHE_DIR_VAR: &'static str = "REALITY_RSX_CACHE_DIR";

    fn parse_env_bool(var: &'static str) -> Option<bool> {
        let raw = match std::env::var(var) {
            Ok(v) => v,
            Err(std::env::VarError::NotPresent) => return None,
            Err(std::env::VarError::NotUnicode(_)) => {
                warn!(
                    env_var = var,
                    "Ignoring {var} because it is not valid unicode"
                );
                return None;
            }
        };

        match raw.trim() {
            "1" | "true" | "on" => Some(true),
            "0" | "false" | "off" => Some(false),
            other => {
                warn!(
                    env_var = var,
                    value = %other,
                    "Ignoring {var} because it is not a boolean"
                );
                None
            }
        }
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        let mut config = Self {
            debug_program_analyser: false,
            cache_dir: PathBuf::from("cache"),
        };

        if let Some(v) = Self::parse_env_bool(Self::DEBUG_PROGRAM_ANALYSER_VAR) {
            config.debug_program_analyser = v;
        }
        if let Ok(dir) = std::env::var(Self::CACHE_DIR_VAR) {
            if !dir.trim().is_empty() {
                config.cache_dir = PathBuf::from(dir);
            }
        }

        config
    }
}

/// Global analyser configuration, read once on first use.
pub fn get() -> &'static AnalyserConfig {
    static CONFIG: OnceLock<AnalyserConfig> = OnceLock::new();
    CONFIG.get_or_init(AnalyserConfig::default)
}
