//! Core instantiation options.

use std::path::PathBuf;

/// Options accepted by `Machine::init_with_config`.
///
/// `Machine::init` uses `CoreConfig::default()`.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    /// Skip the ROM/RAM header size cross-check. Useful for homebrew or
    /// test ROMs with nonstandard headers.
    pub skip_header_validation: bool,
    /// Override the battery-save file path instead of deriving it from the
    /// ROM path with a `.sav` extension.
    pub save_path_override: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_does_not_skip_validation() {
        let cfg = CoreConfig::default();
        assert!(!cfg.skip_header_validation);
        assert!(cfg.save_path_override.is_none());
    }
}
