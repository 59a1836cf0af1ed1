use crate::error::InitError;
use crate::shader::VariantTable;

/// Disables redundant-state coalescing; every draw re-emits render state, viewport, scissor and target.
pub const NO_COALESCE_ENV: &str = "AERO_GL_COMPAT_NO_COALESCE";
/// Overrides the variant tried once when a pipeline fails to build.
pub const FALLBACK_VARIANT_ENV: &str = "AERO_GL_COMPAT_FALLBACK_VARIANT";

pub const DEFAULT_SHADER_ROOT: &str = "shaders/core";
pub const DEFAULT_FALLBACK_VARIANT: &str = "position_tex_color";
pub const DEFAULT_MAX_TEXTURE_UNITS: u32 = 16;
/// Upper bound on texture units; matches the widest fixed-function sampler array we expose.
pub const MAX_TEXTURE_UNITS_LIMIT: u32 = 32;
/// ~10 seconds of frames at 60 Hz.
pub const DEFAULT_WARN_INTERVAL: u64 = 600;

#[derive(Debug, Clone)]
pub struct TranslatorConfig {
    /// Logical directory handed to the [`crate::ShaderSourceLoader`].
    pub shader_root: String,
    pub fallback_variant: String,
    pub max_texture_units: u32,
    pub coalesce_state: bool,
    /// Occurrences between repeated rate-limited warnings.
    pub warn_interval: u64,
    pub variants: VariantTable,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            shader_root: DEFAULT_SHADER_ROOT.to_string(),
            fallback_variant: DEFAULT_FALLBACK_VARIANT.to_string(),
            max_texture_units: DEFAULT_MAX_TEXTURE_UNITS,
            coalesce_state: true,
            warn_interval: DEFAULT_WARN_INTERVAL,
            variants: VariantTable::default(),
        }
    }
}

impl TranslatorConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if env_var_truthy(NO_COALESCE_ENV) {
            config.coalesce_state = false;
        }
        if let Ok(raw) = std::env::var(FALLBACK_VARIANT_ENV) {
            let variant = raw.trim();
            if !variant.is_empty() {
                config.fallback_variant = variant.to_string();
            }
        }
        config
    }

    /// Checks the config and clamps `max_texture_units` into range.
    pub fn validate(mut self) -> Result<Self, InitError> {
        if self.shader_root.trim().is_empty() {
            return Err(InitError::InvalidConfig("shader_root is empty".into()));
        }
        if self.fallback_variant.trim().is_empty() {
            return Err(InitError::InvalidConfig("fallback_variant is empty".into()));
        }
        self.max_texture_units = self.max_texture_units.clamp(1, MAX_TEXTURE_UNITS_LIMIT);
        self.warn_interval = self.warn_interval.max(1);
        Ok(self)
    }
}

pub(crate) fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };

    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_clamps_texture_units() {
        let config = TranslatorConfig {
            max_texture_units: 0,
            ..TranslatorConfig::default()
        };
        assert_eq!(config.validate().unwrap().max_texture_units, 1);

        let config = TranslatorConfig {
            max_texture_units: 1000,
            ..TranslatorConfig::default()
        };
        assert_eq!(
            config.validate().unwrap().max_texture_units,
            MAX_TEXTURE_UNITS_LIMIT
        );
    }

    #[test]
    fn validate_rejects_empty_fallback() {
        let config = TranslatorConfig {
            fallback_variant: "  ".into(),
            ..TranslatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(InitError::InvalidConfig(_))));
    }

    #[test]
    fn env_overrides_apply() {
        // Single test touches these vars to avoid racing other tests.
        std::env::set_var(NO_COALESCE_ENV, "yes");
        std::env::set_var(FALLBACK_VARIANT_ENV, " position_color ");
        let config = TranslatorConfig::from_env();
        std::env::remove_var(NO_COALESCE_ENV);
        std::env::remove_var(FALLBACK_VARIANT_ENV);

        assert!(!config.coalesce_state);
        assert_eq!(config.fallback_variant, "position_color");

        let config = TranslatorConfig::from_env();
        assert!(config.coalesce_state);
        assert_eq!(config.fallback_variant, DEFAULT_FALLBACK_VARIANT);
    }
}
