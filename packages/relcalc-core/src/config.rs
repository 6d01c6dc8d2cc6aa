//! Engine configuration.

use std::time::Duration;

/// Number formatting rules used for display values.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLocale {
    /// Decimal separator
    pub decimal_separator: char,
    /// Thousands grouping separator (None = no grouping)
    pub grouping_separator: Option<char>,
}

impl NumberLocale {
    /// `1,234.5` style.
    pub fn en() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: Some(','),
        }
    }

    /// `1 234,5` style.
    pub fn ru() -> Self {
        Self {
            decimal_separator: ',',
            grouping_separator: Some('\u{a0}'),
        }
    }
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self::en()
    }
}

/// Display settings for type-aware stringification.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOptions {
    /// Number formatting
    pub locale: NumberLocale,
    /// Label for `true`
    pub yes_label: String,
    /// Label for `false`
    pub no_label: String,
    /// Shown for values that would need more than one hop to resolve
    pub derived_placeholder: String,
    /// chrono format used when a date column has none
    pub default_date_format: String,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            locale: NumberLocale::default(),
            yes_label: "Yes".to_string(),
            no_label: "No".to_string(),
            derived_placeholder: "—".to_string(),
            default_date_format: "%Y-%m-%d".to_string(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of a computed cell, a safety net for missed change events
    pub entry_ttl: Duration,
    /// Lifetime of a cached transient failure
    pub error_ttl: Duration,
    /// Window during which row requests for one table are merged (zero = one yield)
    pub batch_window: Duration,
    /// Upper bound for a single store call
    pub store_timeout: Duration,
    /// Display formatting
    pub display: DisplayOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(30),
            error_ttl: Duration::from_secs(2),
            batch_window: Duration::from_millis(2),
            store_timeout: Duration::from_secs(5),
            display: DisplayOptions::default(),
        }
    }
}
