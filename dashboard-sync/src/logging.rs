use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// Output format of the global subscriber, selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::select(std::env::var("LOG_FORMAT").ok().as_deref())
    }

    /// `json` (any case) selects JSON lines, anything else the compact format
    pub fn select(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

// Initialise an INFO `Subscriber` for `Tracing` logs and install it as the global default.
pub fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(cfg!(debug_assertions))
            .compact()
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_select() {
        struct TestCase {
            input: Option<&'static str>,
            expected: LogFormat,
        }

        let tests = vec![
            TestCase {
                // TC0: unset
                input: None,
                expected: LogFormat::Compact,
            },
            TestCase {
                // TC1: case-insensitive json
                input: Some(" JSON "),
                expected: LogFormat::Json,
            },
            TestCase {
                // TC2: unknown value
                input: Some("pretty"),
                expected: LogFormat::Compact,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(LogFormat::select(test.input), test.expected, "TC{} failed", index);
        }
    }
}
