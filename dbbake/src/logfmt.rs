//! Log line formatting shared by the `env_logger` pipeline and the final CRITICAL line.
//!
//! Every line has the shape `[<ISO-8601 timestamp>] [<LEVEL>] [<component>] <message>`, where the
//! component is the log target. Structured fields can be appended with [`props`], which renders a
//! ` | Properties: <json>` suffix.

use std::io::Write;

use time::format_description::well_known::Rfc3339;

fn level_str(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARNING",
        log::Level::Info => "INFO",
        log::Level::Debug | log::Level::Trace => "DEBUG",
    }
}

fn timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "-".to_owned())
}

pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                timestamp(),
                level_str(record.level()),
                record.target(),
                record.args()
            )
        })
        .init();
}

/// Writes a CRITICAL line directly to stderr. CRITICAL is reserved for the fatal exit path and is
/// always followed by process termination, so it bypasses the logger's level filtering.
pub fn critical(component: &str, message: &str) {
    eprintln!(
        "[{}] [CRITICAL] [{}] {}",
        timestamp(),
        component,
        message
    );
}

/// Renders the structured-field suffix for a log message.
pub fn props(value: &serde_json::Value) -> String {
    format!(" | Properties: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_str(log::Level::Warn), "WARNING");
        assert_eq!(level_str(log::Level::Trace), "DEBUG");
        assert_eq!(level_str(log::Level::Error), "ERROR");
    }

    #[test]
    fn test_props_suffix() {
        let suffix = props(&serde_json::json!({ "attempt": 2 }));
        assert_eq!(suffix, r#" | Properties: {"attempt":2}"#);
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let value = timestamp();
        assert!(time::OffsetDateTime::parse(&value, &Rfc3339).is_ok(), "{value}");
    }
}
