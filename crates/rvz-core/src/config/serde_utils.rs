//! Serde helpers for configuration files

/// Duration stored as whole seconds, or as a suffixed string
///
/// Deserializes either an integer number of seconds (`poll_interval = 5`) or
/// a string with a `ms`, `s` or `m` suffix (`poll_interval = "250ms"`).
/// Serializes whole seconds as an integer and anything finer as milliseconds.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "rvz_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    /// Serialize a Duration as seconds, or milliseconds when not whole
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a Duration from seconds or a suffixed string
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        }
    }

    /// Parse `"250ms"`, `"5s"`, `"2m"` or a bare number of seconds
    pub fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let (digits, unit) = match text.find(|c: char| !c.is_ascii_digit()) {
            Some(idx) => text.split_at(idx),
            None => (text, "s"),
        };

        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration: {:?}", text))?;

        match unit.trim() {
            "ms" => Ok(Duration::from_millis(value)),
            "s" => Ok(Duration::from_secs(value)),
            "m" => value
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("duration out of range: {:?}", text)),
            other => Err(format!("unknown duration unit {:?} in {:?}", other, text)),
        }
    }
}
