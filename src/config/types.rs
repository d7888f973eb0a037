use std::fmt;
use std::sync::OnceLock;

use regex_lite::{Regex, RegexBuilder};
use serde::de::{Unexpected, Visitor};
use serde::{Deserialize, Deserializer};

/// A span of time written either as a number of seconds or as `1d 2h 3m 4s 500ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration(std::time::Duration);

impl Duration {
    pub fn from_secs(seconds: u64) -> Self {
        Self(std::time::Duration::from_secs(seconds))
    }
}

const UNITS: [(&str, u64); 5] = [
    ("days", 86_400_000),
    ("hours", 3_600_000),
    ("minutes", 60_000),
    ("seconds", 1_000),
    ("millis", 1),
];

/// Parses a unit string into milliseconds.
///
/// `None` if the string does not match. `Some(Err(_))` if it matches but overflows.
fn parse_millis(s: &str) -> Option<Result<u64, String>> {
    static REGEXP: OnceLock<Regex> = OnceLock::new();

    let regexp = REGEXP.get_or_init(|| {
        RegexBuilder::new(
            r"
            ^
            (?:(?<days>    \d+)d)?  \s*
            (?:(?<hours>   \d+)h)?  \s*
            (?:(?<minutes> \d+)m)?  \s*
            (?:(?<seconds> \d+)s)?  \s*
            (?:(?<millis>  \d+)ms)?
            $",
        )
        .ignore_whitespace(true)
        .build()
        .unwrap()
    });
    let captures = regexp.captures(s)?;

    let mut total = 0u64;
    let mut matched = false;

    for (name, scale) in UNITS {
        let Some(m) = captures.name(name) else {
            continue;
        };
        matched = true;

        let value = match m.as_str().parse::<u64>() {
            Ok(value) => value,
            Err(e) => return Some(Err(format!("could not parse {name} (`{}`): {e}", m.as_str()))),
        };

        match value.checked_mul(scale).and_then(|v| v.checked_add(total)) {
            Some(v) => total = v,
            None => return Some(Err(format!("duration `{s}` is too large"))),
        }
    }

    matched.then_some(Ok(total))
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a number of seconds or a duration like `1h 30m`")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_u64(v.try_into().map_err(E::custom)?)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Duration::from_secs(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match parse_millis(v) {
                    Some(Ok(millis)) => Ok(Duration(std::time::Duration::from_millis(millis))),
                    Some(Err(msg)) => Err(E::custom(msg)),
                    None => Err(E::invalid_value(Unexpected::Str(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(duration: std::time::Duration) -> Self {
        Self(duration)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        duration.0
    }
}

#[cfg(test)]
mod tests {
    use serde::de::value::{Error, StrDeserializer, U64Deserializer};
    use serde::de::IntoDeserializer;

    use super::*;

    fn parse(s: &str) -> Result<std::time::Duration, Error> {
        let de: StrDeserializer<'_, Error> = s.into_deserializer();

        Duration::deserialize(de).map(Into::into)
    }

    #[test]
    fn parses_unit_strings() {
        assert_eq!(parse("90s").unwrap().as_secs(), 90);
        assert_eq!(parse("1h 30m").unwrap().as_secs(), 5400);
        assert_eq!(parse("2d").unwrap().as_secs(), 172_800);
        assert_eq!(parse("1s 500ms").unwrap().as_millis(), 1_500);
    }

    #[test]
    fn parses_plain_seconds() {
        let de: U64Deserializer<Error> = 45u64.into_deserializer();

        assert_eq!(std::time::Duration::from(Duration::deserialize(de).unwrap()).as_secs(), 45);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("soon").is_err());
        assert!(parse("10 minutes").is_err());
    }
}
