use std::{path::Path, str::FromStr};

use fxhash::FxHashMap;

use crate::error::TimetableError;

/// Flat `key=value` solver configuration.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: FxHashMap<String, String>,
}

impl Properties {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Properties, anyhow::Error> {
        let content = std::fs::read_to_string(path)?;
        parse(&content)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed value of `key`, `default` when the key is absent.
    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, TimetableError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| TimetableError::InvalidProperty {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, TimetableError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(TimetableError::InvalidProperty {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            },
        }
    }
}

pub fn parse(text: &str) -> Result<Properties, anyhow::Error> {
    let mut properties = Properties::default();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .ok_or_else(|| anyhow::anyhow!(format!("Invalid property on line {}: {}", number + 1, line)))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow::anyhow!(format!(
                "Missing property name on line {}",
                number + 1
            )));
        }
        properties.set(key, value.trim());
    }

    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let properties = parse(
            "# spread\nSpread.SpreadFactor = 1.5\n\nGeneral.InteractiveMode=true\nDistances.Ellipsoid: WGS84\n",
        )
        .unwrap();

        assert_eq!(properties.len(), 3);
        assert_eq!(properties.get_or("Spread.SpreadFactor", 1.2).unwrap(), 1.5);
        assert!(properties.get_bool("General.InteractiveMode", false).unwrap());
        assert_eq!(properties.get("Distances.Ellipsoid"), Some("WGS84"));
        assert_eq!(properties.get_or("ForwardCheck.MaxDepth", 2usize).unwrap(), 2);
    }

    #[test]
    fn test_invalid_values() {
        let properties = parse("ForwardCheck.MaxDepth=two\nGeneral.InteractiveMode=maybe").unwrap();

        assert_eq!(
            properties.get_or("ForwardCheck.MaxDepth", 2usize),
            Err(TimetableError::InvalidProperty {
                key: String::from("ForwardCheck.MaxDepth"),
                value: String::from("two"),
            })
        );
        assert!(properties.get_bool("General.InteractiveMode", false).is_err());
    }

    #[test]
    fn test_malformed_line() {
        assert!(parse("Spread.SpreadFactor").is_err());
        assert!(parse("=1.0").is_err());
    }
}
