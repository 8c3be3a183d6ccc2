//! Text codecs for marker lists and the registry that names them.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::debug;

use crate::dhms::{parse_dhms, seconds_to_dhms_precise};
use crate::error::{MarkerError, Result};
use crate::marker::{Marker, validate_seconds};
use crate::storage::MarkerStorage;

pub const JSON: &str = "json";
pub const MINIMAL: &str = "minimal";

/// Converts marker lists and single fields to and from text.
///
/// For every implementation `deserialize_all(serialize_all(list))` must equal
/// `list` as long as names avoid the implementation's delimiters.
pub trait MarkerFormatter: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn serialize_all(&self, markers: &[Marker]) -> Result<String>;

    /// Parses a whole list. Any malformed entry fails the whole parse.
    fn deserialize_all(&self, content: &str) -> Result<Vec<Marker>>;

    fn serialize_seconds(&self, seconds: f64) -> String;

    fn deserialize_seconds(&self, text: &str) -> Result<f64>;

    fn serialize_name(&self, name: &str) -> String;

    /// Returns `None` when the text holds no usable name.
    fn deserialize_name(&self, text: &str) -> Option<String>;
}

/// Structural JSON encoding: `[{"seconds":65.0,"name":"Intro"}]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl MarkerFormatter for JsonFormatter {
    fn name(&self) -> &'static str {
        JSON
    }

    fn serialize_all(&self, markers: &[Marker]) -> Result<String> {
        Ok(serde_json::to_string(markers)?)
    }

    fn deserialize_all(&self, content: &str) -> Result<Vec<Marker>> {
        let markers: Vec<Marker> = serde_json::from_str(content)?;
        for marker in &markers {
            validate_seconds(marker.seconds)?;
        }
        Ok(markers)
    }

    fn serialize_seconds(&self, seconds: f64) -> String {
        seconds.to_string()
    }

    fn deserialize_seconds(&self, text: &str) -> Result<f64> {
        let seconds = text.trim().parse::<f64>().map_err(|_| MarkerError::Parse {
            context: "json seconds",
            value: text.to_string(),
        })?;
        validate_seconds(seconds)
    }

    fn serialize_name(&self, name: &str) -> String {
        name.to_string()
    }

    fn deserialize_name(&self, text: &str) -> Option<String> {
        let name = text.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// One `<DHMS>\t<name>` line per marker. Fractional seconds are written
/// after the seconds component, e.g. `01:40.3`.
#[derive(Debug, Clone, Copy)]
pub struct MinimalFormatter {
    min_places: usize,
}

impl MinimalFormatter {
    pub fn new(min_places: usize) -> Self {
        Self { min_places }
    }
}

impl Default for MinimalFormatter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MarkerFormatter for MinimalFormatter {
    fn name(&self) -> &'static str {
        MINIMAL
    }

    fn serialize_all(&self, markers: &[Marker]) -> Result<String> {
        Ok(markers
            .iter()
            .map(|marker| {
                format!(
                    "{}\t{}",
                    seconds_to_dhms_precise(marker.seconds, self.min_places),
                    marker.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn deserialize_all(&self, content: &str) -> Result<Vec<Marker>> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_minimal_line)
            .collect()
    }

    fn serialize_seconds(&self, seconds: f64) -> String {
        seconds_to_dhms_precise(seconds, 1)
    }

    fn deserialize_seconds(&self, text: &str) -> Result<f64> {
        parse_dhms(text)
    }

    fn serialize_name(&self, name: &str) -> String {
        name.to_string()
    }

    fn deserialize_name(&self, text: &str) -> Option<String> {
        let name = text.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

fn parse_minimal_line(line: &str) -> Result<Marker> {
    // Pasted text often has spaces where the export wrote a tab.
    let (time, name) = line
        .split_once('\t')
        .or_else(|| line.split_once(char::is_whitespace))
        .unwrap_or((line, ""));

    let seconds = parse_dhms(time).map_err(|_| MarkerError::Parse {
        context: "minimal line",
        value: line.to_string(),
    })?;
    Ok(Marker::new(seconds, name.trim()))
}

/// Named formatters. Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct FormatterRegistry {
    formatters: HashMap<String, Arc<dyn MarkerFormatter>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `json` and `minimal`.
    ///
    /// # Example
    /// ```
    /// use markers::format::FormatterRegistry;
    ///
    /// let registry = FormatterRegistry::with_builtin(2);
    /// assert!(registry.get("minimal").is_ok());
    /// assert!(registry.get("yaml").is_err());
    /// ```
    pub fn with_builtin(minimal_min_places: usize) -> Self {
        let mut registry = Self::new();
        registry.register(JSON, Arc::new(JsonFormatter));
        registry.register(MINIMAL, Arc::new(MinimalFormatter::new(minimal_min_places)));
        registry
    }

    /// Adds or replaces a formatter, returning the one it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        formatter: Arc<dyn MarkerFormatter>,
    ) -> Option<Arc<dyn MarkerFormatter>> {
        let name = name.into();
        debug!(name = %name, "formatter registered");
        self.formatters.insert(name, formatter)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn MarkerFormatter>> {
        self.formatters
            .get(name)
            .cloned()
            .ok_or_else(|| MarkerError::UnknownFormatter {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formatters.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formatters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The formatter the user picked for editing and export.
    pub fn currently_selected(&self, storage: &MarkerStorage) -> Result<Arc<dyn MarkerFormatter>> {
        let name = storage.preferred_formatter()?;
        self.get(&name)
    }
}
