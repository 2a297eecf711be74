// SPDX-License-Identifier: GPL-3.0-only

//! Codec and muxer option descriptors
//!
//! Each codec or muxer publishes a list of [`PropertyOption`]s so a generic
//! settings surface can render and validate them. Values the user changed
//! are kept in an [`OptionValues`] map; anything absent resolves to the
//! descriptor default.

use super::fraction::Fraction;
use crate::element::lock;
use crate::element::notify::Signal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Runtime type of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionKind {
    Number,
    Boolean,
    Flags,
    String,
    Frac,
}

/// A concrete option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Frac(Fraction),
    Flags(Vec<String>),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            OptionValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n.round() as i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(b) => Some(*b),
            OptionValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Boolean(_) => OptionKind::Boolean,
            OptionValue::Number(_) => OptionKind::Number,
            OptionValue::String(_) => OptionKind::String,
            OptionValue::Frac(_) => OptionKind::Frac,
            OptionValue::Flags(_) => OptionKind::Flags,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Boolean(b) => write!(f, "{}", b),
            OptionValue::Number(n) => write!(f, "{}", n),
            OptionValue::String(s) => write!(f, "{}", s),
            OptionValue::Frac(frac) => write!(f, "{}", frac),
            OptionValue::Flags(flags) => write!(f, "{}", flags.join("|")),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Boolean(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Number(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Number(value as f64)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

/// A named choice in an option menu
#[derive(Debug, Clone, PartialEq)]
pub struct MenuOption {
    pub name: &'static str,
    pub description: &'static str,
    pub help: &'static str,
    pub value: OptionValue,
}

impl MenuOption {
    pub fn new(name: &'static str, description: &'static str, value: impl Into<OptionValue>) -> Self {
        Self {
            name,
            description,
            help: "",
            value: value.into(),
        }
    }
}

/// Describes one configurable option
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOption {
    pub name: &'static str,
    pub description: &'static str,
    pub help: &'static str,
    pub kind: OptionKind,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default_value: OptionValue,
    pub menu: Vec<MenuOption>,
}

impl PropertyOption {
    pub fn boolean(name: &'static str, description: &'static str, default: bool) -> Self {
        Self {
            name,
            description,
            help: "",
            kind: OptionKind::Boolean,
            min: 0.0,
            max: 1.0,
            step: 1.0,
            default_value: OptionValue::Boolean(default),
            menu: Vec::new(),
        }
    }

    pub fn number(
        name: &'static str,
        description: &'static str,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    ) -> Self {
        Self {
            name,
            description,
            help: "",
            kind: OptionKind::Number,
            min,
            max,
            step,
            default_value: OptionValue::Number(default),
            menu: Vec::new(),
        }
    }

    /// A numeric option restricted to a menu of choices
    pub fn number_menu(
        name: &'static str,
        description: &'static str,
        default: f64,
        menu: Vec<MenuOption>,
    ) -> Self {
        let max = menu
            .iter()
            .filter_map(|m| m.value.as_f64())
            .fold(0.0, f64::max);

        Self {
            menu,
            max,
            ..Self::number(name, description, 0.0, 0.0, 1.0, default)
        }
    }

    /// A string option restricted to a menu of choices
    pub fn string_menu(
        name: &'static str,
        description: &'static str,
        default: &str,
        menu: Vec<MenuOption>,
    ) -> Self {
        Self {
            name,
            description,
            help: "",
            kind: OptionKind::String,
            min: 0.0,
            max: 0.0,
            step: 0.0,
            default_value: OptionValue::String(default.to_string()),
            menu,
        }
    }

    pub fn with_help(mut self, help: &'static str) -> Self {
        self.help = help;
        self
    }

    /// Whether `value` has the right kind and lies in range or in the menu
    pub fn accepts(&self, value: &OptionValue) -> bool {
        if !self.menu.is_empty() {
            return self.menu.iter().any(|m| &m.value == value);
        }

        match (self.kind, value) {
            (OptionKind::Number, OptionValue::Number(n)) => *n >= self.min && *n <= self.max,
            (kind, value) => kind == value.kind(),
        }
    }
}

/// Find a descriptor by name
pub fn find_option<'a>(options: &'a [PropertyOption], name: &str) -> Option<&'a PropertyOption> {
    options.iter().find(|option| option.name == name)
}

/// Values changed from their defaults, keyed by option name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionValues {
    values: BTreeMap<String, OptionValue>,
}

impl OptionValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value, else the descriptor default. `None` for unknown names.
    pub fn value(&self, options: &[PropertyOption], name: &str) -> Option<OptionValue> {
        let option = find_option(options, name)?;

        Some(
            self.values
                .get(name)
                .cloned()
                .unwrap_or_else(|| option.default_value.clone()),
        )
    }

    /// Store a value, dropping it when it equals the default
    ///
    /// Returns whether the effective value changed. Unknown names and values
    /// the descriptor rejects are ignored.
    pub fn set(&mut self, options: &[PropertyOption], name: &str, value: OptionValue) -> bool {
        let Some(option) = find_option(options, name) else {
            return false;
        };

        if !option.accepts(&value) {
            return false;
        }

        let current = self
            .values
            .get(name)
            .cloned()
            .unwrap_or_else(|| option.default_value.clone());

        if current == value {
            return false;
        }

        if value == option.default_value {
            self.values.remove(name);
        } else {
            self.values.insert(name.to_string(), value);
        }

        true
    }

    /// Forget every stored value. Returns whether anything was stored.
    pub fn reset(&mut self) -> bool {
        let had_values = !self.values.is_empty();
        self.values.clear();
        had_values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.values.iter()
    }
}

/// Option table plus the values changed from their defaults
pub struct OptionStore {
    options: Vec<PropertyOption>,
    values: Mutex<OptionValues>,
    changed: Signal<(String, OptionValue)>,
}

impl OptionStore {
    pub fn new(options: Vec<PropertyOption>) -> Self {
        Self {
            options,
            values: Mutex::new(OptionValues::new()),
            changed: Signal::new(),
        }
    }

    pub fn options(&self) -> &[PropertyOption] {
        &self.options
    }

    pub fn changed(&self) -> &Signal<(String, OptionValue)> {
        &self.changed
    }

    pub fn value(&self, name: &str) -> Option<OptionValue> {
        lock(&self.values).value(&self.options, name)
    }

    pub fn set(&self, name: &str, value: OptionValue) -> bool {
        let changed = lock(&self.values).set(&self.options, name, value);

        if changed {
            if let Some(value) = self.value(name) {
                self.changed.emit(&(name.to_string(), value));
            }
        }

        changed
    }

    pub fn reset(&self) {
        let names: Vec<String> = {
            let mut values = lock(&self.values);
            let names = values.iter().map(|(name, _)| name.clone()).collect();
            values.reset();
            names
        };

        for name in names {
            if let Some(value) = self.value(&name) {
                self.changed.emit(&(name, value));
            }
        }
    }

    /// Every option resolved to its effective value
    pub fn resolved(&self) -> BTreeMap<String, OptionValue> {
        let values = lock(&self.values);

        self.options
            .iter()
            .filter_map(|option| {
                values
                    .value(&self.options, option.name)
                    .map(|value| (option.name.to_string(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<PropertyOption> {
        vec![
            PropertyOption::boolean("liveMode", "Live mode", true),
            PropertyOption::number("speed", "Speed", 0.0, 11.0, 1.0, 11.0),
            PropertyOption::string_menu(
                "tuneContent",
                "Tune content",
                "psnr",
                vec![
                    MenuOption::new("psnr", "PSNR", "psnr"),
                    MenuOption::new("psychovisual", "Psychovisual", "psychovisual"),
                ],
            ),
        ]
    }

    #[test]
    fn test_defaults_resolve() {
        let values = OptionValues::new();
        let opts = options();
        assert_eq!(values.value(&opts, "liveMode"), Some(OptionValue::Boolean(true)));
        assert_eq!(values.value(&opts, "missing"), None);
    }

    #[test]
    fn test_setting_default_removes_entry() {
        let opts = options();
        let mut values = OptionValues::new();

        assert!(values.set(&opts, "speed", OptionValue::Number(4.0)));
        assert!(!values.is_empty());
        assert!(!values.set(&opts, "speed", OptionValue::Number(4.0)));
        assert!(values.set(&opts, "speed", OptionValue::Number(11.0)));
        assert!(values.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_and_menu_misses() {
        let opts = options();
        let mut values = OptionValues::new();

        assert!(!values.set(&opts, "speed", OptionValue::Number(42.0)));
        assert!(!values.set(&opts, "tuneContent", "fast".into()));
        assert!(values.set(&opts, "tuneContent", "psychovisual".into()));
        assert!(values.reset());
        assert!(!values.reset());
    }

    fn store() -> OptionStore {
        OptionStore::new(vec![
            PropertyOption::boolean("lowLatency", "Low latency", true),
            PropertyOption::number_menu(
                "mpegVersion",
                "MPEG version",
                0.0,
                vec![
                    MenuOption::new("mpeg4", "MPEG-4", 0.0),
                    MenuOption::new("mpeg2", "MPEG-2", 1.0),
                ],
            ),
        ])
    }

    #[test]
    fn test_resolved_params_include_defaults() {
        let store = store();
        assert!(store.set("mpegVersion", OptionValue::Number(1.0)));

        let params = store.resolved();
        assert_eq!(params.get("lowLatency"), Some(&OptionValue::Boolean(true)));
        assert_eq!(params.get("mpegVersion"), Some(&OptionValue::Number(1.0)));
    }

    #[test]
    fn test_reset_notifies_changed_options() {
        let store = store();
        let hits = std::sync::Arc::new(Mutex::new(Vec::new()));
        let hits_clone = std::sync::Arc::clone(&hits);
        store
            .changed()
            .connect(move |(name, _)| hits_clone.lock().unwrap().push(name.clone()));

        store.set("lowLatency", OptionValue::Boolean(false));
        store.reset();

        assert_eq!(*hits.lock().unwrap(), vec!["lowLatency", "lowLatency"]);
        assert_eq!(store.value("lowLatency"), Some(OptionValue::Boolean(true)));
    }
}
