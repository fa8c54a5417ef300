//! # Command catalog.
//!
//! The catalog describes every appliance register the gateway knows: the
//! request frame that polls it, the response frame that answers, and how the
//! raw 16-bit reading is turned into a published value. It is loaded from a
//! JSON file once at startup, validated, and never mutated afterwards;
//! workers share [`Command`]s through `Arc`.
//!
//! File format (one entry shown):
//! ```json
//! {
//!   "t-dhw": {
//!     "name": { "en": "Hot water temperature" },
//!     "request":  { "can-id": "680", "prefix": "31 00 FA 00 0E" },
//!     "response": { "can-id": "180", "prefix": "32 10 FA 00 0E" },
//!     "divisor": 10,
//!     "unit": "deg",
//!     "kind": "float"
//!   }
//! }
//! ```
//!
//! Byte prefixes are whitespace-separated hex octets, bus ids are hex with
//! an optional `0x` prefix, and the map key becomes the command id.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating the catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("read catalog {path:?}: {error}")]
    Read {
        /// Path as given on the command line.
        path: String,
        /// The underlying error message.
        error: String,
    },

    /// The catalog file is not valid JSON for the expected shape.
    #[error("parse catalog: {error}")]
    Parse {
        /// The underlying error message.
        error: String,
    },

    /// A command record is structurally valid but semantically broken.
    #[error("command {id:?}: {reason}")]
    Invalid {
        /// The offending command id.
        id: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// A bus identifier, parsed from a hex string (`"180"`, `"0x680"`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanId(pub u32);

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

impl fmt::Debug for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'de> Deserialize<'de> for CanId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let digits = text.trim().trim_start_matches("0x");
        u32::from_str_radix(digits, 16)
            .map(CanId)
            .map_err(|err| D::Error::custom(format!("bus id {text:?}: {err}")))
    }
}

/// A frame byte template, parsed from whitespace-separated hex octets
/// (`"31 00 FA 0E"`).
#[derive(Clone, PartialEq, Eq)]
pub struct CommandBytes(Vec<u8>);

impl CommandBytes {
    /// Wraps raw bytes (test and tooling use; files go through serde).
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The template bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Template length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the template is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when `data` begins with this template.
    pub fn matches_prefix(&self, data: &[u8]) -> bool {
        data.len() >= self.0.len() && data[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for CommandBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{self}]")
    }
}

impl<'de> Deserialize<'de> for CommandBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let mut bytes = Vec::new();
        for token in text.split_whitespace() {
            let byte = u8::from_str_radix(token, 16)
                .map_err(|err| D::Error::custom(format!("byte {token:?}: {err}")))?;
            bytes.push(byte);
        }
        Ok(Self(bytes))
    }
}

/// Physical unit attached to a command's value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Unitless.
    #[default]
    None,
    /// Degrees Celsius.
    Deg,
    /// Pressure in bar.
    Bar,
    /// Flow in litres per hour.
    Lh,
    /// Percent.
    Percent,
    /// Energy in watt hours.
    Wh,
    /// Energy in kilowatt hours.
    Kwh,
    /// Power in watts.
    W,
    /// Power in kilowatts.
    Kw,
    /// Seconds.
    Sec,
    /// Minutes.
    Min,
    /// Hours.
    Hour,
}

/// How a raw 16-bit reading is interpreted for publishing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// No interpretation defined; readings are skipped with a warning.
    #[default]
    None,
    /// The reading is a code resolved through the command's label table.
    Coded,
    /// reading ÷ divisor, rounded to the nearest integer.
    Integer,
    /// reading ÷ divisor, rendered with four fractional digits.
    Float,
}

/// One side of a command: the bus id it appears on and its byte prefix.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FrameTemplate {
    /// Bus id the frame carries.
    pub can_id: CanId,
    /// Leading bytes that identify the frame.
    pub prefix: CommandBytes,
}

/// A catalog entry: one appliance register, how to poll it and how to render
/// its readings.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Command {
    /// Catalog key, injected at load time.
    #[serde(skip)]
    pub id: String,
    /// Localized display names, keyed by language code.
    #[serde(default)]
    pub name: BTreeMap<String, String>,
    /// Localized descriptions, keyed by language code.
    #[serde(default)]
    pub description: BTreeMap<String, String>,
    /// Outbound poll template.
    pub request: FrameTemplate,
    /// Inbound response template.
    pub response: FrameTemplate,
    /// Scale divisor for the scaled kinds.
    #[serde(default = "default_divisor")]
    pub divisor: f64,
    /// Physical unit tag.
    #[serde(default)]
    pub unit: Unit,
    /// Value interpretation.
    #[serde(default)]
    pub kind: ValueKind,
    /// Code → label table for [`ValueKind::Coded`].
    #[serde(default, deserialize_with = "deserialize_codes")]
    pub codes: BTreeMap<u16, String>,
    /// Whether the register accepts writes. Reserved; the gateway only
    /// reads.
    #[serde(default)]
    pub writable: bool,
}

fn default_divisor() -> f64 {
    1.0
}

/// JSON object keys are strings; accept decimal code keys and parse them.
fn deserialize_codes<'de, D>(deserializer: D) -> Result<BTreeMap<u16, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    let mut codes = BTreeMap::new();
    for (key, label) in raw {
        let code = key
            .trim()
            .parse::<u16>()
            .map_err(|err| D::Error::custom(format!("code {key:?}: {err}")))?;
        codes.insert(code, label);
    }
    Ok(codes)
}

/// The immutable command catalog.
///
/// Commands iterate in id order, so every scan over the catalog is
/// deterministic.
#[derive(Debug)]
pub struct Catalog {
    by_id: BTreeMap<String, Arc<Command>>,
}

impl Catalog {
    /// Loads and validates a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|err| CatalogError::Read {
            path: path.display().to_string(),
            error: err.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Parses and validates catalog JSON.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, Command> =
            serde_json::from_str(text).map_err(|err| CatalogError::Parse {
                error: err.to_string(),
            })?;

        let mut by_id = BTreeMap::new();
        for (id, mut command) in raw {
            command.id = id.clone();
            validate(&command)?;
            by_id.insert(id, Arc::new(command));
        }
        Ok(Self { by_id })
    }

    /// Looks up a command by id.
    pub fn get(&self, id: &str) -> Option<Arc<Command>> {
        self.by_id.get(id).cloned()
    }

    /// All commands in id order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<Command>> {
        self.by_id.values()
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn validate(command: &Command) -> Result<(), CatalogError> {
    if command.request.prefix.is_empty() {
        return Err(invalid(command, "empty request prefix"));
    }
    if command.response.prefix.is_empty() {
        return Err(invalid(command, "empty response prefix"));
    }
    if matches!(command.kind, ValueKind::Integer | ValueKind::Float) && command.divisor == 0.0 {
        return Err(invalid(command, "zero divisor on a scaled kind"));
    }
    Ok(())
}

fn invalid(command: &Command, reason: &str) -> CatalogError {
    CatalogError::Invalid {
        id: command.id.clone(),
        reason: reason.to_string(),
    }
}
