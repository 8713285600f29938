use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_FILENAME: &str = "document.pdf";

#[derive(Error, Debug, PartialEq)]
pub enum OptionsError {
    #[error("Missing \"html\" parameter")]
    MissingHtml,

    #[error("Unknown page size: {0}")]
    UnknownPageSize(String),

    #[error("Invalid length for {field}: {value}")]
    InvalidLength { field: &'static str, value: String },

    #[error("Scale must be between 0.1 and 2.0, got {0}")]
    ScaleOutOfRange(f64),
}

/// A CSS length as accepted by the print parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Px,
    In,
    Cm,
    Mm,
}

impl Unit {
    fn pixels(self) -> f64 {
        match self {
            Unit::Px => 1.0,
            Unit::In => 96.0,
            Unit::Cm => 37.8,
            Unit::Mm => 3.78,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Unit::Px => "px",
            Unit::In => "in",
            Unit::Cm => "cm",
            Unit::Mm => "mm",
        }
    }
}

impl Length {
    pub const ZERO: Length = Length {
        value: 0.0,
        unit: Unit::Px,
    };

    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Parses `"8mm"`, `"1.5in"`, `"12"` (pixels) and friends.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let lower = text.to_ascii_lowercase();
        let (number, unit) = [Unit::Px, Unit::In, Unit::Cm, Unit::Mm]
            .into_iter()
            .find_map(|unit| lower.strip_suffix(unit.suffix()).map(|rest| (rest, unit)))
            .unwrap_or((lower.as_str(), Unit::Px));

        let value: f64 = number.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Self { value, unit })
    }

    pub fn inches(&self) -> f64 {
        self.value * self.unit.pixels() / 96.0
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// A length as it arrives on the wire: a bare number of pixels or a string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawLength {
    Pixels(f64),
    Text(String),
}

impl RawLength {
    fn resolve(&self, field: &'static str) -> Result<Length, OptionsError> {
        let parsed = match self {
            RawLength::Pixels(px) if px.is_finite() && *px >= 0.0 => {
                Some(Length::new(*px, Unit::Px))
            }
            RawLength::Pixels(_) => None,
            RawLength::Text(text) => Length::parse(text),
        };

        parsed.ok_or_else(|| OptionsError::InvalidLength {
            field,
            value: self.to_string(),
        })
    }
}

impl fmt::Display for RawLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawLength::Pixels(px) => write!(f, "{}", px),
            RawLength::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Length,
    pub right: Length,
    pub bottom: Length,
    pub left: Length,
}

impl Margins {
    pub fn uniform(length: Length) -> Self {
        Self {
            top: length,
            right: length,
            bottom: length,
            left: length,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MarginsPayload {
    top: Option<RawLength>,
    right: Option<RawLength>,
    bottom: Option<RawLength>,
    left: Option<RawLength>,
}

impl MarginsPayload {
    fn resolve(&self) -> Result<Margins, OptionsError> {
        let side = |raw: &Option<RawLength>, field| match raw {
            Some(raw) => raw.resolve(field),
            None => Ok(Length::ZERO),
        };

        Ok(Margins {
            top: side(&self.top, "margins.top")?,
            right: side(&self.right, "margins.right")?,
            bottom: side(&self.bottom, "margins.bottom")?,
            left: side(&self.left, "margins.left")?,
        })
    }
}

/// Resolves the margins payload, keeping `default` whenever it is absent or
/// not a well-formed margins object.
///
/// The payload may be a JSON object or a string holding JSON. Sides missing
/// from a well-formed object are zero. Only an unparseable payload falls
/// back; a well-formed object with an invalid length is still an error.
pub fn parse_margins_or_default(
    raw: Option<&Value>,
    default: Margins,
) -> Result<Margins, OptionsError> {
    let parsed;
    let value = match raw {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed margins, using defaults");
                return Ok(default);
            }
        },
        Some(value) => value,
    };

    // Only a `{top,right,bottom,left}` object counts; serde would also
    // accept a positional array.
    if !value.is_object() {
        tracing::warn!("ignoring margins that are not an object, using defaults");
        return Ok(default);
    }

    match MarginsPayload::deserialize(value) {
        Ok(payload) => payload.resolve(),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring malformed margins, using defaults");
            Ok(default)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
}

impl PaperFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        let format = match name.trim().to_ascii_lowercase().as_str() {
            "letter" => PaperFormat::Letter,
            "legal" => PaperFormat::Legal,
            "tabloid" => PaperFormat::Tabloid,
            "ledger" => PaperFormat::Ledger,
            "a0" => PaperFormat::A0,
            "a1" => PaperFormat::A1,
            "a2" => PaperFormat::A2,
            "a3" => PaperFormat::A3,
            "a4" => PaperFormat::A4,
            "a5" => PaperFormat::A5,
            "a6" => PaperFormat::A6,
            _ => return None,
        };
        Some(format)
    }

    /// Portrait width and height in inches.
    pub fn inches(self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::A6 => (4.13, 5.83),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageLayout {
    Format(PaperFormat),
    Custom { width: Length, height: Length },
}

impl PageLayout {
    pub fn inches(&self) -> (f64, f64) {
        match self {
            PageLayout::Format(format) => format.inches(),
            PageLayout::Custom { width, height } => (width.inches(), height.inches()),
        }
    }
}

/// Everything the browser needs to print one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub landscape: bool,
    pub layout: PageLayout,
    pub margins: Margins,
    pub scale: f64,
    pub prefer_css_page_size: bool,
    pub print_background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub html: String,
    pub filename: String,
    pub disposition: Disposition,
    pub print: PrintOptions,
}

/// Server-side defaults applied to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDefaults {
    pub margin: Length,
    pub scale: f64,
    pub prefer_css_page_size: bool,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            margin: Length::new(8.0, Unit::Mm),
            scale: 0.9,
            prefer_css_page_size: false,
        }
    }
}

/// Page dimensions must be positive; margins may be zero.
fn page_dimension(raw: &RawLength, field: &'static str) -> Result<Length, OptionsError> {
    let length = raw.resolve(field)?;
    if length.value == 0.0 {
        return Err(OptionsError::InvalidLength {
            field,
            value: raw.to_string(),
        });
    }
    Ok(length)
}

/// A PDF request, as posted in a JSON body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderRequest {
    pub html: Option<String>,
    pub filename: Option<String>,
    pub landscape: Option<bool>,
    pub page_size: Option<String>,
    pub width: Option<RawLength>,
    pub height: Option<RawLength>,
    pub margins: Option<Value>,
    pub scale: Option<f64>,
    pub prefer_css_page_size: Option<bool>,
    pub download: Option<bool>,
}

impl RenderRequest {
    pub fn normalize(self, defaults: &RenderDefaults) -> Result<RenderJob, OptionsError> {
        let html = self
            .html
            .filter(|html| !html.is_empty())
            .ok_or(OptionsError::MissingHtml)?;

        let filename = self
            .filename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

        let layout = match (&self.width, &self.height) {
            (Some(width), Some(height)) => PageLayout::Custom {
                width: page_dimension(width, "width")?,
                height: page_dimension(height, "height")?,
            },
            _ => match self.page_size.as_deref().filter(|s| !s.trim().is_empty()) {
                Some(name) => PageLayout::Format(
                    PaperFormat::from_name(name)
                        .ok_or_else(|| OptionsError::UnknownPageSize(name.to_string()))?,
                ),
                None => PageLayout::Format(PaperFormat::A4),
            },
        };

        let margins =
            parse_margins_or_default(self.margins.as_ref(), Margins::uniform(defaults.margin))?;

        let scale = self.scale.unwrap_or(defaults.scale);
        if !(0.1..=2.0).contains(&scale) {
            return Err(OptionsError::ScaleOutOfRange(scale));
        }

        let disposition = if self.download.unwrap_or(false) {
            Disposition::Attachment
        } else {
            Disposition::Inline
        };

        Ok(RenderJob {
            html,
            filename,
            disposition,
            print: PrintOptions {
                landscape: self.landscape.unwrap_or(true),
                layout,
                margins,
                scale,
                prefer_css_page_size: self
                    .prefer_css_page_size
                    .unwrap_or(defaults.prefer_css_page_size),
                print_background: true,
            },
        })
    }
}

/// The same request as a query string, where every value is text.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderQuery {
    pub html: Option<String>,
    pub filename: Option<String>,
    pub landscape: Option<String>,
    pub page_size: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub margins: Option<String>,
    pub scale: Option<String>,
    pub prefer_css_page_size: Option<String>,
    pub download: Option<String>,
}

fn query_flag(value: Option<String>) -> Option<bool> {
    value.filter(|v| !v.is_empty()).map(|v| v == "true")
}

impl From<RenderQuery> for RenderRequest {
    fn from(query: RenderQuery) -> Self {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        Self {
            html: query.html,
            filename: query.filename,
            landscape: query_flag(query.landscape),
            page_size: non_empty(query.page_size),
            width: non_empty(query.width).map(RawLength::Text),
            height: non_empty(query.height).map(RawLength::Text),
            margins: non_empty(query.margins).map(Value::String),
            // An unreadable scale keeps the default, like malformed margins.
            scale: non_empty(query.scale).and_then(|s| s.trim().parse().ok()),
            prefer_css_page_size: query_flag(query.prefer_css_page_size),
            download: query_flag(query.download),
        }
    }
}
