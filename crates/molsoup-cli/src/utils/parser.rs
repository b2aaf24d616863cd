use molsoup::engine::snapshot::RegionOfInterest;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid --set format: '{0}'. Expected SECTION.KEY=VALUE.")]
    InvalidAssignment(String),

    #[error("Component '{component}' cannot be empty in '{input}'.")]
    EmptyComponent {
        component: &'static str,
        input: String,
    },

    #[error("Invalid region '{0}'. Expected four comma-separated numbers 'X0,Y0,X1,Y1'.")]
    InvalidRegion(String),
}

/// A `--set` override split into its table path and a TOML value.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub section: String,
    pub key: String,
    pub value: toml::Value,
}

/// Parses `section.key=value`. The value is read as a TOML literal when possible
/// (`0.5`, `true`, `"text"`) and falls back to a bare string otherwise.
pub fn parse_assignment(input: &str) -> Result<Assignment, ParseError> {
    let (path, raw_value) = input
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidAssignment(input.to_string()))?;
    let (section, key) = path
        .trim()
        .split_once('.')
        .ok_or_else(|| ParseError::InvalidAssignment(input.to_string()))?;

    if section.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "section",
            input: input.to_string(),
        });
    }
    if key.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "key",
            input: input.to_string(),
        });
    }

    let raw_value = raw_value.trim();
    let value = toml::from_str::<toml::Table>(&format!("value = {raw_value}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw_value.to_string()));

    Ok(Assignment {
        section: section.to_string(),
        key: key.to_string(),
        value,
    })
}

pub fn parse_region(input: &str) -> Result<RegionOfInterest, ParseError> {
    let values: Vec<f32> = input
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|_| ParseError::InvalidRegion(input.to_string()))?;
    match values.as_slice() {
        &[x0, y0, x1, y1] => Ok(RegionOfInterest::new(x0, y0, x1, y1)),
        _ => Err(ParseError::InvalidRegion(input.to_string())),
    }
}
