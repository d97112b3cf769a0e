//! Instrument list parsing.

use std::collections::HashSet;

use crate::domain::error::SigtraderError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

/// Split a comma-separated symbol list, upper-casing each entry.
///
/// An empty or blank list yields an empty vector; callers decide whether
/// that is fatal.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// Parse a configured list and require at least one instrument.
pub fn require_symbols(input: Option<&str>, section: &str) -> Result<Vec<String>, SigtraderError> {
    let symbols = parse_symbols(input.unwrap_or("")).map_err(|e| SigtraderError::ConfigInvalid {
        section: section.to_string(),
        key: "symbols".to_string(),
        reason: e.to_string(),
    })?;
    if symbols.is_empty() {
        return Err(SigtraderError::NoInstruments);
    }
    Ok(symbols)
}
