use std::path::Path;

use super::error::PredictError;

/// Name plus the two element lines of one satellite.
#[derive(Debug, Clone, PartialEq)]
pub struct TleSet {
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

impl TleSet {
    pub fn elements(&self) -> Result<sgp4::Elements, PredictError> {
        Ok(sgp4::Elements::from_tle(
            self.name.clone(),
            self.line1.as_bytes(),
            self.line2.as_bytes(),
        )?)
    }

    /// Back to 2- or 3-line text.
    pub fn text(&self) -> String {
        match &self.name {
            Some(name) => format!("{}\n{}\n{}", name, self.line1, self.line2),
            None => format!("{}\n{}", self.line1, self.line2),
        }
    }
}

/// Parse a single satellite in 2- or 3-line form.
pub fn parse_tle_lines(tle: &str) -> Result<TleSet, PredictError> {
    let lines: Vec<&str> = tle.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();

    match lines.len() {
        2 => Ok(TleSet {
            name: None,
            line1: lines[0].to_string(),
            line2: lines[1].to_string(),
        }),
        3 => Ok(TleSet {
            name: Some(lines[0].to_string()),
            line1: lines[1].to_string(),
            line2: lines[2].to_string(),
        }),
        _ => Err(PredictError::InvalidTleFormat),
    }
}

/// Parse multi-satellite TLE content, skipping lines that do not form a set.
pub fn parse_multi_tle(content: &str) -> Vec<TleSet> {
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let mut result = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].starts_with("1 ") && i + 1 < lines.len() && lines[i + 1].starts_with("2 ") {
            result.push(TleSet {
                name: None,
                line1: lines[i].to_string(),
                line2: lines[i + 1].to_string(),
            });
            i += 2;
        } else if i + 2 < lines.len()
            && lines[i + 1].starts_with("1 ")
            && lines[i + 2].starts_with("2 ")
        {
            result.push(TleSet {
                name: Some(lines[i].to_string()),
                line1: lines[i + 1].to_string(),
                line2: lines[i + 2].to_string(),
            });
            i += 3;
        } else {
            i += 1;
        }
    }

    result
}

pub fn load_tle_file(path: &Path) -> Result<Vec<TleSet>, PredictError> {
    let content = std::fs::read_to_string(path)?;
    let sets = parse_multi_tle(&content);
    if sets.is_empty() {
        log::warn!("No TLE sets found in {}", path.display());
    }
    Ok(sets)
}
