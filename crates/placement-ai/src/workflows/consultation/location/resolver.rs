use std::io::Read;
use std::path::Path;

use serde::Deserialize;

/// Error enumeration for locality-table loading.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("failed to read locality table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid locality table: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct LocalityRow {
    #[serde(rename = "Phrase")]
    phrase: String,
    #[serde(rename = "ZIP")]
    zip: String,
}

/// Maps free-text locality phrases onto canonical postal codes using a
/// curated table. The table is data, not code: it ships as a small CSV
/// so new areas can be added without redeploying.
#[derive(Debug, Default, Clone)]
pub struct LocationResolver {
    /// Normalized phrase -> ZIP, sorted by descending phrase length so
    /// the longest match wins.
    entries: Vec<(String, String)>,
}

impl LocationResolver {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ResolverError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ResolverError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for row in csv_reader.deserialize::<LocalityRow>() {
            let row = row?;
            entries.push((row.phrase, row.zip));
        }

        Ok(Self::from_entries(entries))
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(phrase, zip)| (normalize(&phrase.into()), zip.into()))
            .filter(|(phrase, zip)| !phrase.is_empty() && is_zip(zip))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a locality phrase to a canonical five-digit ZIP.
    /// A pure ZIP token passes through unchanged; no match yields `None`.
    pub fn resolve(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            return None;
        }
        if is_zip(trimmed) {
            return Some(trimmed.to_string());
        }

        let normalized = normalize(trimmed);
        self.entries
            .iter()
            .find(|(phrase, _)| normalized.contains(phrase.as_str()))
            .map(|(_, zip)| zip.clone())
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_zip(value: &str) -> bool {
    value.len() == 5 && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn resolver() -> LocationResolver {
        LocationResolver::from_entries([
            ("west side of rochester", "14611"),
            ("west rochester", "14611"),
            ("rochester", "14604"),
            ("east rochester", "14445"),
            ("pittsford", "14534"),
        ])
    }

    #[test]
    fn zip_tokens_pass_through() {
        assert_eq!(resolver().resolve("14534").as_deref(), Some("14534"));
        assert_eq!(resolver().resolve(" 14611 ").as_deref(), Some("14611"));
    }

    #[test]
    fn longest_phrase_wins() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve("the West  Side of Rochester please").as_deref(),
            Some("14611")
        );
        assert_eq!(resolver.resolve("East Rochester").as_deref(), Some("14445"));
        assert_eq!(
            resolver.resolve("anywhere in rochester").as_deref(),
            Some("14604")
        );
    }

    #[test]
    fn unknown_phrases_yield_none() {
        assert_eq!(resolver().resolve("Buffalo"), None);
        assert_eq!(resolver().resolve(""), None);
        assert_eq!(resolver().resolve("null"), None);
    }

    #[test]
    fn loads_from_csv_table() {
        let csv = "Phrase,ZIP\nPittsford,14534\nBrighton,14618\nbad row,abc\n";
        let resolver = LocationResolver::from_reader(Cursor::new(csv)).expect("load");
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.resolve("near Brighton").as_deref(), Some("14618"));
    }
}
