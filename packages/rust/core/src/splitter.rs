//! Record splitting: raw input text → ordered structured records.

use distiller_shared::{DistillerError, Record, Result};

/// Split raw text on every literal occurrence of `separator`, trim each
/// piece, discard pieces that are empty after trimming, and structure the
/// survivors into [`Record`]s.
///
/// An empty result is a fatal, pre-pipeline error: the run never enters the
/// discovering state.
pub fn split_records(raw: &str, separator: &str) -> Result<Vec<Record>> {
    if separator.is_empty() {
        return Err(DistillerError::validation("separator must not be empty"));
    }

    let records: Vec<Record> = raw
        .split(separator)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(Record::parse)
        .collect();

    if records.is_empty() {
        return Err(DistillerError::validation(
            "no data to process. Provide some text and a valid separator.",
        ));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEP: &str = "--- TICKET BREAK ---";

    #[test]
    fn splits_and_trims_pieces() {
        let raw = format!("  first ticket  {SEP}\n\nsecond ticket\n");
        let records = split_records(&raw, SEP).expect("split");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "first ticket");
        assert_eq!(records[1].title, "second ticket");
    }

    #[test]
    fn no_separator_occurrence_yields_single_record() {
        let records = split_records("  only one ticket  ", SEP).expect("split");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "only one ticket");
    }

    #[test]
    fn rejoining_reconstructs_trimmed_pieces() {
        let raw = format!("alpha {SEP} beta {SEP} gamma");
        let records = split_records(&raw, SEP).expect("split");
        let rejoined = records
            .iter()
            .map(|r| r.title.clone())
            .collect::<Vec<_>>()
            .join(SEP);
        assert_eq!(rejoined, format!("alpha{SEP}beta{SEP}gamma"));
    }

    #[test]
    fn whitespace_only_pieces_are_discarded() {
        let raw = format!("{SEP}\n   \n{SEP}real ticket{SEP}   {SEP}");
        let records = split_records(&raw, SEP).expect("split");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "real ticket");
    }

    #[test]
    fn empty_input_is_validation_error() {
        let err = split_records("", SEP).unwrap_err();
        assert!(matches!(err, DistillerError::Validation { .. }));
        assert!(err.to_string().contains("no data to process"));

        let err = split_records(&format!("{SEP}{SEP}"), SEP).unwrap_err();
        assert!(matches!(err, DistillerError::Validation { .. }));
    }

    #[test]
    fn empty_separator_is_rejected() {
        let err = split_records("some text", "").unwrap_err();
        assert!(matches!(err, DistillerError::Validation { .. }));
    }

    #[test]
    fn records_are_structured_at_split_time() {
        let raw = format!(
            "Title: Cannot log in\nDescription: The terminal rejects my password.{SEP}Title: Need folder access\nDescription: Grant me access please."
        );
        let records = split_records(&raw, SEP).expect("split");
        assert_eq!(records[0].title, "Cannot log in");
        assert_eq!(records[0].description, "The terminal rejects my password.");
        assert_eq!(records[1].title, "Need folder access");
    }
}
