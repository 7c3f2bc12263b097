use sha2::{Digest, Sha256};

/// The exact string a schema signature is hashed from, kept separate from
/// `compute_schema_signature` so callers can assert on it directly in tests
/// without re-deriving the hash.
pub fn build_signature_input(file_type: &str, sheet_name: Option<&str>, column_names: &[String]) -> String {
    let normalized_file_type = file_type.to_uppercase();
    let normalized_sheet_name = sheet_name.unwrap_or("");
    format!(
        "{normalized_file_type}|{normalized_sheet_name}|colcount={}|cols={}",
        column_names.len(),
        column_names.join(",")
    )
}

/// SHA-256 hex digest of `build_signature_input`; two imports with the same
/// (file type, sheet, column names) produce the same signature regardless
/// of row content.
pub fn compute_schema_signature(file_type: &str, sheet_name: Option<&str>, column_names: &[String]) -> String {
    let input = build_signature_input(file_type, sheet_name, column_names);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_order_sensitive() {
        let columns = vec!["EN".to_string(), "DE".to_string(), "Key".to_string()];
        let first = compute_schema_signature("xlsx", Some("Sheet1"), &columns);
        let second = compute_schema_signature("xlsx", Some("Sheet1"), &columns);
        assert_eq!(first, second);

        let reordered = vec!["DE".to_string(), "EN".to_string(), "Key".to_string()];
        let third = compute_schema_signature("xlsx", Some("Sheet1"), &reordered);
        assert_ne!(first, third);
    }

    #[test]
    fn signature_input_matches_literal_format() {
        let columns = vec!["EN".to_string(), "DE".to_string()];
        assert_eq!(
            build_signature_input("csv", None, &columns),
            "CSV||colcount=2|cols=EN,DE"
        );
    }
}
