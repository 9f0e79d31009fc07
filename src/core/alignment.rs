// alignment.rs - Pairwise alignment configuration and identity scoring

use parasail_rs::{Aligner, Matrix};
use serde::{Deserialize, Serialize};

/// Configuration for pairwise global alignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Residue alphabet; the last symbol stands in for anything unknown
    pub alphabet: String,
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub description: Option<String>,
}

const PROTEIN_ALPHABET: &str = "ARNDCQEGHILKMFPSTWYVBZX";
const DNA_ALPHABET: &str = "ACGTN";

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            alphabet: PROTEIN_ALPHABET.to_string(),
            match_score: 5,
            mismatch_penalty: -2,
            gap_open: 10,
            gap_extend: 1,
            description: Some("Default protein alignment parameters".to_string()),
        }
    }
}

impl AlignmentConfig {
    /// Create configuration from mode string
    pub fn from_mode(mode: &str) -> Result<Self, String> {
        match mode {
            "protein" => Ok(Self::default()),
            "protein-strict" => Ok(Self {
                alphabet: PROTEIN_ALPHABET.to_string(),
                match_score: 5,
                mismatch_penalty: -4,
                gap_open: 14,
                gap_extend: 2,
                description: Some("Strict protein alignment (higher penalties)".to_string()),
            }),
            "dna" => Ok(Self {
                alphabet: DNA_ALPHABET.to_string(),
                match_score: 2,
                mismatch_penalty: -1,
                gap_open: 5,
                gap_extend: 2,
                description: Some("Standard DNA alignment".to_string()),
            }),
            _ => Err(format!(
                "Unknown alignment mode: {}. Use: protein, protein-strict, dna",
                mode
            )),
        }
    }

    /// Create custom configuration
    pub fn custom(match_score: i32, mismatch_penalty: i32, gap_open: i32, gap_extend: i32) -> Self {
        Self {
            match_score,
            mismatch_penalty,
            gap_open,
            gap_extend,
            description: Some("Custom alignment parameters".to_string()),
            ..Self::default()
        }
    }

    /// Upper-case residues and map symbols outside the alphabet to its wildcard
    pub fn sanitize(&self, residues: &[u8]) -> Vec<u8> {
        let alphabet = self.alphabet.as_bytes();
        let wildcard = alphabet.last().copied().unwrap_or(b'X');
        residues
            .iter()
            .filter(|&&b| b != b'-' && b != b'.')
            .map(|b| b.to_ascii_uppercase())
            .map(|b| if alphabet.contains(&b) { b } else { wildcard })
            .collect()
    }
}

/// Fraction of alignment columns where both rows carry the same residue
pub fn identity_from_traceback(query: &str, reference: &str) -> f64 {
    let columns = query.len().min(reference.len());
    if columns == 0 {
        return 0.0;
    }
    let matches = query
        .bytes()
        .zip(reference.bytes())
        .filter(|(q, r)| q == r && *q != b'-')
        .count();
    matches as f64 / columns as f64
}

/// Global alignment identity between two residue strings
pub fn global_identity(config: &AlignmentConfig, a: &[u8], b: &[u8]) -> Result<f64, String> {
    let query = config.sanitize(a);
    let reference = config.sanitize(b);
    if query.is_empty() || reference.is_empty() {
        return Ok(0.0);
    }
    if query == reference {
        return Ok(1.0);
    }

    let matrix = Matrix::create(
        config.alphabet.as_bytes(),
        config.match_score,
        config.mismatch_penalty,
    )
    .map_err(|e| format!("Failed to create scoring matrix: {:?}", e))?;

    let aligner = Aligner::new()
        .matrix(matrix)
        .gap_open(config.gap_open)
        .gap_extend(config.gap_extend)
        .global()
        .use_trace()
        .build();

    let result = aligner
        .align(Some(&query), &reference)
        .map_err(|e| format!("Alignment failed: {:?}", e))?;
    let traceback = result
        .get_traceback_strings(&query, &reference)
        .map_err(|e| format!("Traceback failed: {:?}", e))?;

    Ok(identity_from_traceback(&traceback.query, &traceback.reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_traceback() {
        assert_eq!(identity_from_traceback("ACGT", "ACGT"), 1.0);
        assert_eq!(identity_from_traceback("AC-T", "ACGT"), 0.75);
        assert_eq!(identity_from_traceback("", ""), 0.0);
    }

    #[test]
    fn test_sanitize_maps_unknown_symbols() {
        let config = AlignmentConfig::default();
        assert_eq!(config.sanitize(b"mk-v.O"), b"MKVX".to_vec());
        let dna = AlignmentConfig::from_mode("dna").unwrap();
        assert_eq!(dna.sanitize(b"acgu"), b"ACGN".to_vec());
    }

    #[test]
    fn test_modes() {
        assert!(AlignmentConfig::from_mode("protein-strict").is_ok());
        assert!(AlignmentConfig::from_mode("rna").is_err());
        assert_eq!(AlignmentConfig::custom(1, -1, 2, 1).alphabet, PROTEIN_ALPHABET);
    }

    #[test]
    fn test_identical_sequences_short_circuit() {
        let config = AlignmentConfig::default();
        assert_eq!(global_identity(&config, b"MKV", b"mkv").unwrap(), 1.0);
        assert_eq!(global_identity(&config, b"", b"MKV").unwrap(), 0.0);
    }
}
