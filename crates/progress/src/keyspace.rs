//! Chunk id keyspace arithmetic.
//!
//! Chunk ids are 32 lowercase hex characters (128 bits) and are processed in
//! ascending order, so a worker's position in its slice of the keyspace is
//! its progress.

use recluster_core::PROGRESS_SCALE;

use crate::error::ProgressError;

/// Hex digits in a chunk id.
pub const CHUNK_ID_LENGTH: usize = 32;

/// Chunk id of the end of the table.
pub const END_OF_TABLE: &str = "ffffffffffffffffffffffffffffffff";

pub(crate) fn chunk_id(value: u128) -> String {
    format!("{value:032x}")
}

/// Top 64 bits of a chunk id. `""` is the start of the table; shorter ids
/// are right-padded with zeros.
fn leading_bits(id: &str) -> Result<u64, ProgressError> {
    if id.len() > CHUNK_ID_LENGTH || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProgressError::Validation(format!(
            "chunk id {id:?} must be at most {CHUNK_ID_LENGTH} hex characters"
        )));
    }
    let mut padded = id.to_ascii_lowercase();
    padded.extend(std::iter::repeat('0').take(CHUNK_ID_LENGTH - id.len()));
    u64::from_str_radix(&padded[..16], 16)
        .map_err(|e| ProgressError::Validation(format!("chunk id {id:?}: {e}")))
}

/// Per-mille progress of a worker covering `(start_chunk_id, end_chunk_id]`
/// that has reached `current_chunk_id`.
///
/// Capped at 999: a worker only reports 1000 once its slice is done, not
/// merely because it reached the last chunk. Positions before the start
/// count as 0.
pub fn progress_per_mille(
    start_chunk_id: &str,
    end_chunk_id: &str,
    current_chunk_id: &str,
) -> Result<i64, ProgressError> {
    let start = leading_bits(start_chunk_id)?;
    let end = leading_bits(end_chunk_id)?;
    let current = leading_bits(current_chunk_id)?;
    if end <= start {
        return Err(ProgressError::Validation(format!(
            "end chunk id {end_chunk_id:?} must be after start chunk id {start_chunk_id:?}"
        )));
    }
    let done = u128::from(current.saturating_sub(start));
    let range = u128::from(end - start);
    let per_mille = done * PROGRESS_SCALE as u128 / range;
    Ok((per_mille as i64).min(PROGRESS_SCALE - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_table() {
        let start = "";
        assert_eq!(progress_per_mille(start, END_OF_TABLE, &"00".repeat(16)).unwrap(), 0);
        assert_eq!(
            progress_per_mille(start, END_OF_TABLE, &("80".to_string() + &"00".repeat(15))).unwrap(),
            500
        );
        assert_eq!(progress_per_mille(start, END_OF_TABLE, END_OF_TABLE).unwrap(), 999);
    }

    #[test]
    fn partial_table() {
        let start = "55".repeat(15) + "54";
        let end = "aa".repeat(15) + "a9";
        assert_eq!(progress_per_mille(&start, &end, &"55".repeat(16)).unwrap(), 0);
        assert_eq!(progress_per_mille(&start, &end, &"77".repeat(16)).unwrap(), 400);
        assert_eq!(progress_per_mille(&start, &end, &end).unwrap(), 999);
    }

    #[test]
    fn before_start_is_zero() {
        let start = "80".to_string() + &"00".repeat(15);
        assert_eq!(progress_per_mille(&start, END_OF_TABLE, "10").unwrap(), 0);
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(matches!(
            progress_per_mille("", END_OF_TABLE, "not-hex"),
            Err(ProgressError::Validation(_))
        ));
        assert!(matches!(
            progress_per_mille("", &"f".repeat(33), "00"),
            Err(ProgressError::Validation(_))
        ));
        assert!(matches!(
            progress_per_mille(END_OF_TABLE, "", "00"),
            Err(ProgressError::Validation(_))
        ));
    }

    #[test]
    fn formats_ids_as_fixed_width_hex() {
        assert_eq!(chunk_id(0), "0".repeat(32));
        assert_eq!(chunk_id(u128::MAX), END_OF_TABLE);
    }
}
