//! Credential reassembly for chunked attribute writes.
//!
//! A browser can only write ~180 bytes per GATT write, while a JWT is easily
//! several hundred. The sender splits the token into writes of exactly
//! [`CHUNK_CEILING`] bytes followed by one shorter final write, so the
//! receiver treats the first write shorter than the ceiling as the end of the
//! credential. There is no explicit terminator: a credential whose length is
//! an exact multiple of the ceiling is only completed by a later short write.
//!
//! # Example
//!
//! ```
//! use aquanode_esp32::ble::{TokenAssembler, CHUNK_CEILING};
//!
//! let mut assembler = TokenAssembler::new();
//! let first = vec![b'a'; CHUNK_CEILING];
//! assert_eq!(assembler.on_fragment(&first, 0), None);
//!
//! let token = assembler.on_fragment(b".bbb.ccc", 40).unwrap();
//! assert_eq!(token.len(), CHUNK_CEILING + 8);
//! assert_eq!(assembler.pending_len(), 0);
//! ```

use zeroize::Zeroize;

/// Size of every non-final fragment written by the sender.
pub const CHUNK_CEILING: usize = 180;

/// Gap after which a partial buffer is considered abandoned.
pub const IDLE_RESET_MS: u64 = 1500;

/// Minimum length of a plausible JWT.
const MIN_CREDENTIAL_LEN: usize = 16;

/// Keep only the Base64URL alphabet and `.`; everything else is dropped.
pub fn sanitize_credential(raw: &[u8]) -> String {
    raw.iter()
        .filter(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        .map(|&b| b as char)
        .collect()
}

/// Check that a credential looks like a JWT (three dot-separated parts).
///
/// This only decides whether a connection attempt is expected to succeed;
/// malformed credentials are still stored and presented to the backend.
pub fn is_well_formed_credential(credential: &str) -> bool {
    credential.len() >= MIN_CREDENTIAL_LEN
        && !credential.eq_ignore_ascii_case("none")
        && credential.bytes().filter(|&b| b == b'.').count() == 2
}

/// Short log-safe description of a credential.
pub fn credential_brief(credential: &str) -> String {
    let head: String = credential.chars().take(6).collect();
    let tail: String = if credential.len() > 6 {
        let skip = credential.chars().count().saturating_sub(6);
        credential.chars().skip(skip).collect()
    } else {
        String::new()
    };
    format!("len={} head={}... tail=...{}", credential.len(), head, tail)
}

/// Reassembles a credential from an ordered sequence of fragments.
#[derive(Debug, Default)]
pub struct TokenAssembler {
    /// Bytes accumulated since the last completed credential.
    buffer: Vec<u8>,
    /// Arrival time of the previous fragment.
    last_fragment_ms: Option<u64>,
}

impl TokenAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment received at `now_ms`.
    ///
    /// Returns the sanitized credential once a final (short) fragment arrives.
    pub fn on_fragment(&mut self, fragment: &[u8], now_ms: u64) -> Option<String> {
        if let Some(last) = self.last_fragment_ms {
            if now_ms.saturating_sub(last) > IDLE_RESET_MS && !self.buffer.is_empty() {
                log::debug!(
                    "Discarding {} stale credential bytes after {} ms idle",
                    self.buffer.len(),
                    now_ms.saturating_sub(last)
                );
                self.clear();
            }
        }

        self.buffer.extend_from_slice(fragment);
        self.last_fragment_ms = Some(now_ms);

        if fragment.len() < CHUNK_CEILING {
            let credential = sanitize_credential(&self.buffer);
            self.clear();
            Some(credential)
        } else {
            log::debug!(
                "Credential chunk ({} bytes), buffer={}",
                fragment.len(),
                self.buffer.len()
            );
            None
        }
    }

    /// Bytes currently buffered.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial credential.
    pub fn clear(&mut self) {
        self.buffer.zeroize();
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(fill: u8) -> Vec<u8> {
        vec![fill; CHUNK_CEILING]
    }

    // ==================== Sanitizer Tests ====================

    #[test]
    fn test_sanitize_keeps_base64url_and_dots() {
        assert_eq!(sanitize_credential(b"aZ09-_.x"), "aZ09-_.x");
    }

    #[test]
    fn test_sanitize_drops_everything_else() {
        assert_eq!(
            sanitize_credential(b" \"abc.def\"\r\n+/=ghi "),
            "abc.defghi"
        );
        assert_eq!(sanitize_credential("t\u{f6}ken".as_bytes()), "tken");
        assert_eq!(sanitize_credential(b""), "");
    }

    // ==================== Well-formedness Tests ====================

    #[test]
    fn test_well_formed() {
        assert!(is_well_formed_credential("eyJhbGciOi.eyJzdWIi.sig"));
        assert!(is_well_formed_credential("aaaaaaa.bbbbbbb."));
    }

    #[test]
    fn test_not_well_formed() {
        assert!(!is_well_formed_credential(""));
        assert!(!is_well_formed_credential("None"));
        assert!(!is_well_formed_credential("a.b.c"));
        assert!(!is_well_formed_credential("aaaaaaaaaaaaaaaaaaaaaaa.b"));
        assert!(!is_well_formed_credential("aaaaaa.bbbbbbbb.cccccc.dd"));
    }

    #[test]
    fn test_none_is_rejected_in_any_case() {
        assert!(!is_well_formed_credential("NONE"));
        assert!(!is_well_formed_credential("nOnE"));
    }

    #[test]
    fn test_brief_does_not_leak_middle() {
        let brief = credential_brief("abcdef.SECRET.uvwxyz");
        assert_eq!(brief, "len=20 head=abcdef... tail=...uvwxyz");
        assert_eq!(credential_brief("abc"), "len=3 head=abc... tail=...");
    }

    // ==================== Assembly Tests ====================

    #[test]
    fn test_short_single_write_is_final() {
        let mut assembler = TokenAssembler::new();
        let token = assembler.on_fragment(b"aaa.bbb.ccc", 10);
        assert_eq!(token.as_deref(), Some("aaa.bbb.ccc"));
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_multi_fragment_assembly() {
        let mut assembler = TokenAssembler::new();
        assert_eq!(assembler.on_fragment(&chunk(b'a'), 0), None);
        assert_eq!(assembler.on_fragment(&chunk(b'b'), 100), None);
        assert_eq!(assembler.pending_len(), 2 * CHUNK_CEILING);

        let token = assembler.on_fragment(b".tail", 200).unwrap();

        let mut expected = String::new();
        expected.push_str(&"a".repeat(CHUNK_CEILING));
        expected.push_str(&"b".repeat(CHUNK_CEILING));
        expected.push_str(".tail");
        assert_eq!(token, expected);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_assembly_sanitizes_concatenation() {
        let mut assembler = TokenAssembler::new();
        let mut first = chunk(b'x');
        first[0] = b' ';
        first[CHUNK_CEILING - 1] = b'\n';
        assert_eq!(assembler.on_fragment(&first, 0), None);

        let token = assembler.on_fragment(b"\"y\"", 5).unwrap();
        assert_eq!(token.len(), CHUNK_CEILING - 2 + 1);
        assert!(token.ends_with("xy"));
    }

    #[test]
    fn test_oversized_fragment_is_not_final() {
        let mut assembler = TokenAssembler::new();
        let big = vec![b'q'; CHUNK_CEILING + 20];
        assert_eq!(assembler.on_fragment(&big, 0), None);
        assert_eq!(assembler.pending_len(), CHUNK_CEILING + 20);
    }

    #[test]
    fn test_empty_write_completes_pending_buffer() {
        let mut assembler = TokenAssembler::new();
        assembler.on_fragment(&chunk(b'a'), 0);
        let token = assembler.on_fragment(b"", 10).unwrap();
        assert_eq!(token.len(), CHUNK_CEILING);
    }

    #[test]
    fn test_idle_gap_discards_partial_buffer() {
        let mut assembler = TokenAssembler::new();
        assert_eq!(assembler.on_fragment(&chunk(b'a'), 1_000), None);

        // 1501 ms later: the 'a' chunk is abandoned
        assert_eq!(assembler.on_fragment(&chunk(b'b'), 2_501), None);
        let token = assembler.on_fragment(b"end", 2_600).unwrap();

        assert!(!token.contains('a'));
        assert_eq!(token.len(), CHUNK_CEILING + 3);
    }

    #[test]
    fn test_gap_at_threshold_keeps_buffer() {
        let mut assembler = TokenAssembler::new();
        assembler.on_fragment(&chunk(b'a'), 1_000);
        let token = assembler.on_fragment(b"z", 2_500).unwrap();
        assert_eq!(token.len(), CHUNK_CEILING + 1);
    }

    #[test]
    fn test_back_to_back_credentials() {
        let mut assembler = TokenAssembler::new();
        assert_eq!(
            assembler.on_fragment(b"one.two.three", 0).as_deref(),
            Some("one.two.three")
        );
        assert_eq!(
            assembler.on_fragment(b"four.five.six", 10).as_deref(),
            Some("four.five.six")
        );
    }

    #[test]
    fn test_clear_drops_partial() {
        let mut assembler = TokenAssembler::new();
        assembler.on_fragment(&chunk(b'a'), 0);
        assembler.clear();
        assert_eq!(assembler.pending_len(), 0);
        assert_eq!(assembler.on_fragment(b"x", 1).as_deref(), Some("x"));
    }
}
