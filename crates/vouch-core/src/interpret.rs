//! Interpretation of gpg diagnostic text.
//!
//! The verdict comes from scraping gpg's human-readable stderr, not from the
//! exit code: gpg exits non-zero for a well-formed but cryptographically bad
//! signature, so only the diagnostics distinguish "bad signature" from
//! "could not check". `LC_ALL=C` on the invocation keeps the markers stable.

const GOOD_SIGNATURE_MARKER: &str = "Good signature";
const FINGERPRINT_MARKER: &str = "Primary key fingerprint:";

/// The interpreted result of a verify step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// True when the diagnostics report a good signature.
    pub verified: bool,
    /// The signer's primary key fingerprint, interior spaces removed, when
    /// the diagnostics report one. Independent of `verified`.
    pub fingerprint: Option<String>,
    /// The raw diagnostic text the tool produced.
    pub diagnostics: String,
}

/// Interpret the diagnostics of a completed verify step.
///
/// Pure text search: the verdict is the presence of the good-signature
/// marker, the fingerprint comes from the first fingerprint line when one
/// exists. A missing marker is a legitimate negative outcome, never an
/// error.
pub fn interpret(diagnostics: &str) -> Outcome {
    let verified = diagnostics.contains(GOOD_SIGNATURE_MARKER);
    let fingerprint = diagnostics
        .lines()
        .find(|line| line.contains(FINGERPRINT_MARKER))
        .and_then(|line| line.split_once(": "))
        .map(|(_, rest)| rest.replace(' ', ""));

    Outcome {
        verified,
        fingerprint,
        diagnostics: diagnostics.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
gpg: Signature made Thu Jan  1 00:00:00 2026 UTC
gpg:                using RSA key 4AB2C1F7D9E83025B1406D9F9710B89BCA57AD7C
gpg: Good signature from \"Tester <tester@example.org>\" [unknown]
gpg: WARNING: This key is not certified with a trusted signature!
gpg:          There is no indication that the signature belongs to the owner.
Primary key fingerprint: 4AB2 C1F7 D9E8 3025 B140  6D9F 9710 B89B CA57 AD7C
";

    const BAD: &str = "\
gpg: Signature made Thu Jan  1 00:00:00 2026 UTC
gpg:                using RSA key 4AB2C1F7D9E83025B1406D9F9710B89BCA57AD7C
gpg: BAD signature from \"Tester <tester@example.org>\" [unknown]
";

    #[test]
    fn test_good_signature() {
        let outcome = interpret(GOOD);
        assert!(outcome.verified);
        assert_eq!(
            outcome.fingerprint.as_deref(),
            Some("4AB2C1F7D9E83025B1406D9F9710B89BCA57AD7C")
        );
        assert_eq!(outcome.diagnostics, GOOD);
    }

    #[test]
    fn test_bad_signature() {
        let outcome = interpret(BAD);
        assert!(!outcome.verified);
        assert_eq!(outcome.fingerprint, None);
    }

    #[test]
    fn test_fingerprint_without_verdict() {
        // An expired or otherwise unusable key can report a fingerprint
        // without a good signature; the two fields stay independent.
        let text = "gpg: Can't check signature: No public key\n\
                    Primary key fingerprint: AAAA BBBB CCCC DDDD EEEE  FFFF 0000 1111 2222 3333\n";
        let outcome = interpret(text);
        assert!(!outcome.verified);
        assert_eq!(
            outcome.fingerprint.as_deref(),
            Some("AAAABBBBCCCCDDDDEEEEFFFF0000111122223333")
        );
    }

    #[test]
    fn test_missing_marker_is_not_an_error() {
        let outcome = interpret("");
        assert!(!outcome.verified);
        assert_eq!(outcome.fingerprint, None);
        assert_eq!(outcome.diagnostics, "");
    }

    #[test]
    fn test_interpret_is_idempotent() {
        let first = interpret(GOOD);
        let second = interpret(&first.diagnostics);
        assert_eq!(first, second);
    }
}
