use qt_types::Digest;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag (e.g., `"qt-place-v1"`) that is
/// prepended to every hash computation. An object name and a source path
/// with identical bytes therefore never map to the same location.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for object record locations (input: canonical object name).
    pub const PLACE: Self = Self {
        domain: "qt-place-v1",
    };
    /// Hasher for dependency link record names (input: referrer).
    pub const LINK: Self = Self {
        domain: "qt-link-v1",
    };
    /// Hasher for meta record locations (input: source path).
    pub const META: Self = Self {
        domain: "qt-meta-v1",
    };
    /// Hasher for the basename uniqueness index.
    pub const UNIQUE: Self = Self {
        domain: "qt-unique-v1",
    };
    /// Hasher for source content digests.
    pub const CONTENT: Self = Self {
        domain: "qt-content-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hex digest, the form stored in meta records and compared against
    /// caller-supplied expected digests.
    pub fn hex(&self, data: &[u8]) -> String {
        self.hash(data).to_hex()
    }

    /// Verify that data produces the expected hex digest.
    pub fn verify_hex(&self, data: &[u8], expected: &str) -> bool {
        self.hex(data).eq_ignore_ascii_case(expected.trim())
    }
}
