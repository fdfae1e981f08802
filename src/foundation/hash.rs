use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5d1c_7a39_e4b2_0f68;

/// Stable 64-bit digest summarizing a mutable input set (files, child attribute hashes).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub const EMPTY: Fingerprint = Fingerprint(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Seeded xxh3 hasher with length-prefixed writes so adjacent fields cannot alias.
pub(crate) struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    pub(crate) fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    pub(crate) fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    pub(crate) fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    pub(crate) fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub(crate) fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    pub(crate) fn write_opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.write_u8(1);
                self.write_str(s);
            }
            None => self.write_u8(0),
        }
    }

    pub(crate) fn write_strs<'a>(&mut self, items: impl ExactSizeIterator<Item = &'a str>) {
        self.write_u64(items.len() as u64);
        for s in items {
            self.write_str(s);
        }
    }

    pub(crate) fn finish(self) -> Fingerprint {
        Fingerprint(self.inner.digest())
    }
}

/// Fingerprint over an unordered collection of strings: sorted before hashing.
pub(crate) fn fingerprint_sorted<I, S>(items: I) -> Fingerprint
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut v: Vec<S> = items.into_iter().collect();
    v.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
    let mut h = StableHasher::new();
    h.write_strs(v.iter().map(|s| s.as_ref()));
    h.finish()
}
