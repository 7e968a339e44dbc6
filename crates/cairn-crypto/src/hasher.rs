use cairn_types::{ObjectId, ObjectKind};

/// Build the header that precedes an object's content in both the hash and
/// the stored form: `"<kind> <size>\0"`.
pub fn object_header(kind: ObjectKind, size: u64) -> Vec<u8> {
    let mut header = format!("{} {}", kind.name(), size).into_bytes();
    header.push(0);
    header
}

/// Parse an object header from the start of `data`.
///
/// Returns the kind, the declared content size, and the header length
/// (including the NUL terminator), or `None` if `data` does not start with a
/// well-formed header.
pub fn parse_object_header(data: &[u8]) -> Option<(ObjectKind, u64, usize)> {
    // "commit 18446744073709551615\0" is the longest possible header.
    let window = &data[..data.len().min(32)];
    let nul = window.iter().position(|&b| b == 0)?;
    let text = std::str::from_utf8(&window[..nul]).ok()?;
    let (name, size) = text.split_once(' ')?;
    let kind = ObjectKind::from_name(name)?;
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if size.len() > 1 && size.starts_with('0') {
        return None;
    }
    let size = size.parse().ok()?;
    Some((kind, size, nul + 1))
}

/// Streaming BLAKE3 hasher over an object's tagged byte sequence.
///
/// The header is fed on construction, so the caller only streams the
/// content. The resulting identifier is the hash of
/// `"<kind> <size>\0" + content`.
#[derive(Clone, Debug)]
pub struct ObjectHasher {
    inner: blake3::Hasher,
    declared: u64,
    consumed: u64,
}

impl ObjectHasher {
    /// Start hashing an object of the given kind and declared size.
    pub fn new(kind: ObjectKind, size: u64) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(&object_header(kind, size));
        Self {
            inner,
            declared: size,
            consumed: 0,
        }
    }

    /// Hash a complete in-memory object.
    pub fn hash(kind: ObjectKind, data: &[u8]) -> ObjectId {
        let mut hasher = Self::new(kind, data.len() as u64);
        hasher.update(data);
        hasher.finalize()
    }

    /// Feed the next slice of content.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.consumed += data.len() as u64;
    }

    /// Content bytes consumed so far (the header is not counted).
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Size declared in the header.
    pub fn declared_size(&self) -> u64 {
        self.declared
    }

    /// Produce the identifier. The hasher may keep being used afterwards.
    pub fn finalize(&self) -> ObjectId {
        ObjectId::from_hash(*self.inner.finalize().as_bytes())
    }
}
