// ---------------------------------------------------------------------------
// file_header – Metadata record header with magic bytes, kind, and checksum
// ---------------------------------------------------------------------------
//
// Header format (20 bytes, fixed-size, little-endian):
//   [0..4]   Magic bytes: "ALOG" (0x414C4F47)
//   [4..8]   Header format version (u32)
//   [8..12]  Record kind (u32: 1 = manifest, 2 = checkpoint)
//   [12..16] Payload size (u32)
//   [16..20] xxHash32 checksum of the payload (everything after the header)
//
// On write: encode record -> prepend header (with checksum of encoded data)
// On read:  check magic -> check version/kind/size -> validate checksum

use xxhash_rust::xxh32::xxh32;

/// Magic bytes identifying an action log metadata file.
pub const MAGIC: [u8; 4] = [0x41, 0x4C, 0x4F, 0x47]; // "ALOG"

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 20;

/// Current header layout version.
pub const HEADER_FORMAT_VERSION: u32 = 1;

/// Seed for xxHash32 checksums, shared with table block checksums.
pub const XXHASH_SEED: u32 = 0;

/// Which record a metadata file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Manifest = 1,
    Checkpoint = 2,
}

impl RecordKind {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Manifest),
            2 => Some(Self::Checkpoint),
            _ => None,
        }
    }
}

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format_version: u32,
    pub kind: RecordKind,
    pub payload_size: u32,
    pub checksum: u32,
}

/// Checksum used for headers and table blocks.
pub fn checksum(data: &[u8]) -> u32 {
    xxh32(data, XXHASH_SEED)
}

/// Wrap an encoded record with a file header.
///
/// Returns bytes: [header (20 bytes)] ++ [payload].
pub fn wrap_with_header(kind: RecordKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&HEADER_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(kind as u32).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&checksum(payload).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse and validate the header, returning it with the payload slice.
///
/// # Errors
///
/// Returns a description if the magic bytes are missing, the file is
/// truncated, the version is from a newer build, the record kind is not the
/// one expected, or the checksum does not match.
pub fn unwrap_header(bytes: &[u8], expected: RecordKind) -> Result<(FileHeader, &[u8]), String> {
    if bytes.len() < 4 || bytes[..4] != MAGIC {
        return Err("missing ALOG magic bytes".to_string());
    }
    if bytes.len() < HEADER_SIZE {
        return Err(format!(
            "file is too short ({} bytes, need at least {} for header)",
            bytes.len(),
            HEADER_SIZE
        ));
    }

    let format_version = read_u32(bytes, 4);
    let raw_kind = read_u32(bytes, 8);
    let payload_size = read_u32(bytes, 12);
    let stored_checksum = read_u32(bytes, 16);

    if format_version > HEADER_FORMAT_VERSION {
        return Err(format!(
            "header format version {format_version} is newer than supported version {HEADER_FORMAT_VERSION}"
        ));
    }

    let kind = RecordKind::from_u32(raw_kind)
        .filter(|kind| *kind == expected)
        .ok_or_else(|| format!("expected {expected:?} record, found kind {raw_kind}"))?;

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_size as usize {
        return Err(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            payload_size
        ));
    }

    let computed = checksum(payload);
    if computed != stored_checksum {
        return Err(format!(
            "checksum mismatch (expected {stored_checksum:#010X}, got {computed:#010X})"
        ));
    }

    Ok((
        FileHeader {
            format_version,
            kind,
            payload_size,
            checksum: stored_checksum,
        },
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_and_unwrap_roundtrip() {
        let data = b"manifest payload";
        let wrapped = wrap_with_header(RecordKind::Manifest, data);
        assert_eq!(&wrapped[..4], &MAGIC);
        assert_eq!(wrapped.len(), HEADER_SIZE + data.len());

        let (header, payload) =
            unwrap_header(&wrapped, RecordKind::Manifest).expect("unwrap should succeed");
        assert_eq!(header.format_version, HEADER_FORMAT_VERSION);
        assert_eq!(header.kind, RecordKind::Manifest);
        assert_eq!(header.payload_size, data.len() as u32);
        assert_eq!(payload, data);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let wrapped = wrap_with_header(RecordKind::Checkpoint, b"x");
        let err = unwrap_header(&wrapped, RecordKind::Manifest).unwrap_err();
        assert!(err.contains("expected Manifest"), "got: {err}");
    }

    #[test]
    fn test_missing_magic_rejected() {
        let err = unwrap_header(b"\x00\x01\x02\x03junk", RecordKind::Manifest).unwrap_err();
        assert!(err.contains("magic"), "got: {err}");
    }

    #[test]
    fn test_corrupted_checksum_detected() {
        let mut wrapped = wrap_with_header(RecordKind::Checkpoint, b"test payload");
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0xFF;
        let err = unwrap_header(&wrapped, RecordKind::Checkpoint).unwrap_err();
        assert!(err.contains("checksum mismatch"), "got: {err}");
    }

    #[test]
    fn test_truncated_payload_detected() {
        let wrapped = wrap_with_header(RecordKind::Checkpoint, b"test payload");
        let err = unwrap_header(&wrapped[..wrapped.len() - 3], RecordKind::Checkpoint).unwrap_err();
        assert!(err.contains("header says"), "got: {err}");
    }

    #[test]
    fn test_truncated_header_detected() {
        let err = unwrap_header(b"ALOG\x01\x00", RecordKind::Manifest).unwrap_err();
        assert!(err.contains("too short"), "got: {err}");
    }

    #[test]
    fn test_future_header_version_rejected() {
        let mut wrapped = wrap_with_header(RecordKind::Manifest, b"payload");
        wrapped[4..8].copy_from_slice(&999u32.to_le_bytes());
        let err = unwrap_header(&wrapped, RecordKind::Manifest).unwrap_err();
        assert!(err.contains("999"), "got: {err}");
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let wrapped = wrap_with_header(RecordKind::Checkpoint, b"");
        assert_eq!(wrapped.len(), HEADER_SIZE);
        let (header, payload) = unwrap_header(&wrapped, RecordKind::Checkpoint).unwrap();
        assert_eq!(header.payload_size, 0);
        assert!(payload.is_empty());
    }
}
