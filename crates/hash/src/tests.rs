//! Tests for fingerprinting and metadata

use super::*;
use tempfile::TempDir;
use tokio::fs;

#[test]
fn test_known_digest() {
    // XXH3-128 of the empty input
    let empty = Fingerprint::from_data(b"");
    assert_eq!(empty.to_hex(), "99aa06d3014798d86001c324468d497f");
}

#[test]
fn test_hex_round_trip() {
    let fp = Fingerprint::from_data(b"hex parsing");
    let parsed = Fingerprint::from_hex(&fp.to_hex()).unwrap();
    assert_eq!(fp, parsed);
    for bad in ["abcd", "zz"] {
        let err = Fingerprint::from_hex(bad).unwrap_err();
        match err {
            Error::Storage(StorageError::InvalidFingerprint { value, .. }) => assert_eq!(value, bad),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn test_serializes_as_hi_lo() {
    let fp = Fingerprint::from_u128((7u128 << 64) | 9);
    let json = serde_json::to_string(&fp).unwrap();
    assert_eq!(json, r#"{"Hi":7,"Lo":9}"#);
    let back: Fingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, fp);
}

#[tokio::test]
async fn test_streaming_matches_one_shot() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.bin");
    let b = temp.path().join("b.bin");
    fs::write(&a, b"first-").await.unwrap();
    fs::write(&b, b"second").await.unwrap();

    let fp = compute_fingerprint(&[&a, &b]).await.unwrap();
    assert_eq!(fp, Fingerprint::from_data(b"first-second"));
}

#[tokio::test]
async fn test_large_file_spans_chunks() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("big.bin");
    let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &data).await.unwrap();

    let mut hasher = ContentHasher::new();
    hasher.update_file(&path).await.unwrap();
    assert_eq!(hasher.bytes_hashed(), data.len() as u64);
    assert_eq!(hasher.finish(), Fingerprint::from_data(&data));
}

#[test]
fn test_sorting_is_string_order() {
    let sorted = sorted_paths(&["a/b", "a.b", "A"]);
    let names: Vec<_> = sorted.iter().map(|p| p.to_str().unwrap()).collect();
    assert_eq!(names, vec!["A", "a.b", "a/b"]);
}
