//! Integration tests for hash crate

#[cfg(test)]
mod tests {
    use assetpack_hash::*;
    use tempfile::tempdir;
    use tokio::fs;

    #[tokio::test]
    async fn test_fingerprint_ignores_call_order() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        fs::write(&a, b"alpha contents").await.unwrap();
        fs::write(&b, b"beta contents").await.unwrap();

        let forward = compute_fingerprint(&[&a, &b]).await.unwrap();
        let reverse = compute_fingerprint(&[&b, &a]).await.unwrap();
        assert_eq!(forward, reverse);
    }

    #[tokio::test]
    async fn test_single_bit_flip_changes_fingerprint() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let mut content = vec![0x5au8; 4096];
        fs::write(&a, &content).await.unwrap();
        fs::write(&b, b"unchanged").await.unwrap();
        let before = compute_fingerprint(&[&a, &b]).await.unwrap();

        content[2048] ^= 0x01;
        fs::write(&a, &content).await.unwrap();
        let after = compute_fingerprint(&[&a, &b]).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = compute_fingerprint(&[dir.path().join("missing.bin")]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_and_read_metadata() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("dist.tzst");
        fs::write(&archive, b"archive bytes").await.unwrap();

        let written = write_metadata(dir.path(), "1.0.0", &[&archive]).await.unwrap();
        assert_eq!(written.version, "1.0.0");
        assert_eq!(written.hash, Fingerprint::from_data(b"archive bytes"));

        let raw = fs::read_to_string(dir.path().join("dist.json")).await.unwrap();
        assert!(raw.starts_with(r#"{"Version":"1.0.0","Hash":{"Hi":"#));
        assert!(!dir.path().join("dist.json.tmp").exists());

        let read = read_metadata(dir.path()).await.unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn test_write_metadata_fails_on_unreadable_input() {
        let dir = tempdir().unwrap();
        let result = write_metadata(dir.path(), "1.0.0", &[dir.path().join("nope")]).await;
        assert!(result.is_err());
        assert!(!dir.path().join("dist.json").exists());
    }
}
