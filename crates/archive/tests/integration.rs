//! Integration tests for archive crate

#[cfg(test)]
mod tests {
    use assetpack_archive::{
        repackage, ArchiveFormat, EntryHeader, PathFilter, PathRewrite, Sink, SourceArchive,
        Tarball,
    };
    use assetpack_errors::{ArchiveError, CloseLayer, Error};
    use proptest::prelude::*;
    use std::fs::File;
    use std::io::{self, Cursor, Read, Write};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    const FAST: i32 = 3;

    #[derive(Debug, PartialEq, Eq)]
    struct ReadEntry {
        name: String,
        kind: tar::EntryType,
        mode: u32,
        size: u64,
        link: Option<String>,
        content: Vec<u8>,
    }

    fn read_archive(path: &Path) -> Vec<ReadEntry> {
        let decoder = zstd::stream::read::Decoder::new(File::open(path).unwrap()).unwrap();
        let mut archive = tar::Archive::new(decoder);
        let mut out = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = String::from_utf8(entry.path_bytes().into_owned()).unwrap();
            let kind = entry.header().entry_type();
            let mode = entry.header().mode().unwrap();
            let size = entry.header().size().unwrap();
            let link = entry
                .link_name_bytes()
                .map(|l| String::from_utf8(l.into_owned()).unwrap());
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            out.push(ReadEntry {
                name,
                kind,
                mode,
                size,
                link,
                content,
            });
        }
        out
    }

    fn tar_gz_source(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("source.tar.gz");
        let encoder =
            flate2::write::GzEncoder::new(File::create(&path).unwrap(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);

        let mut add_file = |name: &str, data: &[u8], mode: u32| {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(mode);
            builder.append_data(&mut header, name, data).unwrap();
        };
        add_file("foo/bar.txt", b"bar contents", 0o640);
        add_file("other/skip.txt", b"skip me", 0o644);

        let mut dir_header = tar::Header::new_gnu();
        dir_header.set_entry_type(tar::EntryType::Directory);
        dir_header.set_size(0);
        dir_header.set_mode(0o755);
        builder
            .append_data(&mut dir_header, "foo/baz/", io::empty())
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_append_round_trip_preserves_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/pkg/dist.tzst");

        let mut tarball = Tarball::create_with(&path, FAST).unwrap();
        let exe = EntryHeader::file("bin/piper", 4).unwrap().with_mode(0o755);
        tarball.append(&exe, &b"\x7fELF"[..]).unwrap();
        let empty = EntryHeader::file("./empty.txt", 0).unwrap();
        tarball.append(&empty, io::empty()).unwrap();
        let link = EntryHeader::symlink("lib/libpiper.so", "libpiper.so.1").unwrap();
        tarball.append(&link, io::empty()).unwrap();
        assert_eq!(tarball.entry_count(), 3);
        tarball.close().unwrap();

        let entries = read_archive(&path);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "bin/piper");
        assert_eq!(entries[0].mode, 0o755);
        assert_eq!(entries[0].content, b"\x7fELF");
        assert_eq!(entries[1].name, "empty.txt");
        assert_eq!(entries[1].size, 0);
        assert_eq!(entries[2].kind, tar::EntryType::Symlink);
        assert_eq!(entries[2].link.as_deref(), Some("libpiper.so.1"));
        assert_eq!(entries[2].size, 0);
    }

    #[test]
    fn test_long_names_survive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dist.tzst");
        let name = format!("espeak-ng-data/{}/phondata", "voices".repeat(30));

        let mut tarball = Tarball::create_with(&path, FAST).unwrap();
        let header = EntryHeader::file(&name, 2).unwrap();
        tarball.append(&header, &b"ok"[..]).unwrap();
        tarball.close().unwrap();

        let entries = read_archive(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, name);
    }

    #[test]
    fn test_output_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let build = |name: &str| {
            let path = temp.path().join(name);
            let mut tarball = Tarball::create_with(&path, FAST).unwrap();
            let header = EntryHeader::file("voice.onnx", 5).unwrap();
            tarball.append(&header, &b"model"[..]).unwrap();
            tarball.close().unwrap();
            std::fs::read(path).unwrap()
        };
        assert_eq!(build("a.tzst"), build("b.tzst"));
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let temp = TempDir::new().unwrap();

        let mut tarball = Tarball::create_with(temp.path().join("short.tzst"), FAST).unwrap();
        let header = EntryHeader::file("short.bin", 10).unwrap();
        let err = tarball.append(&header, &b"12345"[..]).unwrap_err();
        match err {
            Error::Archive(ArchiveError::SizeMismatch {
                entry, expected, ..
            }) => {
                assert_eq!(entry, "short.bin");
                assert_eq!(expected, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        tarball.discard();
        assert!(!temp.path().join("short.tzst").exists());

        let mut tarball = Tarball::create_with(temp.path().join("long.tzst"), FAST).unwrap();
        let header = EntryHeader::file("long.bin", 2).unwrap();
        let err = tarball.append(&header, &b"12345"[..]).unwrap_err();
        assert!(matches!(
            err,
            Error::Archive(ArchiveError::SizeMismatch { .. })
        ));
        tarball.discard();
    }

    #[cfg(unix)]
    #[test]
    fn test_append_file_keeps_symlinks_and_modes() {
        use std::os::unix::fs::{symlink, PermissionsExt};

        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("piper");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        // dangling on purpose: the target must never be opened
        let link = temp.path().join("libonnxruntime.so");
        symlink("libonnxruntime.so.1.14.1", &link).unwrap();

        let path = temp.path().join("out/dist.tzst");
        let mut tarball = Tarball::create_with(&path, FAST).unwrap();
        tarball.append_file("piper", &exe).unwrap();
        tarball.append_file("lib/libonnxruntime.so", &link).unwrap();
        tarball.close().unwrap();

        let entries = read_archive(&path);
        assert_eq!(entries[0].mode, 0o755);
        assert_eq!(entries[0].content, b"#!/bin/sh\n");
        assert_eq!(entries[1].kind, tar::EntryType::Symlink);
        assert_eq!(
            entries[1].link.as_deref(),
            Some("libonnxruntime.so.1.14.1")
        );
        assert_eq!(entries[1].size, 0);
        assert!(entries[1].content.is_empty());
    }

    #[test]
    fn test_append_file_rejects_directories() {
        let temp = TempDir::new().unwrap();
        let mut tarball = Tarball::create_with(temp.path().join("dist.tzst"), FAST).unwrap();
        let err = tarball.append_file("dir", temp.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Archive(ArchiveError::UnsupportedEntry { .. })
        ));
        tarball.discard();
    }

    #[derive(Clone, Default)]
    struct Probe {
        armed: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
    }

    struct FailingSink {
        bytes: Vec<u8>,
        probe: Probe,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.probe.armed.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
            }
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink for FailingSink {
        fn close(&mut self) -> io::Result<()> {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_close_reports_encoder_failure_and_still_closes_file() {
        let probe = Probe::default();
        let sink = FailingSink {
            bytes: Vec::new(),
            probe: probe.clone(),
        };

        let mut tarball = Tarball::from_writer(sink, "mem/dist.tzst", FAST).unwrap();
        let header = EntryHeader::file("voice.json", 2).unwrap();
        tarball.append(&header, &b"{}"[..]).unwrap();

        probe.armed.store(true, Ordering::SeqCst);
        let err = tarball.close().unwrap_err();

        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
        let Error::Archive(archive_err) = &err else {
            panic!("unexpected error: {err:?}");
        };
        let failures = archive_err.close_failures();
        assert!(failures.iter().any(|f| f.layer == CloseLayer::Encoder));
        let message = err.to_string();
        assert!(message.contains("failed to close encoder"), "{message}");
        assert!(message.contains("broken pipe"), "{message}");
    }

    #[test]
    fn test_selective_repackage() {
        let temp = TempDir::new().unwrap();
        let source_path = tar_gz_source(temp.path());

        let mut source =
            SourceArchive::open("piper_amd64.tar.gz", File::open(&source_path).unwrap()).unwrap();
        assert_eq!(
            source.format(),
            ArchiveFormat::CompressedTar(assetpack_archive::Compression::Gzip)
        );

        let dest = temp.path().join("dist.tzst");
        let mut tarball = Tarball::create_with(&dest, FAST).unwrap();
        let report = repackage(
            &mut source,
            &mut tarball,
            &PathFilter::new(["foo/"]),
            &PathRewrite::StripPrefix("foo/".to_string()),
            &CancellationToken::new(),
        )
        .unwrap();
        tarball.close().unwrap();

        assert_eq!(report.written, 1);
        let entries = read_archive(&dest);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "bar.txt");
        assert_eq!(entries[0].mode, 0o640);
        assert_eq!(entries[0].content, b"bar contents");
    }

    #[test]
    fn test_repackage_zip_source() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.add_directory("piper/", options).unwrap();
        writer
            .start_file("piper/piper.exe", options.unix_permissions(0o755))
            .unwrap();
        writer.write_all(b"MZ binary").unwrap();
        writer
            .add_symlink("piper/onnxruntime.dll", "onnxruntime.1.dll", options)
            .unwrap();
        writer.start_file("README.txt", options).unwrap();
        writer.write_all(b"not selected").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut source = SourceArchive::open("piper_windows_amd64.zip", Cursor::new(bytes)).unwrap();
        assert_eq!(source.format(), ArchiveFormat::Zip);

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dist.tzst");
        let mut tarball = Tarball::create_with(&dest, FAST).unwrap();
        repackage(
            &mut source,
            &mut tarball,
            &PathFilter::new(["piper"]),
            &PathRewrite::StripPrefix("piper/".to_string()),
            &CancellationToken::new(),
        )
        .unwrap();
        tarball.close().unwrap();

        let entries = read_archive(&dest);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "piper.exe");
        assert_eq!(entries[0].mode, 0o755);
        assert_eq!(entries[0].content, b"MZ binary");
        assert_eq!(entries[1].name, "onnxruntime.dll");
        assert_eq!(entries[1].kind, tar::EntryType::Symlink);
        assert_eq!(entries[1].link.as_deref(), Some("onnxruntime.1.dll"));
    }

    #[test]
    fn test_unextractable_sources_are_rejected() {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        gz.write_all(b"raw model weights").unwrap();
        let bytes = gz.finish().unwrap();

        let err = SourceArchive::open("voice.onnx.gz", Cursor::new(bytes)).err();
        assert!(matches!(
            err,
            Some(Error::Archive(ArchiveError::UnsupportedFormat { .. }))
        ));

        let err = SourceArchive::open("notes.txt", Cursor::new(b"plain text".to_vec())).err();
        assert!(matches!(
            err,
            Some(Error::Archive(ArchiveError::UnrecognizedFormat { .. }))
        ));
    }

    #[test]
    fn test_cancelled_repackage_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let source_path = tar_gz_source(temp.path());
        let mut source =
            SourceArchive::open("src.tgz", File::open(&source_path).unwrap()).unwrap();

        let dest = temp.path().join("dist.tzst");
        let mut tarball = Tarball::create_with(&dest, FAST).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = repackage(
            &mut source,
            &mut tarball,
            &PathFilter::all(),
            &PathRewrite::Keep,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(tarball.entry_count(), 0);
        tarball.discard();
        assert!(!dest.exists());
    }

    type GeneratedEntry = (String, Vec<u8>, u32, Option<String>);

    fn entry_strategy() -> impl Strategy<Value = Vec<GeneratedEntry>> {
        prop::collection::vec(
            (
                "[a-z]{1,8}(/[a-z0-9_]{1,12}){0,2}",
                prop::collection::vec(any::<u8>(), 0..2048),
                prop::sample::select(vec![0o600_u32, 0o644, 0o755]),
                prop::option::weighted(0.3, "[a-z]{1,8}(/[a-z0-9_]{1,12}){0,2}"),
            ),
            1..6,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn round_trip_any_entries(entries in entry_strategy()) {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("dist.tzst");

            let mut tarball = Tarball::create_with(&path, FAST).unwrap();
            for (name, content, mode, link) in &entries {
                let header = match link {
                    Some(target) => EntryHeader::symlink(name, target).unwrap(),
                    None => EntryHeader::file(name, content.len() as u64)
                        .unwrap()
                        .with_mode(*mode),
                };
                tarball.append(&header, content.as_slice()).unwrap();
            }
            tarball.close().unwrap();

            let read = read_archive(&path);
            prop_assert_eq!(read.len(), entries.len());
            for (got, (name, content, mode, link)) in read.iter().zip(&entries) {
                prop_assert_eq!(&got.name, name);
                prop_assert_eq!(&got.link, link);
                if link.is_some() {
                    prop_assert_eq!(got.kind, tar::EntryType::Symlink);
                    prop_assert_eq!(got.mode, 0o777);
                    prop_assert_eq!(got.size, 0);
                    prop_assert!(got.content.is_empty());
                } else {
                    prop_assert_eq!(got.kind, tar::EntryType::Regular);
                    prop_assert_eq!(got.mode, *mode);
                    prop_assert_eq!(got.size, content.len() as u64);
                    prop_assert_eq!(&got.content, content);
                }
            }
        }
    }
}
