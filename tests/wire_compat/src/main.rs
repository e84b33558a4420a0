fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use micloud_protocol::messages::{BlockChunkResponse, CommitStorage, ExistingStorage};
    use micloud_protocol::{NegotiationStorage, UploadRequest};
    use micloud_transfer::{DigestAlgorithm, chunk_file, digest_file};
    use micloud_upload::{
        BlockStatus, CommitToken, FinalManifest, FullCommit, NegotiationResult, UploadError,
        UploadManifest, parse_block_response, parse_commit_response, parse_negotiation,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_bytes(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_slice(&load_bytes(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a request fixture, re-serializes it, and compares the
    /// JSON values (order-independent).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed).unwrap();
        assert_eq!(reserialized, fixture, "roundtrip mismatch for {name}");
    }

    /// Manifest of an 11-byte file split into 6-byte blocks.
    fn hello_manifest() -> UploadManifest {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello world").unwrap();

        let sha1 = digest_file(DigestAlgorithm::Sha1, &path).unwrap();
        let blocks = chunk_file(&path, 11, &sha1, 6).unwrap();
        UploadManifest {
            name: "hello.txt".into(),
            size: 11,
            sha1,
            blocks,
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    #[test]
    fn negotiate_request_roundtrip() {
        roundtrip_test::<UploadRequest<NegotiationStorage>>("negotiate_request.json");
    }

    #[test]
    fn negotiate_request_matches_computed_manifest() {
        let request = serde_json::to_value(hello_manifest().to_request()).unwrap();
        assert_eq!(request, load_fixture("negotiate_request.json"));
    }

    #[test]
    fn commit_existing_roundtrip() {
        roundtrip_test::<UploadRequest<ExistingStorage>>("commit_request_existing.json");
    }

    #[test]
    fn commit_full_roundtrip() {
        roundtrip_test::<UploadRequest<CommitStorage>>("commit_request_full.json");
    }

    #[test]
    fn existing_commit_matches_fixture() {
        let manifest = FinalManifest::Existing {
            upload_id: "1A2B3C4D5E".into(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&manifest.to_json("hello.txt").unwrap()).unwrap();
        assert_eq!(json, load_fixture("commit_request_existing.json"));
    }

    #[test]
    fn full_commit_matches_fixture() {
        let manifest = hello_manifest();
        let NegotiationResult::BlocksNeeded(needed) =
            parse_negotiation(&load_bytes("negotiate_response_blocks.json"), 2).unwrap()
        else {
            panic!("expected BlocksNeeded");
        };
        let tokens = vec![CommitToken::new("COMMIT-0"), CommitToken::new("COMMIT-1")];
        let full = FinalManifest::Full(FullCommit::new(&manifest, needed, tokens));

        let json: serde_json::Value =
            serde_json::from_str(&full.to_json("hello.txt").unwrap()).unwrap();
        assert_eq!(json, load_fixture("commit_request_full.json"));
    }

    // -----------------------------------------------------------------------
    // Responses
    // -----------------------------------------------------------------------

    #[test]
    fn negotiate_response_exists() {
        let result = parse_negotiation(&load_bytes("negotiate_response_exists.json"), 2).unwrap();
        assert_eq!(
            result,
            NegotiationResult::FileAlreadyExists {
                upload_id: "1A2B3C4D5E".into()
            }
        );
    }

    #[test]
    fn negotiate_response_blocks() {
        let result = parse_negotiation(&load_bytes("negotiate_response_blocks.json"), 2).unwrap();
        let NegotiationResult::BlocksNeeded(needed) = result else {
            panic!("expected BlocksNeeded");
        };
        assert_eq!(needed.node_url, "https://node-sh.kss.example");
        assert_eq!(needed.upload_id, "9F8E7D6C");
        assert_eq!(
            needed.blocks,
            vec![
                BlockStatus::AlreadyExists {
                    commit_meta: CommitToken::new("COMMIT-0")
                },
                BlockStatus::NeedsUpload {
                    block_meta: "BLOCK-META-1".into()
                },
            ]
        );
    }

    #[test]
    fn negotiate_response_wrong_block_count() {
        assert!(matches!(
            parse_negotiation(&load_bytes("negotiate_response_blocks.json"), 3),
            Err(UploadError::Negotiation(_))
        ));
    }

    #[test]
    fn block_response_completed() {
        let token = parse_block_response(1, &load_bytes("block_response_completed.json")).unwrap();
        assert_eq!(token.as_str(), "COMMIT-1");

        roundtrip_test::<BlockChunkResponse>("block_response_completed.json");
    }

    #[test]
    fn commit_response_numeric_id() {
        let id = parse_commit_response(&load_bytes("commit_response_ok.json")).unwrap();
        assert_eq!(id, "17320945512345678");
    }

    #[test]
    fn commit_response_error() {
        match parse_commit_response(&load_bytes("commit_response_error.json")) {
            Err(UploadError::Commit(desc)) => assert_eq!(desc, "parent directory not found"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
