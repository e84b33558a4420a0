//! Upload orchestrator.
//!
//! Runs validate → chunk → negotiate → block loop → commit for one file,
//! reports progress events and supports cancellation.

use std::path::Path;

use micloud_transfer::{
    BlockReader, DigestAlgorithm, TransferError, chunk_file, digest_file, validate_file_size,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::block::{BlockUploader, PROGRESS_END};
use crate::commit::commit;
use crate::error::UploadError;
use crate::negotiate::negotiate;
use crate::transport::CloudTransport;
use crate::types::{
    FileHandle, FinalManifest, FullCommit, NegotiationResult, UploadEvent, UploadManifest,
    UploadOptions, UploadResult, UploadSession, UploadStage,
};

/// Capacity of the event channel. Events beyond it are dropped rather than
/// stalling the upload.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Uploads local files through a [`CloudTransport`].
pub struct Uploader<'a> {
    transport: &'a dyn CloudTransport,
    session: UploadSession,
    options: UploadOptions,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl<'a> Uploader<'a> {
    /// Creates an uploader with default options.
    pub fn new(transport: &'a dyn CloudTransport, session: UploadSession) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            session,
            options: UploadOptions::default(),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for uploads run by this uploader.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads the file at `path` into folder `parent_id`.
    ///
    /// Emits `Completed` or `Failed` as the last event.
    pub async fn upload(&self, path: &Path, parent_id: &str) -> Result<UploadResult, UploadError> {
        match self.run(path, parent_id).await {
            Ok(result) => {
                info!(
                    path = %path.display(),
                    file_id = %result.file_id,
                    deduplicated = result.deduplicated,
                    uploaded = result.blocks_uploaded,
                    total = result.blocks_total,
                    "upload committed"
                );
                self.emit(UploadEvent::Completed {
                    file_id: result.file_id.clone(),
                });
                Ok(result)
            }
            Err(e) => {
                error!(path = %path.display(), stage = ?e.stage(), error = %e, "upload failed");
                self.emit(UploadEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, path: &Path, parent_id: &str) -> Result<UploadResult, UploadError> {
        // 1. Validate (size only, before any hashing)
        self.enter(UploadStage::Validate, 0.0, "Checking file...")?;
        let handle = FileHandle::open(path)?;
        validate_file_size(handle.size()).map_err(UploadError::SizeLimit)?;
        info!(name = %handle.name(), size = handle.size(), "uploading file");

        // 2. Chunk and hash
        self.enter(UploadStage::Chunk, 0.02, "Computing digests...")?;
        let manifest = self.build_manifest(&handle).await?;
        debug!(sha1 = %manifest.sha1, blocks = manifest.blocks.len(), "manifest ready");

        // 3. Negotiate
        self.enter(UploadStage::Negotiate, 0.1, "Negotiating with server...")?;
        let negotiated = negotiate(
            self.transport,
            &self.session,
            &manifest,
            self.options.request_timeout,
        )
        .await?;

        // 4. Block loop (only when the server lacks content)
        let blocks_total = manifest.blocks.len();
        let (final_manifest, deduplicated, blocks_uploaded, bytes_uploaded) = match negotiated {
            NegotiationResult::FileAlreadyExists { upload_id } => {
                (FinalManifest::Existing { upload_id }, true, 0, 0)
            }
            NegotiationResult::BlocksNeeded(needed) => {
                self.enter(UploadStage::UploadBlocks, 0.15, "Uploading blocks...")?;
                let reader =
                    BlockReader::open(handle.path(), handle.size(), self.options.chunk_size)
                        .map_err(|e| match e {
                            TransferError::Io(io) => UploadError::Io(io),
                            other => UploadError::InvalidFile(other.to_string()),
                        })?;
                let uploader = BlockUploader::new(
                    self.transport,
                    &needed.node_url,
                    &needed.file_meta,
                    self.options.block_timeout,
                );
                let summary = uploader
                    .run(
                        reader,
                        &manifest.blocks,
                        &needed.blocks,
                        &self.cancel,
                        &self.events_tx,
                    )
                    .await?;
                let full = FullCommit::new(&manifest, needed, summary.tokens);
                (
                    FinalManifest::Full(full),
                    false,
                    summary.uploaded,
                    summary.bytes_uploaded,
                )
            }
        };

        // 5. Commit
        self.enter(UploadStage::Commit, PROGRESS_END, "Committing file...")?;
        let file_id = commit(
            self.transport,
            &self.session,
            handle.name(),
            parent_id,
            &final_manifest,
            self.options.request_timeout,
        )
        .await?;

        self.emit(UploadEvent::Progress {
            progress: 1.0,
            status: "Upload complete".into(),
        });

        Ok(UploadResult {
            file_id,
            deduplicated,
            blocks_total,
            blocks_uploaded,
            bytes_uploaded,
        })
    }

    /// Computes the whole-file digest and block descriptors off the async
    /// runtime.
    async fn build_manifest(&self, handle: &FileHandle) -> Result<UploadManifest, UploadError> {
        let path = handle.path().to_path_buf();
        let size = handle.size();
        let chunk_size = self.options.chunk_size;

        let (sha1, blocks) = tokio::task::spawn_blocking(move || {
            let sha1 = digest_file(DigestAlgorithm::Sha1, &path)?;
            let blocks = chunk_file(&path, size, &sha1, chunk_size)?;
            Ok::<_, TransferError>((sha1, blocks))
        })
        .await
        .map_err(|e| UploadError::Task(e.to_string()))?
        .map_err(UploadError::Digest)?;

        Ok(UploadManifest {
            name: handle.name().to_string(),
            size,
            sha1,
            blocks,
        })
    }

    /// Checks for cancellation and announces a stage.
    fn enter(&self, stage: UploadStage, progress: f64, status: &str) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        debug!(%stage, "entering stage");
        self.emit(UploadEvent::Stage { stage });
        self.emit(UploadEvent::Progress {
            progress,
            status: status.to_string(),
        });
        Ok(())
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::TransportFuture;
    use micloud_transfer::{md5_hex, sha1_hex};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    const MIB: usize = 1024 * 1024;

    /// Mock transport that records requests and replays scripted bodies.
    struct MockTransport {
        form_replies: Mutex<Vec<Vec<u8>>>,
        block_replies: Mutex<Vec<Vec<u8>>>,
        forms: Mutex<Vec<(String, Vec<(String, String)>)>>,
        blocks: Mutex<Vec<(String, usize)>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                form_replies: Mutex::new(Vec::new()),
                block_replies: Mutex::new(Vec::new()),
                forms: Mutex::new(Vec::new()),
                blocks: Mutex::new(Vec::new()),
            }
        }

        fn push_form(&self, v: serde_json::Value) {
            self.form_replies
                .lock()
                .unwrap()
                .push(serde_json::to_vec(&v).unwrap());
        }

        fn push_block(&self, v: serde_json::Value) {
            self.block_replies
                .lock()
                .unwrap()
                .push(serde_json::to_vec(&v).unwrap());
        }

        fn form_count(&self) -> usize {
            self.forms.lock().unwrap().len()
        }

        fn block_count(&self) -> usize {
            self.blocks.lock().unwrap().len()
        }

        /// Decoded `data` field of the n-th form post.
        fn form_data(&self, n: usize) -> serde_json::Value {
            let forms = self.forms.lock().unwrap();
            let (_, fields) = &forms[n];
            let data = fields
                .iter()
                .find(|(k, _)| k == "data")
                .map(|(_, v)| v.clone())
                .unwrap();
            serde_json::from_str(&data).unwrap()
        }

        fn form_field(&self, n: usize, key: &str) -> Option<String> {
            let forms = self.forms.lock().unwrap();
            forms[n]
                .1
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    impl CloudTransport for MockTransport {
        fn post_form<'a>(&'a self, url: &'a str, form: &'a [(&'a str, String)]) -> TransportFuture<'a> {
            self.forms.lock().unwrap().push((
                url.to_string(),
                form.iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ));
            Box::pin(async move {
                let mut replies = self.form_replies.lock().unwrap();
                if replies.is_empty() {
                    Err(TransportError::Http("no mock response available".into()))
                } else {
                    Ok(replies.remove(0))
                }
            })
        }

        fn post_block<'a>(&'a self, url: &'a str, data: Vec<u8>) -> TransportFuture<'a> {
            self.blocks
                .lock()
                .unwrap()
                .push((url.to_string(), data.len()));
            Box::pin(async move {
                let mut replies = self.block_replies.lock().unwrap();
                if replies.is_empty() {
                    Err(TransportError::Http("no mock block response".into()))
                } else {
                    Ok(replies.remove(0))
                }
            })
        }
    }

    /// Transport whose calls never complete.
    struct HungTransport;

    impl CloudTransport for HungTransport {
        fn post_form<'a>(&'a self, _url: &'a str, _form: &'a [(&'a str, String)]) -> TransportFuture<'a> {
            Box::pin(std::future::pending::<Result<Vec<u8>, TransportError>>())
        }

        fn post_block<'a>(&'a self, _url: &'a str, _data: Vec<u8>) -> TransportFuture<'a> {
            Box::pin(std::future::pending::<Result<Vec<u8>, TransportError>>())
        }
    }

    fn write_file(dir: &Path, name: &str, len: usize) -> std::path::PathBuf {
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &data).unwrap();
        path
    }

    fn session() -> UploadSession {
        UploadSession::new("svc-token").with_base_url("https://api.test")
    }

    fn blocks_needed(block_metas: serde_json::Value) -> serde_json::Value {
        json!({
            "result": "ok",
            "data": {"storage": {
                "exists": false,
                "uploadId": "up-1",
                "kss": {
                    "node_urls": ["https://node-1"],
                    "file_meta": "FM",
                    "secure_key": "SK",
                    "contentCacheKey": "CCK",
                    "block_metas": block_metas,
                }
            }}
        })
    }

    fn committed(id: &str) -> serde_json::Value {
        json!({"result": "ok", "data": {"id": id}})
    }

    #[tokio::test]
    async fn ten_mib_file_uploads_three_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "video.mp4", 10 * MIB);
        let data = std::fs::read(&path).unwrap();

        let mock = MockTransport::new();
        mock.push_form(blocks_needed(json!([
            {"block_meta": "B0"}, {"block_meta": "B1"}, {"block_meta": "B2"}
        ])));
        mock.push_block(json!({"stat": "BLOCK_COMPLETED", "commit_meta": "C0"}));
        mock.push_block(json!({"stat": "BLOCK_COMPLETED", "commit_meta": "C1"}));
        mock.push_block(json!({"stat": "BLOCK_COMPLETED", "commit_meta": "C2"}));
        mock.push_form(committed("file-42"));

        let uploader = Uploader::new(&mock, session());
        let result = uploader.upload(&path, "folder-7").await.unwrap();

        assert_eq!(result.file_id, "file-42");
        assert!(!result.deduplicated);
        assert_eq!(result.blocks_total, 3);
        assert_eq!(result.blocks_uploaded, 3);
        assert_eq!(result.bytes_uploaded, (10 * MIB) as u64);

        // Three sequential transfers of 4, 4 and 2 MiB.
        let blocks = mock.blocks.lock().unwrap().clone();
        assert_eq!(
            blocks.iter().map(|(_, len)| *len).collect::<Vec<_>>(),
            vec![4 * MIB, 4 * MIB, 2 * MIB]
        );
        assert!(blocks[2].0.ends_with("file_meta=FM&block_meta=B2"));

        // Negotiation manifest.
        assert_eq!(mock.form_count(), 2);
        let manifest = mock.form_data(0);
        let storage = &manifest["content"]["storage"];
        assert_eq!(manifest["content"]["name"], "video.mp4");
        assert_eq!(storage["size"], 10 * MIB);
        assert_eq!(storage["sha1"], sha1_hex(&data));
        let infos = storage["kss"]["block_infos"].as_array().unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[2]["size"], 2 * MIB);
        assert_eq!(infos[2]["md5"], md5_hex(&data[8 * MIB..]));
        assert_eq!(mock.form_field(0, "serviceToken").as_deref(), Some("svc-token"));

        // Commit record.
        let commit = mock.form_data(1);
        let kss = &commit["content"]["storage"]["kss"];
        assert_eq!(kss["commit_metas"][0]["commit_meta"], "C0");
        assert_eq!(kss["commit_metas"][2]["commit_meta"], "C2");
        assert_eq!(kss["secure_key"], "SK");
        assert_eq!(commit["content"]["storage"]["uploadId"], "up-1");
        assert_eq!(mock.form_field(1, "parentId").as_deref(), Some("folder-7"));
    }

    #[tokio::test]
    async fn existing_file_skips_block_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "doc.pdf", MIB);

        let mock = MockTransport::new();
        mock.push_form(json!({
            "result": "ok",
            "data": {"storage": {"exists": true, "uploadId": "up-existing"}}
        }));
        mock.push_form(committed("file-9"));

        let mut uploader = Uploader::new(&mock, session());
        let mut events = uploader.take_events().unwrap();
        let result = uploader.upload(&path, "0").await.unwrap();

        assert_eq!(result.file_id, "file-9");
        assert!(result.deduplicated);
        assert_eq!(result.blocks_uploaded, 0);
        assert_eq!(mock.block_count(), 0);

        let commit = mock.form_data(1);
        assert_eq!(
            commit,
            json!({"content": {"name": "doc.pdf", "storage": {"uploadId": "up-existing", "exists": true}}})
        );

        drop(uploader);
        let mut stages = Vec::new();
        while let Some(e) = events.recv().await {
            if let UploadEvent::Stage { stage } = e {
                stages.push(stage);
            }
        }
        assert!(!stages.contains(&UploadStage::UploadBlocks));
        assert_eq!(stages.last(), Some(&UploadStage::Commit));
    }

    #[tokio::test]
    async fn all_blocks_existing_makes_no_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 20);

        let mock = MockTransport::new();
        mock.push_form(blocks_needed(json!([
            {"is_existed": 1, "commit_meta": "E0"},
            {"is_existed": 1, "commit_meta": "E1"},
            {"is_existed": 1, "commit_meta": "E2"},
        ])));
        mock.push_form(committed("file-1"));

        let uploader = Uploader::new(&mock, session()).with_options(UploadOptions {
            chunk_size: 8,
            ..UploadOptions::default()
        });
        let result = uploader.upload(&path, "0").await.unwrap();

        assert_eq!(mock.block_count(), 0);
        assert_eq!(result.blocks_total, 3);
        assert_eq!(result.blocks_uploaded, 0);
        let commit = mock.form_data(1);
        let metas: Vec<_> = commit["content"]["storage"]["kss"]["commit_metas"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["commit_meta"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(metas, vec!["E0", "E1", "E2"]);
    }

    #[tokio::test]
    async fn empty_file_rejected_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.bin", 0);

        let mock = MockTransport::new();
        let err = Uploader::new(&mock, session())
            .upload(&path, "0")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::SizeLimit(TransferError::EmptyFile)
        ));
        assert_eq!(mock.form_count(), 0);
    }

    #[tokio::test]
    async fn missing_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockTransport::new();
        let err = Uploader::new(&mock, session())
            .upload(&dir.path().join("absent"), "0")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io(_)));
    }

    #[tokio::test]
    async fn failed_block_skips_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 20);

        let mock = MockTransport::new();
        mock.push_form(blocks_needed(json!([
            {"block_meta": "B0"}, {"block_meta": "B1"}, {"block_meta": "B2"}
        ])));
        mock.push_block(json!({"stat": "BLOCK_COMPLETED", "commit_meta": "C0"}));
        mock.push_block(json!({"stat": "BLOCK_EXPIRED"}));
        mock.push_form(committed("never"));

        let mut uploader = Uploader::new(&mock, session()).with_options(UploadOptions {
            chunk_size: 8,
            ..UploadOptions::default()
        });
        let mut events = uploader.take_events().unwrap();
        let err = uploader.upload(&path, "0").await.unwrap_err();

        assert!(matches!(err, UploadError::BlockUpload { index: 1, .. }));
        assert_eq!(mock.block_count(), 2);
        // Negotiation only; the commit was never sent.
        assert_eq!(mock.form_count(), 1);

        drop(uploader);
        let mut last = None;
        while let Some(e) = events.recv().await {
            last = Some(e);
        }
        assert!(matches!(last, Some(UploadEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn negotiation_rejection_surfaces_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 10);

        let mock = MockTransport::new();
        mock.push_form(json!({"result": "error", "description": "service token expired"}));

        let err = Uploader::new(&mock, session())
            .upload(&path, "0")
            .await
            .unwrap_err();
        match err {
            UploadError::Negotiation(desc) => assert_eq!(desc, "service token expired"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_node_aborts_before_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 10);

        let mock = MockTransport::new();
        mock.push_form(json!({
            "result": "ok",
            "data": {"storage": {"exists": false, "kss": {
                "node_urls": [], "file_meta": "FM", "block_metas": [{"block_meta": "B0"}]
            }}}
        }));

        let err = Uploader::new(&mock, session())
            .upload(&path, "0")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NoAvailableNode));
        assert_eq!(mock.block_count(), 0);
    }

    #[tokio::test]
    async fn commit_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 10);

        let mock = MockTransport::new();
        mock.push_form(json!({
            "result": "ok",
            "data": {"storage": {"exists": true, "uploadId": "u"}}
        }));
        mock.push_form(json!({"result": "error", "description": "name conflict"}));

        let err = Uploader::new(&mock, session())
            .upload(&path, "0")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Commit(ref d) if d == "name conflict"));
    }

    #[tokio::test]
    async fn cancelled_upload_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 10);

        let mock = MockTransport::new();
        let uploader = Uploader::new(&mock, session());
        uploader.cancel_token().cancel();

        let err = uploader.upload(&path, "0").await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(mock.form_count(), 0);
    }

    #[tokio::test]
    async fn hung_negotiation_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 10);

        let uploader = Uploader::new(&HungTransport, session()).with_options(UploadOptions {
            request_timeout: Duration::from_millis(50),
            ..UploadOptions::default()
        });
        let err = uploader.upload(&path, "0").await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Timeout {
                stage: UploadStage::Negotiate
            }
        ));
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.bin", 20);

        let mock = MockTransport::new();
        mock.push_form(blocks_needed(json!([
            {"block_meta": "B0"}, {"is_existed": 1, "commit_meta": "E1"}, {"block_meta": "B2"}
        ])));
        mock.push_block(json!({"stat": "BLOCK_COMPLETED", "commit_meta": "C0"}));
        mock.push_block(json!({"stat": "BLOCK_COMPLETED", "commit_meta": "C2"}));
        mock.push_form(committed("f"));

        let mut uploader = Uploader::new(&mock, session()).with_options(UploadOptions {
            chunk_size: 8,
            ..UploadOptions::default()
        });
        let mut events = uploader.take_events().unwrap();
        uploader.upload(&path, "0").await.unwrap();
        drop(uploader);

        let mut last = -1.0f64;
        let mut saw_completed = false;
        while let Some(e) = events.recv().await {
            match e {
                UploadEvent::Progress { progress, .. } => {
                    assert!(progress >= last, "progress went back: {last} -> {progress}");
                    last = progress;
                }
                UploadEvent::Completed { ref file_id } => {
                    assert_eq!(file_id, "f");
                    saw_completed = true;
                }
                _ => {}
            }
        }
        assert_eq!(last, 1.0);
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn take_events_once() {
        let mock = MockTransport::new();
        let mut uploader = Uploader::new(&mock, session());
        assert!(uploader.take_events().is_some());
        assert!(uploader.take_events().is_none());
    }
}
