//! Units of transfer work: one object moving in one direction.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures_util::StreamExt;
use lfsync_store::{Oid, Store, StoreError};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::data::{Action, Direction, ObjectResource, ObjectSpec};
use crate::effects::batch::BatchAuthorizer;
use crate::effects::context::{Reporter, TransferContext};
use crate::effects::http::{BoxStream, HttpClient};
use crate::error::{Result, TransferError};

const UPLOAD_ACTION: &str = "upload";
const DOWNLOAD_ACTION: &str = "download";
const VERIFY_ACTION: &str = "verify";
const MISSING_OBJECT_CODE: u16 = 404;

#[derive(Debug, Clone)]
struct TransferItem {
    oid:      Oid,
    size:     u64,
    name:     String,
    object:   OnceLock<ObjectResource>,
    /// Furthest byte position reported across every attempt.
    progress: Arc<AtomicU64>,
}

impl TransferItem {
    fn new(oid: Oid, size: u64, name: String) -> Self {
        Self {
            oid,
            size,
            name,
            object: OnceLock::new(),
            progress: Arc::default(),
        }
    }

    fn reporter<C>(&self, ctx: &TransferContext<C>, direction: Direction) -> Reporter {
        ctx.reporter(direction, &self.oid, &self.name, self.size, Arc::clone(&self.progress))
    }
}

/// Run blocking store I/O on tokio's blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::Worker(e.to_string()))?
        .map_err(TransferError::from)
}

/// An object in the local store bound for the remote.
#[derive(Debug, Clone)]
pub struct Uploadable {
    item: TransferItem,
    path: PathBuf,
}

impl Uploadable {
    /// Prepare `oid` for upload.
    ///
    /// With a `filename`, the working-copy file under `working_dir` is first
    /// reconciled with the store: if the object is missing locally the file is
    /// cleaned and must hash to `oid`. Mismatches are reported here, before
    /// the object is ever queued. Without a filename the object must already
    /// be stored.
    pub fn new(store: &Store, working_dir: &Path, oid: Oid, filename: Option<&str>) -> Result<Self> {
        let name = filename.unwrap_or_default().to_string();
        let local = |source| TransferError::Local {
            oid: oid.clone(),
            name: name.clone(),
            source,
        };

        if !name.is_empty() {
            store.reconcile(&oid, &working_dir.join(&name)).map_err(local)?;
        }
        let size = store.size(&oid).map_err(local)?;
        let path = store.locate(&oid);

        Ok(Self {
            item: TransferItem::new(oid, size, name),
            path,
        })
    }

    /// Location of the object in the local store.
    pub fn path(&self) -> &Path { &self.path }

    async fn transfer<C: HttpClient>(&self, ctx: &TransferContext<C>) -> Result<u64> {
        let object = self
            .item
            .object
            .get()
            .ok_or(TransferError::MissingAction(UPLOAD_ACTION))?;
        let Some(action) = object.action(UPLOAD_ACTION) else {
            return Ok(0);
        };
        ctx.checkpoint(action)?;

        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        let reporter = self.item.reporter(ctx, Direction::Upload);
        let body = upload_body(
            file,
            ctx.chunk_size,
            ctx.cancel.clone(),
            action.clone(),
            reporter.clone(),
        );

        if let Err(e) = ctx.client.put(action, body, self.item.size).await {
            // The body aborts on cancellation and expiry; report those as such.
            ctx.checkpoint(action)?;
            return Err(TransferError::Upload(e.to_string()));
        }

        if let Some(verify) = object.action(VERIFY_ACTION) {
            let spec = ObjectSpec {
                oid:  self.item.oid.clone(),
                size: self.item.size,
            };
            ctx.client
                .verify(verify, &spec)
                .await
                .map_err(|e| TransferError::Upload(format!("verify failed: {e}")))?;
        }
        reporter.finish();
        Ok(self.item.size)
    }
}

struct UploadBody {
    file:       tokio::fs::File,
    chunk_size: usize,
    cancel:     CancellationToken,
    action:     Action,
    reporter:   Reporter,
    sent:       u64,
}

fn upload_body(
    file: tokio::fs::File,
    chunk_size: usize,
    cancel: CancellationToken,
    action: Action,
    reporter: Reporter,
) -> BoxStream<'static, io::Result<Bytes>> {
    let state = UploadBody {
        file,
        chunk_size,
        cancel,
        action,
        reporter,
        sent: 0,
    };
    Box::pin(futures_util::stream::try_unfold(state, |mut state| async move {
        if state.cancel.is_cancelled() {
            return Err(io::Error::other(TransferError::Cancelled));
        }
        if state.action.is_expired() {
            return Err(io::Error::other(TransferError::AuthExpired));
        }

        let mut buf = vec![0u8; state.chunk_size];
        let n = state.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        state.sent += n as u64;
        state.reporter.report(state.sent);
        Ok(Some((Bytes::from(buf), state)))
    }))
}

/// An object on the remote bound for the local store.
#[derive(Debug, Clone)]
pub struct Downloadable {
    item: TransferItem,
}

impl Downloadable {
    /// `name` is for display only and may be empty.
    pub fn new(oid: Oid, size: u64, name: impl Into<String>) -> Self {
        Self {
            item: TransferItem::new(oid, size, name.into()),
        }
    }

    async fn transfer<C: HttpClient>(&self, ctx: &TransferContext<C>) -> Result<u64> {
        let action = self
            .item
            .object
            .get()
            .and_then(|object| object.action(DOWNLOAD_ACTION))
            .ok_or(TransferError::MissingAction(DOWNLOAD_ACTION))?;
        ctx.checkpoint(action)?;

        let mut stream = ctx
            .client
            .get(action)
            .await
            .map_err(|e| TransferError::Download(e.to_string()))?;
        let store = ctx.store.clone();
        let mut writer = blocking(move || store.stage()).await?;
        let reporter = self.item.reporter(ctx, Direction::Download);

        let mut received = 0u64;
        while let Some(chunk) = stream.next().await {
            ctx.checkpoint(action)?;
            let chunk = chunk.map_err(|e| TransferError::Download(e.to_string()))?;
            let len = chunk.len() as u64;
            writer = blocking(move || {
                let mut writer = writer;
                writer
                    .write_all(&chunk)
                    .map_err(|e| StoreError::io(writer.path(), e))?;
                Ok(writer)
            })
            .await?;
            received += len;
            reporter.report(received);
        }

        let oid = self.item.oid.clone();
        let (_, size) = blocking(move || writer.commit(Some(&oid))).await?;
        reporter.finish();
        Ok(size)
    }
}

/// One object's upload or download, as handed to a transfer queue.
#[derive(Debug, Clone)]
pub enum Transferable {
    Upload(Uploadable),
    Download(Downloadable),
}

impl From<Uploadable> for Transferable {
    fn from(upload: Uploadable) -> Self { Self::Upload(upload) }
}

impl From<Downloadable> for Transferable {
    fn from(download: Downloadable) -> Self { Self::Download(download) }
}

impl Transferable {
    fn item(&self) -> &TransferItem {
        match self {
            Self::Upload(upload) => &upload.item,
            Self::Download(download) => &download.item,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Upload(_) => Direction::Upload,
            Self::Download(_) => Direction::Download,
        }
    }

    pub fn oid(&self) -> &Oid { &self.item().oid }

    pub fn size(&self) -> u64 { self.item().size }

    /// Display name; empty for transfers addressed by identifier only.
    pub fn name(&self) -> &str { &self.item().name }

    /// The authorized resource, `None` until authorization succeeds.
    pub fn object(&self) -> Option<&ObjectResource> { self.item().object.get() }

    pub fn spec(&self) -> ObjectSpec {
        ObjectSpec {
            oid:  self.oid().clone(),
            size: self.size(),
        }
    }

    /// Authorize this object on its own.
    ///
    /// Queues authorize whole batches at once; this is for one-off transfers.
    /// Does nothing if the object is already authorized.
    pub async fn check<A: BatchAuthorizer>(&self, authorizer: &A) -> Result<()> {
        if self.object().is_some() {
            return Ok(());
        }
        let mut authorization = authorizer.authorize(self.direction(), &[self.spec()]).await?;
        match authorization.remove(self.oid()) {
            Some(Ok(resource)) => {
                self.set_object(resource);
                Ok(())
            }
            Some(Err(error)) => Err(TransferError::Object {
                code:    error.code,
                message: error.message,
            }),
            None => Err(TransferError::Object {
                code:    MISSING_OBJECT_CODE,
                message: "object missing from batch response".to_string(),
            }),
        }
    }

    /// Move the bytes. Returns the number of bytes transferred.
    ///
    /// Progress is reported after every chunk. Cancellation and authorization
    /// expiry are checked at chunk boundaries; a download that stops early
    /// leaves nothing in the store.
    pub async fn transfer<C: HttpClient>(&self, ctx: &TransferContext<C>) -> Result<u64> {
        match self {
            Self::Upload(upload) => upload.transfer(ctx).await,
            Self::Download(download) => download.transfer(ctx).await,
        }
    }

    /// Whether the granted actions require moving bytes.
    ///
    /// An upload without an `upload` action is already present remotely.
    pub fn needs_transfer(&self) -> bool {
        self.object()
            .is_some_and(|object| object.action(self.direction().as_str()).is_some())
    }

    /// Record the authorized resource. The first authorization wins.
    pub(crate) fn set_object(&self, resource: ObjectResource) -> bool {
        self.item().object.set(resource).is_ok()
    }

    /// A fresh, unauthorized copy for another authorization round.
    pub(crate) fn unauthorized(&self) -> Self {
        let mut copy = self.clone();
        let item = match &mut copy {
            Self::Upload(upload) => &mut upload.item,
            Self::Download(download) => &mut download.item,
        };
        item.object = OnceLock::new();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn oid_of(content: &[u8]) -> Oid {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.insert(content).unwrap().0
    }

    #[test]
    fn test_uploadable_from_stored_object() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("lfs")).unwrap();
        let (oid, size) = store.insert(&b"stored"[..]).unwrap();

        let upload = Uploadable::new(&store, dir.path(), oid.clone(), None).unwrap();
        assert_eq!(upload.path(), store.locate(&oid));

        let transferable = Transferable::from(upload);
        assert_eq!(transferable.size(), size);
        assert_eq!(transferable.name(), "");
        assert!(transferable.object().is_none());
        assert!(!transferable.needs_transfer());
    }

    #[test]
    fn test_uploadable_reconciles_working_file() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("lfs")).unwrap();
        std::fs::write(dir.path().join("video.mp4"), b"frames").unwrap();
        let oid = oid_of(b"frames");

        let upload = Uploadable::new(&store, dir.path(), oid.clone(), Some("video.mp4")).unwrap();
        assert!(store.exists(&oid));
        assert_eq!(Transferable::from(upload).name(), "video.mp4");
    }

    #[test]
    fn test_uploadable_fails_fast_on_mismatch() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("lfs")).unwrap();
        std::fs::write(dir.path().join("video.mp4"), b"re-encoded frames").unwrap();
        let oid = oid_of(b"frames");

        let err = Uploadable::new(&store, dir.path(), oid, Some("video.mp4")).unwrap_err();
        assert!(err.is_integrity());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_uploadable_missing_object() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let err = Uploadable::new(&store, dir.path(), oid_of(b"absent"), None).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Local {
                source: StoreError::NotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn test_object_is_set_once() {
        let oid = oid_of(b"remote");
        let download = Transferable::from(Downloadable::new(oid.clone(), 6, "remote.bin"));

        let first = ObjectResource::new(oid.clone(), 6)
            .with_action(DOWNLOAD_ACTION, Action::new("https://example.com/first"));
        let second = ObjectResource::new(oid.clone(), 6)
            .with_action(DOWNLOAD_ACTION, Action::new("https://example.com/second"));

        assert!(download.set_object(first));
        assert!(!download.set_object(second));
        assert_eq!(
            download.object().unwrap().action(DOWNLOAD_ACTION).unwrap().href,
            "https://example.com/first"
        );
        assert!(download.needs_transfer());

        let fresh = download.unauthorized();
        assert!(fresh.object().is_none());
        assert_eq!(fresh.oid(), &oid);
    }
}
