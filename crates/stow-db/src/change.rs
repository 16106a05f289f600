//! Staged writes.
//!
//! A [`Change`] wraps the write stream of an item that does not exist yet.
//! Bytes written to it land in the item's temporary artifact. The change ends
//! in exactly one of two terminal states:
//!
//! - **committed**: the stream was finalized and the committer published the
//!   artifact, returning the new [`Item`];
//! - **destroyed**: the stream failed (or the caller gave up) and the
//!   destroyer removed the temporary artifacts.
//!
//! The committer and destroyer are taken out of the change together the
//! moment either transition begins, so neither can ever run after the other
//! and neither can run twice.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use stow_adapter::ByteWriter;
use stow_types::ItemId;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::item::Item;

type Committer = Box<dyn FnOnce() -> BoxFuture<'static, DbResult<Item>> + Send>;
type Destroyer = Box<dyn FnOnce() -> BoxFuture<'static, DbResult<()>> + Send>;

struct Handlers {
    committer: Committer,
    destroyer: Destroyer,
}

/// Lifecycle of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    /// Accepting writes.
    Open,
    /// The stream is being (or has been) shut down; no more writes.
    Finalizing,
    Committed,
    Destroyed,
}

impl ChangeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Destroyed)
    }
}

/// An in-flight write of a new item.
///
/// Write to it through [`AsyncWriteExt`], then call [`commit`](Self::commit).
/// Shutting the change down first is optional; `commit` finalizes the stream
/// if the caller has not.
///
/// If the underlying stream fails while writing, the change is destroyed on
/// the spot: the destroyer is spawned on the current tokio runtime and any
/// later `commit` fails with [`DbError::InvalidState`].
///
/// Dropping an open change runs neither handler; its temporary artifacts
/// stay in storage.
pub struct Change {
    id: ItemId,
    writer: ByteWriter,
    handlers: Option<Handlers>,
    state: ChangeState,
    finished: bool,
}

impl Change {
    pub fn new<C, CF, D, DF>(id: ItemId, writer: ByteWriter, committer: C, destroyer: D) -> Self
    where
        C: FnOnce() -> CF + Send + 'static,
        CF: Future<Output = DbResult<Item>> + Send + 'static,
        D: FnOnce() -> DF + Send + 'static,
        DF: Future<Output = DbResult<()>> + Send + 'static,
    {
        Self {
            id,
            writer,
            handlers: Some(Handlers {
                committer: Box::new(move || committer().boxed()),
                destroyer: Box::new(move || destroyer().boxed()),
            }),
            state: ChangeState::Open,
            finished: false,
        }
    }

    /// The id the item will be published under.
    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn state(&self) -> ChangeState {
        self.state
    }

    /// Finalize the stream and publish the item.
    ///
    /// Fails with [`DbError::InvalidState`] if the change was already
    /// committed or destroyed. If finalizing the stream fails, the change is
    /// destroyed and the stream's error is returned; a failure of that
    /// cleanup is logged, not returned. Once finalization succeeds the change
    /// counts as committed even if the committer itself fails.
    pub async fn commit(&mut self) -> DbResult<Item> {
        let handlers = self.take_handlers()?;

        if !self.finished {
            self.state = ChangeState::Finalizing;
            if let Err(err) = self.writer.shutdown().await {
                self.state = ChangeState::Destroyed;
                warn!(id = %self.id, error = %err, "finalizing change failed, destroying");
                if let Err(cleanup) = (handlers.destroyer)().await {
                    warn!(id = %self.id, error = %cleanup, "cleanup after failed commit failed");
                }
                return Err(DbError::Io(err));
            }
            self.finished = true;
        }

        self.state = ChangeState::Committed;
        let item = (handlers.committer)().await?;
        info!(id = %self.id, "change committed");
        Ok(item)
    }

    /// Abandon the change and remove its temporary artifacts.
    ///
    /// Fails with [`DbError::InvalidState`] if the change was already
    /// committed or destroyed.
    pub async fn destroy(&mut self) -> DbResult<()> {
        let handlers = self.take_handlers()?;
        self.state = ChangeState::Destroyed;

        if !self.finished {
            if let Err(err) = self.writer.shutdown().await {
                debug!(id = %self.id, error = %err, "closing abandoned stream failed");
            }
            self.finished = true;
        }

        (handlers.destroyer)().await?;
        info!(id = %self.id, "change destroyed");
        Ok(())
    }

    fn take_handlers(&mut self) -> DbResult<Handlers> {
        match self.handlers.take() {
            Some(handlers) => Ok(handlers),
            None if self.state == ChangeState::Destroyed => {
                Err(DbError::InvalidState("change was destroyed"))
            }
            None => Err(DbError::InvalidState("change was already committed")),
        }
    }

    /// React to a stream error outside of `commit`: destroy the change once,
    /// in the background.
    fn fail(&mut self, err: &io::Error) {
        let Some(handlers) = self.handlers.take() else {
            return;
        };
        self.state = ChangeState::Destroyed;
        warn!(id = %self.id, error = %err, "write failed, destroying change");

        let id = self.id.clone();
        let cleanup = (handlers.destroyer)();
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = cleanup.await {
                        warn!(id = %id, error = %err, "cleanup of failed change failed");
                    }
                });
            }
            Err(_) => warn!(id = %id, "no runtime available, temporary artifacts left behind"),
        }
    }

    fn closed() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "change no longer accepts writes")
    }
}

impl AsyncWrite for Change {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.state != ChangeState::Open {
            return Poll::Ready(Err(Self::closed()));
        }
        let result = Pin::new(&mut this.writer).poll_write(cx, buf);
        if let Poll::Ready(Err(err)) = &result {
            this.fail(err);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.state.is_terminal() {
            return Poll::Ready(Err(Self::closed()));
        }
        let result = Pin::new(&mut this.writer).poll_flush(cx);
        if let Poll::Ready(Err(err)) = &result {
            this.fail(err);
        }
        result
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Ok(()));
        }
        if this.state.is_terminal() {
            return Poll::Ready(Err(Self::closed()));
        }
        this.state = ChangeState::Finalizing;
        let result = Pin::new(&mut this.writer).poll_shutdown(cx);
        match &result {
            Poll::Ready(Ok(())) => this.finished = true,
            Poll::Ready(Err(err)) => this.fail(err),
            Poll::Pending => {}
        }
        result
    }
}

impl std::fmt::Debug for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Change")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
