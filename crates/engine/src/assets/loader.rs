use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::signal::{ListenerError, Signal};

use super::handle::{AssetHandle, LoadKind};
use super::source::{AssetError, AssetSource};

/// Priority for listeners that consume a settled load.
///
/// Managers cache results at the default priority, so consumers registered here always observe
/// the cache already populated.
pub const SETTLE_PRIORITY: i32 = 45;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadFailure {
    pub url: String,
    pub kind: LoadKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LoadRequest {
    url: String,
    kind: LoadKind,
}

/// One fetch of one asset. Settles exactly once, through `on_complete` or `on_fail`.
pub struct AssetLoader {
    label: String,
    request: RefCell<Option<LoadRequest>>,
    settled: Cell<bool>,
    pub on_complete: Signal<AssetHandle>,
    pub on_fail: Signal<LoadFailure>,
}

impl fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetLoader")
            .field("label", &self.label)
            .field("request", &self.request.borrow())
            .field("settled", &self.settled.get())
            .finish()
    }
}

impl AssetLoader {
    pub fn new(label: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            label: label.into(),
            request: RefCell::new(None),
            settled: Cell::new(false),
            on_complete: Signal::new(),
            on_fail: Signal::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> Option<String> {
        self.request.borrow().as_ref().map(|request| request.url.clone())
    }

    pub fn kind(&self) -> Option<LoadKind> {
        self.request.borrow().as_ref().map(|request| request.kind)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    /// Starts the fetch. Completion is delivered on a later [`LoadQueue::pump`].
    ///
    /// Returns `false` without queueing anything when this loader was already started.
    pub fn load(self: &Rc<Self>, queue: &LoadQueue, url: &str, kind: LoadKind) -> bool {
        {
            let mut request = self.request.borrow_mut();
            if let Some(existing) = request.as_ref() {
                warn!(
                    label = %self.label,
                    url = %existing.url,
                    "asset_loader_already_started"
                );
                return false;
            }
            *request = Some(LoadRequest {
                url: url.to_string(),
                kind,
            });
        }
        debug!(label = %self.label, url, kind = ?kind, "asset_load_started");
        queue.enqueue(Rc::clone(self));
        true
    }

    fn settle(&self, source: &dyn AssetSource) -> Result<bool, ListenerError> {
        let Some(request) = self.request.borrow().clone() else {
            return Ok(false);
        };
        if self.settled.replace(true) {
            return Ok(false);
        }

        match fetch(source, &request) {
            Ok(handle) => {
                debug!(label = %self.label, url = %request.url, kind = ?request.kind, "asset_load_completed");
                self.on_complete.dispatch_with(handle)?;
                Ok(true)
            }
            Err(error) => {
                warn!(
                    label = %self.label,
                    url = %request.url,
                    kind = ?request.kind,
                    error = %error,
                    "asset_load_failed"
                );
                self.on_fail.dispatch_with(LoadFailure {
                    url: request.url,
                    kind: request.kind,
                    reason: error.to_string(),
                })?;
                Ok(false)
            }
        }
    }
}

fn fetch(source: &dyn AssetSource, request: &LoadRequest) -> Result<AssetHandle, AssetError> {
    let url = request.url.as_str();
    Ok(match request.kind {
        LoadKind::Misc => AssetHandle::Text(Rc::from(source.fetch_text(url)?)),
        LoadKind::Json => AssetHandle::Json(Rc::new(source.fetch_json(url)?)),
        LoadKind::Image => AssetHandle::Image(Rc::new(source.fetch_image(url)?)),
        LoadKind::SpriteSheet => AssetHandle::SpriteSheet(Rc::new(source.fetch_atlas(url)?)),
        LoadKind::Audio => AssetHandle::Sound(Rc::new(source.fetch_sound(url)?)),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub completed: usize,
    pub failed: usize,
}

impl PumpReport {
    pub fn settled(&self) -> usize {
        self.completed + self.failed
    }

    fn absorb(&mut self, other: PumpReport) {
        self.completed += other.completed;
        self.failed += other.failed;
    }
}

#[derive(Debug, Default)]
struct LoadQueueInner {
    pending: RefCell<VecDeque<Rc<AssetLoader>>>,
    failed_total: Cell<usize>,
}

/// Turn queue for in-flight fetches.
///
/// Each [`pump`](LoadQueue::pump) settles the loads that were queued before it began. Loads
/// started by listeners during a pump wait for the next one, which keeps completion strictly
/// after the call that requested it.
#[derive(Debug, Clone, Default)]
pub struct LoadQueue {
    inner: Rc<LoadQueueInner>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.pending.borrow().is_empty()
    }

    /// Failed loads since this queue was created.
    pub fn failed_total(&self) -> usize {
        self.inner.failed_total.get()
    }

    fn enqueue(&self, loader: Rc<AssetLoader>) {
        self.inner.pending.borrow_mut().push_back(loader);
    }

    pub fn pump(&self, source: &dyn AssetSource) -> Result<PumpReport, ListenerError> {
        let batch: Vec<Rc<AssetLoader>> = self.inner.pending.borrow_mut().drain(..).collect();
        let mut report = PumpReport::default();
        let mut batch = batch.into_iter();

        while let Some(loader) = batch.next() {
            match loader.settle(source) {
                Ok(true) => report.completed += 1,
                Ok(false) => {
                    report.failed += 1;
                    self.inner.failed_total.set(self.inner.failed_total.get() + 1);
                }
                Err(error) => {
                    // Untouched loads keep their place ahead of anything queued meanwhile.
                    let mut pending = self.inner.pending.borrow_mut();
                    for rest in batch.rev() {
                        pending.push_front(rest);
                    }
                    return Err(error);
                }
            }
        }

        Ok(report)
    }

    /// Pumps until no loads remain or `max_turns` pumps have run.
    pub fn run_until_idle(
        &self,
        source: &dyn AssetSource,
        max_turns: usize,
    ) -> Result<PumpReport, ListenerError> {
        let mut total = PumpReport::default();
        for _ in 0..max_turns {
            if self.is_idle() {
                break;
            }
            total.absorb(self.pump(source)?);
        }
        Ok(total)
    }
}
