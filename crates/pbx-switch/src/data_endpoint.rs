//! `DataSource`/`DataConsumer`/`DataEndpoint`: the media graph (spec §3,
//! §4.4 "Forwarding semantics").
//!
//! A `DataSource` forwards blocks to every attached consumer synchronously,
//! in producer order, interposing a translator chain where formats differ
//! (§4.4 "Translator resolution" — see [`crate::translator`]). Topology
//! mutation (attach/detach/override/replace) is serialized by one shared
//! mutex across every endpoint, matching spec §3's `commonMutex` and §5's
//! "one shared mutex" note for data-endpoint topology.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SwitchError;
use crate::translator::TranslatorRegistry;

/// Per-block metadata flags (spec §4.4).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataFlags(u8);

impl DataFlags {
    pub const MARK: DataFlags = DataFlags(1 << 0);
    pub const SILENT: DataFlags = DataFlags(1 << 1);
    pub const MISSED: DataFlags = DataFlags(1 << 2);

    pub const fn empty() -> Self {
        DataFlags(0)
    }

    pub const fn contains(self, other: DataFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DataFlags {
    type Output = DataFlags;
    fn bitor(self, rhs: DataFlags) -> DataFlags {
        DataFlags(self.0 | rhs.0)
    }
}

/// A media sink. Implementors report the format they accept (`None` means
/// "any", used by sniffers) and return the number of bytes they consumed.
pub trait DataConsumer: Send + Sync {
    fn format(&self) -> Option<&str> {
        None
    }

    fn consume(&self, block: &[u8], ts: u32, flags: DataFlags) -> usize;
}

struct AttachedConsumer {
    sink: Arc<dyn DataConsumer>,
    /// The translator-wrapped consumer actually invoked by `forward`, or a
    /// clone of `sink` when no conversion was needed.
    effective: Arc<dyn DataConsumer>,
}

/// A media producer. Declares its own format and fans blocks out to every
/// attached consumer plus any sniffers.
pub struct DataSource {
    format: &'static str,
    consumers: RwLock<Vec<AttachedConsumer>>,
    sniffers: RwLock<Vec<Arc<dyn DataConsumer>>>,
}

impl DataSource {
    pub fn new(format: &'static str) -> Arc<Self> {
        Arc::new(Self {
            format,
            consumers: RwLock::new(Vec::new()),
            sniffers: RwLock::new(Vec::new()),
        })
    }

    pub fn format(&self) -> &'static str {
        self.format
    }

    /// Attaches `consumer`, inserting a translator chain from the
    /// registry if the consumer declares a different format. Fails with
    /// [`SwitchError::FormatMismatch`] if no conversion path exists.
    pub fn attach(
        self: &Arc<Self>,
        consumer: Arc<dyn DataConsumer>,
        registry: &TranslatorRegistry,
    ) -> Result<(), SwitchError> {
        let _guard = topology_lock().lock_guard();
        let effective = match consumer.format() {
            Some(dest) if dest != self.format => registry.resolve(self.format, dest, consumer.clone())?,
            _ => consumer.clone(),
        };
        self.consumers.write().push(AttachedConsumer { sink: consumer, effective });
        Ok(())
    }

    /// Detaches a previously attached consumer by pointer identity.
    pub fn detach(&self, consumer: &Arc<dyn DataConsumer>) {
        let _guard = topology_lock().lock_guard();
        self.consumers
            .write()
            .retain(|c| !Arc::ptr_eq(&c.sink, consumer));
    }

    pub fn add_sniffer(&self, sniffer: Arc<dyn DataConsumer>) {
        let _guard = topology_lock().lock_guard();
        self.sniffers.write().push(sniffer);
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.read().len()
    }

    /// Pushes `block` to every attached consumer (through its translator
    /// chain, if any) and every sniffer, in attach order. Returns
    /// `block.len()` if at least one consumer or sniffer is attached,
    /// else `0` (spec §8 invariant: a source with no consumers accepts
    /// `Forward` and reports zero bytes consumed).
    pub fn forward(&self, block: &[u8], ts: u32, flags: DataFlags) -> usize {
        let consumers = self.consumers.read();
        let sniffers = self.sniffers.read();
        if consumers.is_empty() && sniffers.is_empty() {
            return 0;
        }
        for attached in consumers.iter() {
            attached.effective.consume(block, ts, flags);
        }
        for sniffer in sniffers.iter() {
            sniffer.consume(block, ts, flags);
        }
        block.len()
    }
}

static TOPOLOGY_LOCK: std::sync::OnceLock<pbx_core::mutex::Mutex> = std::sync::OnceLock::new();

fn topology_lock() -> &'static pbx_core::mutex::Mutex {
    TOPOLOGY_LOCK.get_or_init(pbx_core::mutex::Mutex::new)
}

/// Per-media wiring node between a source and a consumer (spec §3
/// "DataEndpoint"). Holds at most one source and one consumer, an optional
/// override source, an optional replace source, and zero or more sniffers.
pub struct DataEndpoint {
    media: String,
    source: RwLock<Option<Arc<DataSource>>>,
    consumer: RwLock<Option<Arc<dyn DataConsumer>>>,
    override_source: RwLock<Option<Arc<DataSource>>>,
    replace_source: RwLock<Option<Arc<DataSource>>>,
}

impl DataEndpoint {
    pub fn new(media: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            media: media.into(),
            source: RwLock::new(None),
            consumer: RwLock::new(None),
            override_source: RwLock::new(None),
            replace_source: RwLock::new(None),
        })
    }

    pub fn media(&self) -> &str {
        &self.media
    }

    pub fn source(&self) -> Option<Arc<DataSource>> {
        self.source.read().clone()
    }

    pub fn consumer(&self) -> Option<Arc<dyn DataConsumer>> {
        self.consumer.read().clone()
    }

    /// Replaces the current source. The replaced source is detached from
    /// this endpoint's consumer (spec §4.4 `DataEndpoint::setSource`); the
    /// caller is responsible for re-attaching the consumer to the new
    /// source (via [`wire`]) since that may require a fresh translator
    /// chain.
    pub fn set_source(&self, new_source: Option<Arc<DataSource>>) -> Option<Arc<DataSource>> {
        let _guard = topology_lock().lock_guard();
        let old = self.source.write().take();
        if let (Some(old), Some(consumer)) = (&old, self.consumer.read().as_ref()) {
            old.detach(consumer);
        }
        *self.source.write() = new_source;
        old
    }

    pub fn set_consumer(&self, consumer: Option<Arc<dyn DataConsumer>>) {
        let _guard = topology_lock().lock_guard();
        *self.consumer.write() = consumer;
    }

    /// Overrides the peer's source for the local consumer — an override
    /// source supersedes whatever the peer would otherwise deliver.
    pub fn set_override_source(&self, source: Option<Arc<DataSource>>) {
        *self.override_source.write() = source;
    }

    pub fn override_source(&self) -> Option<Arc<DataSource>> {
        self.override_source.read().clone()
    }

    /// A replace source delivers to the *peer's* consumer instead of to
    /// this endpoint's own consumer.
    pub fn set_replace_source(&self, source: Option<Arc<DataSource>>) {
        *self.replace_source.write() = source;
    }

    pub fn replace_source(&self) -> Option<Arc<DataSource>> {
        self.replace_source.read().clone()
    }
}

/// Wires `from`'s effective source (override, if present, else its own
/// source) to `to`'s consumer, building a translator chain as needed.
pub fn wire(from: &DataEndpoint, to: &DataEndpoint, registry: &TranslatorRegistry) -> Result<(), SwitchError> {
    let source = from
        .override_source()
        .or_else(|| from.source())
        .or_else(|| from.replace_source());
    let (Some(source), Some(consumer)) = (source, to.consumer()) else {
        return Ok(());
    };
    source.attach(consumer, registry)
}
