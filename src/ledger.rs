use crate::block::{Block, Payload};
use crate::config::LedgerConfig;
use crate::digest::EMPTY_DIGEST;
use crate::error::{LedgerError, Result};
use crate::identifier::{CollisionPolicy, IdAllocator, PublicId, RecordRef};
use crate::record::{BlockSummary, DocumentRecord, RECORD_TYPE_KEY};
use crate::storage::{FileStore, Store};
use crate::verify::{audit_chain, ChainAudit, ChainLink, VerificationReport};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The document ledger: an append-only, hash-chained sequence of blocks.
///
/// The whole sequence is held in memory and written back in full after each
/// append. Construct one per process and reuse it.
pub struct Ledger<S: Store = FileStore> {
    blocks: Vec<Block>,
    store: S,
    allocator: IdAllocator,
    collision_policy: CollisionPolicy,
}

impl Ledger<FileStore> {
    /// Open the ledger file named by `config`, or start empty if it does not exist.
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let store = FileStore::new(&config.path, config.lock_timeout);
        Self::with_store(store, config.collision_policy)
    }
}

impl<S: Store> Ledger<S> {
    pub fn with_store(store: S, collision_policy: CollisionPolicy) -> Result<Self> {
        let blocks = store.load()?;
        info!(
            location = %store.location(),
            blocks = blocks.len(),
            "ledger opened"
        );
        Ok(Self {
            blocks,
            store,
            allocator: IdAllocator::new(),
            collision_policy,
        })
    }

    /// Replace the id source (for reproducible ids in tests).
    pub fn with_allocator(mut self, allocator: IdAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Append `payload` as a new block chained to the current tail and persist.
    ///
    /// Under the store lock the persisted tail is compared with the one this
    /// ledger last saw. If another writer got there first, the persisted state
    /// is adopted and `ConcurrentModification` returned; retrying then chains
    /// onto the real tail.
    pub fn append(&mut self, payload: Payload) -> Result<PublicId> {
        let _lock = self.store.lock()?;

        let persisted = self.store.load()?;
        let expected = self.tail_digest().to_string();
        let found = persisted
            .last()
            .map(|b| b.digest.clone())
            .unwrap_or_default();
        if persisted.len() != self.blocks.len() || found != expected {
            warn!(
                expected_len = self.blocks.len(),
                found_len = persisted.len(),
                "ledger modified by another writer"
            );
            self.blocks = persisted;
            return Err(LedgerError::ConcurrentModification { expected, found });
        }

        let blocks = &self.blocks;
        let public_id = self.allocator.allocate_with(self.collision_policy, |id| {
            blocks.iter().any(|b| b.public_id.as_ref() == Some(id))
        })?;

        let position = self.blocks.len() as u64 + 1;
        let block = Block::create(position, payload, expected, Some(public_id.clone()));
        self.blocks.push(block);
        if let Err(e) = self.store.save(&self.blocks) {
            self.blocks.pop();
            return Err(e);
        }

        info!(position, id = %public_id, "block appended");
        Ok(public_id)
    }

    /// Validate a document registration, then append its payload.
    pub fn register(&mut self, record: &DocumentRecord) -> Result<PublicId> {
        record.validate()?;
        self.append(record.to_payload())
    }

    /// Discard in-memory state and re-read the store.
    pub fn reload(&mut self) -> Result<()> {
        self.blocks = self.store.load()?;
        debug!(blocks = self.blocks.len(), "ledger reloaded");
        Ok(())
    }

    // ── Lookup ────────────────────────────────────────────────

    pub fn find_by_id(&self, id: &PublicId) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| b.public_id.as_ref() == Some(id))
    }

    /// Legacy lookup by 1-based position.
    pub fn find_by_position(&self, position: u64) -> Option<&Block> {
        self.blocks
            .iter()
            .find(|b| b.sequence_position == position)
    }

    pub fn find(&self, key: &RecordRef) -> Option<&Block> {
        match key {
            RecordRef::Public(id) => self.find_by_id(id),
            RecordRef::Position(pos) => self.find_by_position(*pos),
        }
    }

    /// Look up user input as a public id. Format is checked before any scan.
    pub fn lookup(&self, input: &str) -> Result<&Block> {
        let id = PublicId::parse(input)?;
        self.find_by_id(&id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    /// Condensed views of every block, in ledger order. Restart by calling again.
    pub fn list_all(&self) -> impl Iterator<Item = BlockSummary> + '_ {
        self.blocks.iter().map(BlockSummary::from_block)
    }

    /// Blocks whose payload `record_type` equals `record_type`, in ledger order.
    pub fn filter_by_type<'a>(
        &'a self,
        record_type: &'a str,
    ) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks
            .iter()
            .filter(move |b| b.payload_str(RECORD_TYPE_KEY) == Some(record_type))
    }

    // ── Verification ──────────────────────────────────────────

    /// Find the block for a user-supplied public id and check its integrity.
    pub fn verify(&self, input: &str) -> Result<VerificationReport> {
        let id = PublicId::parse(input)?;
        self.verify_ref(&RecordRef::Public(id))
    }

    pub fn verify_ref(&self, key: &RecordRef) -> Result<VerificationReport> {
        let index = self
            .blocks
            .iter()
            .position(|b| match key {
                RecordRef::Public(id) => b.public_id.as_ref() == Some(id),
                RecordRef::Position(pos) => b.sequence_position == *pos,
            })
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))?;

        let previous = index.checked_sub(1).map(|i| &self.blocks[i]);
        let report = VerificationReport::new(&self.blocks[index], previous);
        if !report.integrity.is_intact() {
            warn!(record = %key, "digest mismatch, record has been altered");
        }
        if let ChainLink::Broken { .. } = report.link {
            warn!(record = %key, "previous_hash does not match preceding block");
        }
        Ok(report)
    }

    /// Recompute every block and check the whole chain.
    pub fn audit(&self) -> ChainAudit {
        let audit = audit_chain(&self.blocks);
        if !audit.is_clean() {
            warn!(issues = audit.issues.len(), "chain audit found problems");
        }
        audit
    }

    // ── Stats ─────────────────────────────────────────────────

    pub fn stats(&self) -> LedgerStats {
        let mut by_type = BTreeMap::new();
        for block in &self.blocks {
            let tag = block
                .payload_str(RECORD_TYPE_KEY)
                .unwrap_or("(untyped)")
                .to_string();
            *by_type.entry(tag).or_insert(0) += 1;
        }
        LedgerStats {
            block_count: self.blocks.len(),
            legacy_blocks: self.blocks.iter().filter(|b| b.public_id.is_none()).count(),
            by_type,
            tail_digest: self.tail().map(|b| b.digest.clone()),
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn tail(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Digest the next block will link to.
    pub fn tail_digest(&self) -> &str {
        self.tail().map(|b| b.digest.as_str()).unwrap_or(EMPTY_DIGEST)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Ledger statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub block_count: usize,
    /// Blocks written before public ids existed.
    pub legacy_blocks: usize,
    pub by_type: BTreeMap<String, usize>,
    pub tail_digest: Option<String>,
}

impl std::fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Blocks:   {}", self.block_count)?;
        writeln!(f, "Legacy:   {}", self.legacy_blocks)?;
        writeln!(
            f,
            "Tail:     {}",
            self.tail_digest.as_deref().unwrap_or("(empty)")
        )?;
        for (tag, count) in &self.by_type {
            writeln!(f, "  {:<24} {}", tag, count)?;
        }
        Ok(())
    }
}
