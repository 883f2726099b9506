//! Integrity checks: single-block digest verification and full-chain audits.

use crate::block::Block;
use crate::digest::EMPTY_DIGEST;
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of recomputing a block's digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    Intact,
    Tampered,
}

impl Integrity {
    pub fn is_intact(self) -> bool {
        self == Integrity::Intact
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Integrity::Intact => f.write_str("intact"),
            Integrity::Tampered => f.write_str("TAMPERED"),
        }
    }
}

/// Recompute `block`'s digest and compare it with the stored one.
///
/// Linkage to the previous block is not checked here; see [`audit_chain`].
pub fn verify_block(block: &Block) -> Integrity {
    compare_digest(block, &block.compute_digest())
}

fn compare_digest(block: &Block, recomputed: &str) -> Integrity {
    if recomputed == block.digest {
        Integrity::Intact
    } else {
        Integrity::Tampered
    }
}

/// How a block's `previous_hash` relates to the block before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLink {
    /// First block, carrying the empty sentinel.
    Genesis,
    /// `previous_hash` equals the stored digest of the preceding block.
    Linked { previous_position: u64 },
    /// `previous_hash` disagrees with the preceding block.
    Broken { expected: String, found: String },
}

/// Classify `block`'s linkage given the block stored before it.
pub fn chain_link(block: &Block, previous: Option<&Block>) -> ChainLink {
    match previous {
        None if block.previous_digest == EMPTY_DIGEST => ChainLink::Genesis,
        None => ChainLink::Broken {
            expected: EMPTY_DIGEST.to_string(),
            found: block.previous_digest.clone(),
        },
        Some(prev) if prev.digest == block.previous_digest => ChainLink::Linked {
            previous_position: prev.sequence_position,
        },
        Some(prev) => ChainLink::Broken {
            expected: prev.digest.clone(),
            found: block.previous_digest.clone(),
        },
    }
}

/// Everything a caller needs to present a verification result.
///
/// The block is included even when tampered so its data can still be shown.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub block: Block,
    pub integrity: Integrity,
    pub recomputed_digest: String,
    pub link: ChainLink,
}

impl VerificationReport {
    pub fn new(block: &Block, previous: Option<&Block>) -> Self {
        let recomputed_digest = block.compute_digest();
        let integrity = compare_digest(block, &recomputed_digest);
        Self {
            block: block.clone(),
            integrity,
            recomputed_digest,
            link: chain_link(block, previous),
        }
    }
}

/// A single problem found by [`audit_chain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditIssue {
    DigestMismatch {
        position: u64,
        stored: String,
        recomputed: String,
    },
    BrokenLink {
        position: u64,
        expected: String,
        found: String,
    },
    PositionGap {
        expected: u64,
        found: u64,
    },
    DuplicatePublicId {
        id: String,
        positions: Vec<u64>,
    },
}

impl fmt::Display for AuditIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditIssue::DigestMismatch {
                position,
                stored,
                recomputed,
            } => write!(
                f,
                "block {}: digest mismatch (stored {}, recomputed {})",
                position, stored, recomputed
            ),
            AuditIssue::BrokenLink {
                position,
                expected,
                found,
            } => write!(
                f,
                "block {}: previous_hash {:?} does not match {:?}",
                position, found, expected
            ),
            AuditIssue::PositionGap { expected, found } => {
                write!(f, "position {} found where {} was expected", found, expected)
            }
            AuditIssue::DuplicatePublicId { id, positions } => {
                write!(f, "public id {} shared by blocks {:?}", id, positions)
            }
        }
    }
}

/// Result of a full-chain audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainAudit {
    pub blocks_checked: usize,
    pub issues: Vec<AuditIssue>,
}

impl ChainAudit {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ChainAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Blocks checked: {}", self.blocks_checked)?;
        if self.is_clean() {
            writeln!(f, "Chain intact")?;
        } else {
            writeln!(f, "Issues found:   {}", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  {}", issue)?;
            }
        }
        Ok(())
    }
}

/// Recompute every digest and check sequential linkage, contiguous positions
/// and public id uniqueness across the whole ledger.
pub fn audit_chain(blocks: &[Block]) -> ChainAudit {
    let mut issues = Vec::new();
    let mut ids: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    let mut previous: Option<&Block> = None;

    for (i, block) in blocks.iter().enumerate() {
        let expected_position = i as u64 + 1;
        if block.sequence_position != expected_position {
            issues.push(AuditIssue::PositionGap {
                expected: expected_position,
                found: block.sequence_position,
            });
        }

        let recomputed = block.compute_digest();
        if recomputed != block.digest {
            issues.push(AuditIssue::DigestMismatch {
                position: block.sequence_position,
                stored: block.digest.clone(),
                recomputed,
            });
        }

        if let ChainLink::Broken { expected, found } = chain_link(block, previous) {
            issues.push(AuditIssue::BrokenLink {
                position: block.sequence_position,
                expected,
                found,
            });
        }

        if let Some(id) = &block.public_id {
            ids.entry(id.as_str())
                .or_default()
                .push(block.sequence_position);
        }
        previous = Some(block);
    }

    for (id, positions) in ids {
        if positions.len() > 1 {
            issues.push(AuditIssue::DuplicatePublicId {
                id: id.to_string(),
                positions,
            });
        }
    }

    ChainAudit {
        blocks_checked: blocks.len(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Payload;
    use crate::identifier::PublicId;
    use serde_json::json;

    fn chain(n: u64) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        for pos in 1..=n {
            let mut p = Payload::new();
            p.insert("owner_name".into(), json!(format!("owner {}", pos)));
            let prev = blocks.last().map(|b| b.digest.clone()).unwrap_or_default();
            let id = PublicId::parse(&format!("{}", 100_000_000_000u64 + pos)).unwrap();
            blocks.push(Block::create(pos, p, prev, Some(id)));
        }
        blocks
    }

    #[test]
    fn intact_block_verifies_twice() {
        let blocks = chain(1);
        assert_eq!(verify_block(&blocks[0]), Integrity::Intact);
        assert_eq!(verify_block(&blocks[0]), Integrity::Intact);
    }

    #[test]
    fn tampered_payload_detected() {
        let mut blocks = chain(2);
        blocks[1].payload.insert("owner_name".into(), json!("mallory"));
        assert_eq!(verify_block(&blocks[1]), Integrity::Tampered);
    }

    #[test]
    fn report_carries_link_context() {
        let blocks = chain(2);
        let genesis = VerificationReport::new(&blocks[0], None);
        assert_eq!(genesis.link, ChainLink::Genesis);
        let second = VerificationReport::new(&blocks[1], Some(&blocks[0]));
        assert_eq!(second.link, ChainLink::Linked { previous_position: 1 });
        assert!(second.integrity.is_intact());
    }

    #[test]
    fn tampered_report_still_has_data() {
        let mut blocks = chain(1);
        blocks[0].payload.insert("owner_name".into(), json!("mallory"));
        let report = VerificationReport::new(&blocks[0], None);
        assert_eq!(report.integrity, Integrity::Tampered);
        assert_eq!(report.block.payload_str("owner_name"), Some("mallory"));
        assert_ne!(report.recomputed_digest, report.block.digest);
    }

    #[test]
    fn report_agrees_with_verify_block() {
        let mut blocks = chain(2);
        blocks[1].created_at.push('0');
        for (i, block) in blocks.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| &blocks[p]);
            let report = VerificationReport::new(block, previous);
            assert_eq!(report.integrity, verify_block(block));
            assert_eq!(report.recomputed_digest, block.compute_digest());
        }
        assert!(VerificationReport::new(&blocks[0], None).integrity.is_intact());
        assert!(!VerificationReport::new(&blocks[1], Some(&blocks[0]))
            .integrity
            .is_intact());
    }

    #[test]
    fn clean_chain_audits_clean() {
        let audit = audit_chain(&chain(5));
        assert!(audit.is_clean(), "{}", audit);
        assert_eq!(audit.blocks_checked, 5);
    }

    #[test]
    fn rehashed_forgery_breaks_next_link() {
        // Tamper and re-seal block 2: its own digest checks out, block 3's link does not.
        let mut blocks = chain(3);
        blocks[1].payload.insert("owner_name".into(), json!("mallory"));
        blocks[1].digest = blocks[1].compute_digest();
        assert_eq!(verify_block(&blocks[1]), Integrity::Intact);

        let audit = audit_chain(&blocks);
        assert_eq!(audit.issues.len(), 1);
        assert!(matches!(
            audit.issues[0],
            AuditIssue::BrokenLink { position: 3, .. }
        ));
    }

    #[test]
    fn detects_gaps_and_duplicate_ids() {
        let mut blocks = chain(3);
        blocks.remove(1);
        blocks[1].public_id = blocks[0].public_id.clone();
        let audit = audit_chain(&blocks);
        assert!(audit
            .issues
            .iter()
            .any(|i| matches!(i, AuditIssue::PositionGap { expected: 2, found: 3 })));
        assert!(audit
            .issues
            .iter()
            .any(|i| matches!(i, AuditIssue::DuplicatePublicId { .. })));
        assert!(audit
            .issues
            .iter()
            .any(|i| matches!(i, AuditIssue::BrokenLink { position: 3, .. })));
    }

    #[test]
    fn genesis_with_nonempty_previous_is_broken() {
        let mut blocks = chain(1);
        blocks[0].previous_digest = "ff".into();
        blocks[0].digest = blocks[0].compute_digest();
        let audit = audit_chain(&blocks);
        assert_eq!(audit.issues.len(), 1);
        assert!(matches!(
            audit.issues[0],
            AuditIssue::BrokenLink { position: 1, .. }
        ));
    }
}
