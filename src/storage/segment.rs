use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Document;
use crate::index::fields::document_terms;
use crate::index::posting::{Posting, PostingList};
use crate::storage::layout::StorageLayout;

/// Unique segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        SegmentId(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable index segment: stored documents plus an inverted index over them.
///
/// Document numbers are positions in `documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub documents: Vec<Document>,
    pub fields: BTreeMap<String, BTreeMap<String, PostingList>>,
    pub metadata: SegmentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip)]
    pub size_bytes: u64,  // Size of the segment file, known once written or loaded
}

/// Segment file header
#[derive(Debug, Clone, Copy)]
pub struct SegmentHeader {
    pub version: u32,     // Format version
    pub checksum: u32,    // CRC32 of the compressed payload
}

impl SegmentHeader {
    pub const MAGIC: &'static [u8; 4] = b"CMSG";
    pub const VERSION: u32 = 1;
    pub const SIZE: usize = 12;

    fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(Self::MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
            return Err(Error::new(ErrorKind::Corrupted, "not a segment file"));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(word);
        word.copy_from_slice(&bytes[8..12]);
        let checksum = u32::from_le_bytes(word);
        Ok(SegmentHeader { version, checksum })
    }
}

impl Segment {
    /// Indexes `documents` into a new in-memory segment.
    pub fn build(documents: Vec<Document>) -> Self {
        let mut fields: BTreeMap<String, BTreeMap<String, PostingList>> = BTreeMap::new();

        for (doc, document) in documents.iter().enumerate() {
            for (field, terms) in document_terms(document) {
                let postings = fields.entry(field).or_default();
                for (term, positions) in terms {
                    postings.entry(term).or_default().add_posting(Posting {
                        doc: doc as u32,
                        term_freq: positions.len().max(1) as u32,
                        positions,
                    });
                }
            }
        }

        let now = Utc::now();
        Segment {
            id: SegmentId::new(),
            documents,
            fields,
            metadata: SegmentMetadata {
                created_at: now,
                last_modified: now,
                size_bytes: 0,
            },
        }
    }

    pub fn doc_count(&self) -> u32 {
        self.documents.len() as u32
    }

    pub fn postings(&self, field: &str, term: &str) -> Option<&PostingList> {
        self.fields.get(field).and_then(|terms| terms.get(term))
    }

    pub fn terms(&self, field: &str) -> Option<&BTreeMap<String, PostingList>> {
        self.fields.get(field)
    }

    /// Writes the segment file and records its size. The file is synced before returning.
    pub fn write(&mut self, layout: &StorageLayout) -> Result<()> {
        let payload = bincode::serialize(&*self)?;
        let compressed = lz4_flex::compress_prepend_size(&payload);
        let header = SegmentHeader {
            version: SegmentHeader::VERSION,
            checksum: crc32fast::hash(&compressed),
        };

        let path = layout.segment_path(&self.id);
        let mut file = fs::File::create(&path)?;
        file.write_all(&header.encode())?;
        file.write_all(&compressed)?;
        file.sync_all()?;

        self.metadata.size_bytes = (SegmentHeader::SIZE + compressed.len()) as u64;
        Ok(())
    }

    pub fn load(layout: &StorageLayout, id: &SegmentId) -> Result<Self> {
        let path = layout.segment_path(id);
        let bytes = fs::read(&path)?;
        let header = SegmentHeader::decode(&bytes)?;

        if header.version != SegmentHeader::VERSION {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!("segment {} has unsupported version {}", id.0, header.version),
            ));
        }

        let compressed = &bytes[SegmentHeader::SIZE..];
        if crc32fast::hash(compressed) != header.checksum {
            return Err(Error::new(
                ErrorKind::Corrupted,
                format!("checksum mismatch in segment {}", id.0),
            ));
        }

        let payload = lz4_flex::decompress_size_prepended(compressed).map_err(|e| {
            Error::new(ErrorKind::Corrupted, format!("segment {}: {}", id.0, e))
        })?;
        let mut segment: Segment = bincode::deserialize(&payload)?;
        segment.metadata.size_bytes = bytes.len() as u64;
        Ok(segment)
    }
}
