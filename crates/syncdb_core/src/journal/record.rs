//! Journal log record types and framing.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use serde::{Deserialize, Serialize};
use syncdb_protocol::{Fields, Timestamp};

/// Magic bytes identifying a journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"SJNL";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// Frame header size: magic (4) + version (2) + type (1) + length (4).
pub const HEADER_SIZE: usize = 11;

/// Frame trailer size (CRC32).
pub const CRC_SIZE: usize = 4;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JournalRecordType {
    /// Begin a transaction.
    Begin = 1,
    /// Upsert a row and its journal entry.
    Put = 2,
    /// Remove a row and leave a tombstone journal entry.
    Delete = 3,
    /// Drop every row and journal entry.
    Reset = 4,
    /// Commit a transaction.
    Commit = 5,
}

impl JournalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Reset),
            5 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Returns the record type name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Reset => "RESET",
            Self::Commit => "COMMIT",
        }
    }
}

/// A record in the journal log.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalRecord {
    /// Begin a transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Upsert a row.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Record id.
        id: String,
        /// Journal timestamp.
        last_modified: Timestamp,
        /// Row fields.
        fields: Fields,
    },

    /// Delete a row.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Record id.
        id: String,
        /// Journal timestamp of the tombstone.
        last_modified: Timestamp,
    },

    /// Clear the collection; later records in the transaction rebuild it.
    Reset {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
    },
}

#[derive(Serialize, Deserialize)]
struct TxPayload {
    txid: u64,
}

#[derive(Serialize, Deserialize)]
struct PutPayload {
    txid: u64,
    id: String,
    ts: u64,
    fields: Fields,
}

#[derive(Serialize, Deserialize)]
struct DeletePayload {
    txid: u64,
    id: String,
    ts: u64,
}

impl JournalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> JournalRecordType {
        match self {
            Self::Begin { .. } => JournalRecordType::Begin,
            Self::Put { .. } => JournalRecordType::Put,
            Self::Delete { .. } => JournalRecordType::Delete,
            Self::Reset { .. } => JournalRecordType::Reset,
            Self::Commit { .. } => JournalRecordType::Commit,
        }
    }

    /// Returns the transaction this record belongs to.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Reset { txid }
            | Self::Commit { txid } => *txid,
        }
    }

    /// Serializes the record payload (without frame) as CBOR.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        let result = match self {
            Self::Begin { txid } | Self::Reset { txid } | Self::Commit { txid } => {
                ciborium::into_writer(&TxPayload { txid: txid.0 }, &mut buf)
            }
            Self::Put {
                txid,
                id,
                last_modified,
                fields,
            } => ciborium::into_writer(
                &PutPayload {
                    txid: txid.0,
                    id: id.clone(),
                    ts: last_modified.as_u64(),
                    fields: fields.clone(),
                },
                &mut buf,
            ),
            Self::Delete {
                txid,
                id,
                last_modified,
            } => ciborium::into_writer(
                &DeletePayload {
                    txid: txid.0,
                    id: id.clone(),
                    ts: last_modified.as_u64(),
                },
                &mut buf,
            ),
        };
        result.map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: JournalRecordType, payload: &[u8]) -> CoreResult<Self> {
        fn read<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> CoreResult<T> {
            ciborium::from_reader(payload).map_err(|e| CoreError::codec(e.to_string()))
        }

        Ok(match record_type {
            JournalRecordType::Begin => Self::Begin {
                txid: TransactionId(read::<TxPayload>(payload)?.txid),
            },
            JournalRecordType::Reset => Self::Reset {
                txid: TransactionId(read::<TxPayload>(payload)?.txid),
            },
            JournalRecordType::Commit => Self::Commit {
                txid: TransactionId(read::<TxPayload>(payload)?.txid),
            },
            JournalRecordType::Put => {
                let p: PutPayload = read(payload)?;
                Self::Put {
                    txid: TransactionId(p.txid),
                    id: p.id,
                    last_modified: Timestamp(p.ts),
                    fields: p.fields,
                }
            }
            JournalRecordType::Delete => {
                let p: DeletePayload = read(payload)?;
                Self::Delete {
                    txid: TransactionId(p.txid),
                    id: p.id,
                    last_modified: Timestamp(p.ts),
                }
            }
        })
    }

    /// Serializes the record into a complete frame.
    ///
    /// ```text
    /// | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
    /// ```
    pub fn encode_frame(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_input("journal record payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        data.push(self.record_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        // CRC covers everything before it
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

/// Computes CRC32 (IEEE polynomial) over `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put() -> JournalRecord {
        let mut fields = Fields::new();
        fields.insert("code".into(), json!("print(1)"));
        fields.insert("nested".into(), json!({"a": [1, 2.5, null]}));
        JournalRecord::Put {
            txid: TransactionId::new(3),
            id: "app-1".into(),
            last_modified: Timestamp::new(1_700_000_000_000),
            fields,
        }
    }

    #[test]
    fn payloads_decode_to_the_same_record() {
        let records = [
            JournalRecord::Begin {
                txid: TransactionId::new(3),
            },
            put(),
            JournalRecord::Delete {
                txid: TransactionId::new(3),
                id: "app-2".into(),
                last_modified: Timestamp::new(12),
            },
            JournalRecord::Reset {
                txid: TransactionId::new(3),
            },
            JournalRecord::Commit {
                txid: TransactionId::new(3),
            },
        ];

        for record in records {
            let payload = record.encode_payload().unwrap();
            let decoded = JournalRecord::decode_payload(record.record_type(), &payload).unwrap();
            assert_eq!(decoded, record);
        }
    }

    #[test]
    fn frame_layout() {
        let frame = JournalRecord::Commit {
            txid: TransactionId::new(1),
        }
        .encode_frame()
        .unwrap();

        assert_eq!(&frame[0..4], b"SJNL");
        assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), JOURNAL_VERSION);
        assert_eq!(frame[6], JournalRecordType::Commit.as_byte());

        let len = u32::from_le_bytes(frame[7..11].try_into().unwrap()) as usize;
        assert_eq!(frame.len(), HEADER_SIZE + len + CRC_SIZE);

        let crc = u32::from_le_bytes(frame[frame.len() - 4..].try_into().unwrap());
        assert_eq!(crc, compute_crc32(&frame[..frame.len() - 4]));
    }

    #[test]
    fn unknown_type_byte() {
        assert_eq!(JournalRecordType::from_byte(0), None);
        assert_eq!(JournalRecordType::from_byte(9), None);
        assert_eq!(
            JournalRecordType::from_byte(4),
            Some(JournalRecordType::Reset)
        );
    }

    #[test]
    fn truncated_payload_fails() {
        let payload = put().encode_payload().unwrap();
        let result = JournalRecord::decode_payload(
            JournalRecordType::Put,
            &payload[..payload.len() / 2],
        );
        assert!(matches!(result, Err(CoreError::Codec { .. })));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
