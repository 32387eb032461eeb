//! Request records and the record table.
//!
//! A [`RequestRecord`] is the engine's unit of output: one mutable record
//! per logical request, accumulated from partial protocol events and
//! published as a full snapshot on every mutation.
//!
//! The [`RecordTable`] owns all records plus the *slot* index that maps a
//! live `(tab, request id)` pair to its current record. The two are
//! separate on purpose: the protocol recycles request ids across redirect
//! hops, so a slot can rotate to a fresh record while the superseded one
//! stays in the table for inspection and export.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capture::headers::Header;
use crate::identifiers::{NetworkRequestId, RecordId, TabId};

// ============================================================================
// RecordStatus
// ============================================================================

/// Lifecycle status of a request record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Created, no terminal event yet.
    #[default]
    Pending,
    /// Superseded by a redirect hop reusing the request id.
    Redirected,
    /// Loading finished.
    Completed,
    /// Loading failed or was canceled.
    Failed,
}

impl RecordStatus {
    /// Returns `true` for terminal states.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

// ============================================================================
// BodyEncoding
// ============================================================================

/// Encoding tag of a stored response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    /// Raw text.
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    /// Base64-encoded binary.
    #[serde(rename = "base64")]
    Base64,
}

// ============================================================================
// RequestRecord
// ============================================================================

/// A reconstructed request/response record.
///
/// Fields accumulate monotonically: later events add or overwrite, but a
/// non-empty field never reverts to empty from a partial event (the
/// correlator uses the `merge_*` helpers below to uphold this).
///
/// Serialized in the wire casing the stream channel publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// External record identifier.
    pub id: RecordId,
    /// Protocol request id (shared by redirect hops).
    pub request_id: NetworkRequestId,
    /// Logical tab the request belongs to.
    pub tab_id: TabId,
    /// Global sequence number; assigned once at creation, never reused.
    pub seq: u64,

    /// Request URL.
    #[serde(default)]
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: String,
    /// Merged request headers.
    #[serde(default)]
    pub request_headers: Vec<Header>,
    /// Captured request body text.
    #[serde(default)]
    pub request_body_text: String,
    /// Resource type reported by the protocol.
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Lifecycle status.
    #[serde(default)]
    pub status: RecordStatus,
    /// HTTP status code, once a response arrived.
    #[serde(default)]
    pub http_status: Option<u32>,
    /// HTTP status text.
    #[serde(default)]
    pub status_text: String,
    /// Response MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// Negotiated protocol (e.g. `h2`).
    #[serde(default)]
    pub protocol: String,
    /// Remote endpoint IP address.
    #[serde(default)]
    pub remote_ip_address: String,
    /// Remote endpoint port.
    #[serde(default)]
    pub remote_port: u32,
    /// Merged response headers.
    #[serde(default)]
    pub response_headers: Vec<Header>,
    /// Opaque timing payload from the protocol.
    #[serde(default)]
    pub timing: Option<Value>,

    /// Wall-clock start time, ISO-8601.
    #[serde(default)]
    pub started_date_time: String,
    /// Monotonic start timestamp (seconds); basis for elapsed time.
    #[serde(skip)]
    pub start_timestamp: Option<f64>,
    /// Elapsed time in the protocol's time unit (seconds).
    #[serde(default)]
    pub time: Option<f64>,
    /// Total encoded bytes received.
    #[serde(default)]
    pub encoded_data_length: f64,
    /// Body size in bytes, once the body fetch resolved.
    #[serde(default)]
    pub body_size: Option<f64>,

    /// Stored response body (possibly base64-encoded).
    #[serde(default)]
    pub response_body: String,
    /// Encoding tag of the stored body.
    #[serde(default)]
    pub response_body_encoding: BodyEncoding,

    /// Failure description, if the load failed.
    #[serde(default)]
    pub error_text: String,
    /// Whether the request was canceled.
    #[serde(default)]
    pub canceled: bool,
}

impl RequestRecord {
    /// Creates an empty pending record.
    #[must_use]
    pub fn new(id: RecordId, tab_id: TabId, request_id: NetworkRequestId, seq: u64) -> Self {
        Self {
            id,
            request_id,
            tab_id,
            seq,
            url: String::new(),
            method: String::new(),
            request_headers: Vec::new(),
            request_body_text: String::new(),
            resource_type: None,
            status: RecordStatus::Pending,
            http_status: None,
            status_text: String::new(),
            mime_type: String::new(),
            protocol: String::new(),
            remote_ip_address: String::new(),
            remote_port: 0,
            response_headers: Vec::new(),
            timing: None,
            started_date_time: String::new(),
            start_timestamp: None,
            time: None,
            encoded_data_length: 0.0,
            body_size: None,
            response_body: String::new(),
            response_body_encoding: BodyEncoding::Utf8,
            error_text: String::new(),
            canceled: false,
        }
    }

    /// Overwrites a string field only with non-empty input, so partial
    /// events cannot blank out data an earlier event supplied.
    #[inline]
    pub fn merge_str(field: &mut String, incoming: impl Into<String>) {
        let incoming = incoming.into();
        if !incoming.is_empty() {
            *field = incoming;
        }
    }

    /// Stamps the start timestamp and ISO wall time, first writer wins.
    pub fn stamp_start(&mut self, timestamp: f64, wall_time: f64) {
        if self.start_timestamp.is_none() {
            self.start_timestamp = Some(timestamp);
        }
        if self.started_date_time.is_empty()
            && let Some(at) = DateTime::from_timestamp_millis((wall_time * 1000.0).round() as i64)
        {
            self.started_date_time = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        }
    }

    /// Elapsed time against the recorded start; zero when no start exists.
    #[inline]
    #[must_use]
    pub fn elapsed_from(&self, timestamp: f64) -> f64 {
        timestamp - self.start_timestamp.unwrap_or(timestamp)
    }

    /// Decodes the stored body to bytes, honoring the encoding tag.
    ///
    /// An undecodable base64 body yields empty bytes rather than an error;
    /// the stored form stays authoritative.
    #[must_use]
    pub fn decoded_body(&self) -> Vec<u8> {
        match self.response_body_encoding {
            BodyEncoding::Utf8 => self.response_body.clone().into_bytes(),
            BodyEncoding::Base64 => BASE64.decode(&self.response_body).unwrap_or_default(),
        }
    }
}

// ============================================================================
// RecordTable
// ============================================================================

/// Slot state for a live `(tab, request id)` pair.
#[derive(Debug)]
struct Slot {
    record_id: RecordId,
    hop: u32,
}

/// Owner of all request records and the live slot index.
///
/// Records persist after completion; only [`RecordTable::clear`] or an
/// engine reset removes them. Slots exist while a `(tab, request id)`
/// pair is still correlatable and rotate on redirect splits.
#[derive(Debug, Default)]
pub struct RecordTable {
    slots: FxHashMap<(TabId, NetworkRequestId), Slot>,
    records: FxHashMap<RecordId, RequestRecord>,
    next_seq: u64,
}

impl RecordTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record currently correlated to `(tab, request id)`,
    /// creating a fresh pending one if no slot exists.
    pub fn ensure(&mut self, tab_id: TabId, request_id: &NetworkRequestId) -> &mut RequestRecord {
        let key = (tab_id, request_id.clone());
        if !self.slots.contains_key(&key) {
            self.next_seq += 1;
            let record_id = RecordId::new(tab_id, request_id);
            self.records.insert(
                record_id.clone(),
                RequestRecord::new(record_id.clone(), tab_id, request_id.clone(), self.next_seq),
            );
            self.slots.insert(key.clone(), Slot { record_id, hop: 0 });
        }
        let slot = &self.slots[&key];
        self.records
            .get_mut(&slot.record_id)
            .expect("slot points at a live record")
    }

    /// Returns the record currently correlated to the pair, if any.
    #[must_use]
    pub fn current(&self, tab_id: TabId, request_id: &NetworkRequestId) -> Option<&RequestRecord> {
        let slot = self.slots.get(&(tab_id, request_id.clone()))?;
        self.records.get(&slot.record_id)
    }

    /// Mutable variant of [`RecordTable::current`].
    #[must_use]
    pub fn current_mut(
        &mut self,
        tab_id: TabId,
        request_id: &NetworkRequestId,
    ) -> Option<&mut RequestRecord> {
        let slot = self.slots.get(&(tab_id, request_id.clone()))?;
        self.records.get_mut(&slot.record_id)
    }

    /// Returns `true` if a live slot exists for the pair.
    #[inline]
    #[must_use]
    pub fn has_slot(&self, tab_id: TabId, request_id: &NetworkRequestId) -> bool {
        self.slots.contains_key(&(tab_id, request_id.clone()))
    }

    /// Rotates the slot for a recycled request id: the current record is
    /// left in the table untouched and a fresh pending record (new seq,
    /// hop-suffixed external id) takes over the slot.
    ///
    /// Caller finalizes the superseded record *before* rotating.
    pub fn rotate_hop(
        &mut self,
        tab_id: TabId,
        request_id: &NetworkRequestId,
    ) -> &mut RequestRecord {
        let key = (tab_id, request_id.clone());
        let hop = self.slots.get(&key).map_or(0, |s| s.hop) + 1;

        self.next_seq += 1;
        let record_id = RecordId::with_hop(tab_id, request_id, hop);
        self.records.insert(
            record_id.clone(),
            RequestRecord::new(record_id.clone(), tab_id, request_id.clone(), self.next_seq),
        );
        self.slots.insert(
            key,
            Slot {
                record_id: record_id.clone(),
                hop,
            },
        );
        self.records
            .get_mut(&record_id)
            .expect("freshly inserted record")
    }

    /// Looks up a record by external id (body resolutions address records
    /// this way so a rotated slot cannot misattribute a late body).
    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, record_id: &RecordId) -> Option<&mut RequestRecord> {
        self.records.get_mut(record_id)
    }

    /// Number of records in the table.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the table holds no records.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Full snapshot ordered by sequence number.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RequestRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    /// Empties the table and the slot index. Sequence numbers keep
    /// counting so external ordering stays stable across clears.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.records.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: u32) -> TabId {
        TabId::new(id).unwrap()
    }

    #[test]
    fn test_ensure_creates_once() {
        let mut table = RecordTable::new();
        let req = NetworkRequestId::from("req-1");

        let seq = table.ensure(tab(101), &req).seq;
        let again = table.ensure(tab(101), &req).seq;

        assert_eq!(seq, again);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_request_id_scoped_per_tab() {
        let mut table = RecordTable::new();
        let req = NetworkRequestId::from("req-1");

        table.ensure(tab(101), &req);
        table.ensure(tab(202), &req);

        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rotate_hop_keeps_superseded_record() {
        let mut table = RecordTable::new();
        let req = NetworkRequestId::from("req-1");

        let first_id = table.ensure(tab(101), &req).id.clone();
        let second = table.rotate_hop(tab(101), &req);
        let second_id = second.id.clone();

        assert_ne!(first_id, second_id);
        assert_eq!(second_id.as_str(), "101:req-1:r1");
        assert_eq!(table.len(), 2);

        // Slot now points at the new hop.
        assert_eq!(table.current(tab(101), &req).unwrap().id, second_id);
    }

    #[test]
    fn test_snapshot_ordered_by_seq() {
        let mut table = RecordTable::new();
        table.ensure(tab(101), &NetworkRequestId::from("b"));
        table.ensure(tab(101), &NetworkRequestId::from("a"));
        table.rotate_hop(tab(101), &NetworkRequestId::from("b"));

        let seqs: Vec<_> = table.snapshot().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, [1, 2, 3]);
    }

    #[test]
    fn test_clear_keeps_seq_counter() {
        let mut table = RecordTable::new();
        table.ensure(tab(101), &NetworkRequestId::from("a"));
        table.clear();
        assert!(table.is_empty());

        let record = table.ensure(tab(101), &NetworkRequestId::from("b"));
        assert_eq!(record.seq, 2);
    }

    #[test]
    fn test_merge_str_never_blanks() {
        let mut field = String::from("http://x/a");
        RequestRecord::merge_str(&mut field, "");
        assert_eq!(field, "http://x/a");

        RequestRecord::merge_str(&mut field, "http://x/b");
        assert_eq!(field, "http://x/b");
    }

    #[test]
    fn test_stamp_start_first_writer_wins() {
        let mut record = RequestRecord::new(
            RecordId::new(tab(101), &NetworkRequestId::from("r")),
            tab(101),
            NetworkRequestId::from("r"),
            1,
        );

        record.stamp_start(1000.0, 1_600_000_000.0);
        record.stamp_start(2000.0, 1_700_000_000.0);

        assert_eq!(record.start_timestamp, Some(1000.0));
        assert_eq!(record.started_date_time, "2020-09-13T12:26:40.000Z");
    }

    #[test]
    fn test_elapsed_without_start_is_zero() {
        let record = RequestRecord::new(
            RecordId::new(tab(101), &NetworkRequestId::from("r")),
            tab(101),
            NetworkRequestId::from("r"),
            1,
        );
        assert_eq!(record.elapsed_from(1234.5), 0.0);
    }

    #[test]
    fn test_decoded_body_base64() {
        let mut record = RequestRecord::new(
            RecordId::new(tab(101), &NetworkRequestId::from("r")),
            tab(101),
            NetworkRequestId::from("r"),
            1,
        );
        record.response_body = "aGVsbG8=".to_string();
        record.response_body_encoding = BodyEncoding::Base64;

        assert_eq!(record.decoded_body(), b"hello");
    }

    #[test]
    fn test_record_serializes_wire_casing() {
        let record = RequestRecord::new(
            RecordId::new(tab(101), &NetworkRequestId::from("req-1")),
            tab(101),
            NetworkRequestId::from("req-1"),
            1,
        );
        let json = serde_json::to_value(&record).expect("serialize");

        assert_eq!(json["id"], "101:req-1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["responseBodyEncoding"], "utf-8");
        assert!(json.get("startTimestamp").is_none());
    }
}
