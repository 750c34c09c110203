//! Deterministic payload synthesis for each pipeline stage.
//!
//! Record `i` derives every synthetic field from `i` alone, so the same count
//! and the same dependency identifiers always produce byte-identical requests.
//! Dependent stages emit `min(n, ids.len())` records, record `i` bound to
//! `ids[i]`; a short identifier list shortens the batch and is never padded.
//!
//! # Time fields
//!
//! ```text
//! minute = (i / 59) % 60
//! second =  i % 59          (0..=58, so `second + 1` stays within 0..=59)
//! ```

use crate::error::SynthesisError;
use crate::query::{bulk_mutation, GraphqlRequest, InputValue, ToInput};
use crate::{Chain, Stage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar date shared by every synthesized timestamp.
pub const BASE_DATE: &str = "2026-02-18";

const HEADER_HOUR: u8 = 10;
const MICRO_HOUR: u8 = 12;
const SECOND_MODULUS: u64 = 59;
const MINUTE_MODULUS: u64 = 60;

/// Identifier assigned by the service. Header ids are integers, microservice
/// ids are GUID strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Numeric(i64),
    Text(String),
}

impl From<&Identifier> for InputValue {
    fn from(id: &Identifier) -> Self {
        match id {
            Identifier::Numeric(v) => InputValue::Int(*v),
            Identifier::Text(s) => InputValue::String(s.clone()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "{v}"),
            Identifier::Text(s) => f.write_str(s),
        }
    }
}

/// Wrapped time of day derived from a record index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl ClockTime {
    pub fn for_index(hour: u8, index: u64) -> Self {
        Self {
            hour,
            minute: ((index / SECOND_MODULUS) % MINUTE_MODULUS) as u8,
            second: (index % SECOND_MODULUS) as u8,
        }
    }

    /// One second later; never carries because `second <= 58`.
    pub fn next_second(self) -> Self {
        Self {
            second: self.second + 1,
            ..self
        }
    }

    pub fn to_rfc3339(self) -> String {
        format!(
            "{BASE_DATE}T{:02}:{:02}:{:02}Z",
            self.hour, self.minute, self.second
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Completed,
    Failed,
}

impl LogState {
    pub fn token(&self) -> &'static str {
        match self {
            LogState::Completed => "COMPLETED",
            LogState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCreateItem {
    pub log_date_in: String,
    pub log_date_out: String,
    pub log_state: LogState,
    pub log_method_url: String,
    pub microservice_name: String,
    pub http_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderUpdateItem {
    pub log_id: Identifier,
    pub log_state: LogState,
    pub error_code: String,
    pub error_description: String,
    pub request_duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroCreateItem {
    pub log_id: Identifier,
    pub request_id: i64,
    pub event_name: String,
    pub log_date: String,
    pub log_level: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroUpdateItem {
    pub log_microservice_id: Identifier,
    pub log_level: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCreateItem {
    pub log_id: Identifier,
    pub date: String,
    pub log_level: String,
    pub state: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdateItem {
    pub log_id: Identifier,
    pub log_level: String,
    pub state: String,
    pub text: String,
}

impl ToInput for HeaderCreateItem {
    fn to_input(&self) -> InputValue {
        InputValue::object()
            .field("logDateIn", self.log_date_in.as_str())
            .field("logDateOut", self.log_date_out.as_str())
            .field("logState", InputValue::Enum(self.log_state.token()))
            .field("logMethodUrl", self.log_method_url.as_str())
            .field("microserviceName", self.microservice_name.as_str())
            .field("httpMethod", self.http_method.as_str())
            .build()
    }
}

impl ToInput for HeaderUpdateItem {
    fn to_input(&self) -> InputValue {
        InputValue::object()
            .field("logId", &self.log_id)
            .field("logState", InputValue::Enum(self.log_state.token()))
            .field("errorCode", self.error_code.as_str())
            .field("errorDescription", self.error_description.as_str())
            .field("requestDuration", self.request_duration)
            .build()
    }
}

impl ToInput for MicroCreateItem {
    fn to_input(&self) -> InputValue {
        InputValue::object()
            .field("logId", &self.log_id)
            .field("requestId", self.request_id)
            .field("eventName", self.event_name.as_str())
            .field("logDate", self.log_date.as_str())
            .field("logLevel", self.log_level.as_str())
            .field("logMicroserviceText", self.text.as_str())
            .build()
    }
}

impl ToInput for MicroUpdateItem {
    fn to_input(&self) -> InputValue {
        InputValue::object()
            .field("logMicroserviceId", &self.log_microservice_id)
            .field("logLevel", self.log_level.as_str())
            .field("logMicroserviceText", self.text.as_str())
            .build()
    }
}

impl ToInput for ContentCreateItem {
    fn to_input(&self) -> InputValue {
        InputValue::object()
            .field("logId", &self.log_id)
            .field("logServicesDate", self.date.as_str())
            .field("logServicesLogLevel", self.log_level.as_str())
            .field("logServicesState", self.state.as_str())
            .field("logServicesContentText", self.text.as_str())
            .build()
    }
}

impl ToInput for ContentUpdateItem {
    fn to_input(&self) -> InputValue {
        InputValue::object()
            .field("logId", &self.log_id)
            .field("logServicesLogLevel", self.log_level.as_str())
            .field("logServicesState", self.state.as_str())
            .field("logServicesContentText", self.text.as_str())
            .build()
    }
}

fn checked_count(n: i64) -> Result<usize, SynthesisError> {
    usize::try_from(n).map_err(|_| SynthesisError::InvalidCount(n))
}

/// Positions `0..min(n, ids.len())` paired with their identifiers.
fn bound<'a>(
    n: i64,
    ids: &'a [Identifier],
) -> Result<impl Iterator<Item = (u64, &'a Identifier)> + 'a, SynthesisError> {
    let take = checked_count(n)?.min(ids.len());
    Ok(ids[..take].iter().enumerate().map(|(i, id)| (i as u64, id)))
}

pub fn header_create_items(n: i64) -> Result<Vec<HeaderCreateItem>, SynthesisError> {
    let count = checked_count(n)?;
    Ok((0..count as u64)
        .map(|i| {
            let t_in = ClockTime::for_index(HEADER_HOUR, i);
            HeaderCreateItem {
                log_date_in: t_in.to_rfc3339(),
                log_date_out: t_in.next_second().to_rfc3339(),
                log_state: LogState::Completed,
                log_method_url: format!("/api/perf/{i}"),
                microservice_name: "perf-svc".to_string(),
                http_method: "POST".to_string(),
            }
        })
        .collect())
}

pub fn header_update_items(
    n: i64,
    header_ids: &[Identifier],
) -> Result<Vec<HeaderUpdateItem>, SynthesisError> {
    Ok(bound(n, header_ids)?
        .map(|(i, id)| HeaderUpdateItem {
            log_id: id.clone(),
            log_state: LogState::Failed,
            error_code: format!("PERF-{i:04}"),
            error_description: format!("Perf error {i}"),
            request_duration: 100 + (i as i64) * 10,
        })
        .collect())
}

pub fn micro_create_items(
    n: i64,
    header_ids: &[Identifier],
) -> Result<Vec<MicroCreateItem>, SynthesisError> {
    Ok(bound(n, header_ids)?
        .map(|(i, id)| MicroCreateItem {
            log_id: id.clone(),
            request_id: 1000 + i as i64,
            event_name: format!("PerfEvent{i}"),
            log_date: ClockTime::for_index(MICRO_HOUR, i).to_rfc3339(),
            log_level: "INFO".to_string(),
            text: format!("Perf log {i}"),
        })
        .collect())
}

pub fn micro_update_items(
    n: i64,
    micro_ids: &[Identifier],
) -> Result<Vec<MicroUpdateItem>, SynthesisError> {
    Ok(bound(n, micro_ids)?
        .map(|(i, id)| MicroUpdateItem {
            log_microservice_id: id.clone(),
            log_level: "ERROR".to_string(),
            text: format!("Updated {i}"),
        })
        .collect())
}

pub fn content_create_items(
    n: i64,
    header_ids: &[Identifier],
) -> Result<Vec<ContentCreateItem>, SynthesisError> {
    Ok(bound(n, header_ids)?
        .map(|(i, id)| ContentCreateItem {
            log_id: id.clone(),
            date: BASE_DATE.to_string(),
            log_level: "INFO".to_string(),
            state: "OK".to_string(),
            text: format!("Perf content {i}"),
        })
        .collect())
}

pub fn content_update_items(
    n: i64,
    header_ids: &[Identifier],
) -> Result<Vec<ContentUpdateItem>, SynthesisError> {
    Ok(bound(n, header_ids)?
        .map(|(i, id)| ContentUpdateItem {
            log_id: id.clone(),
            log_level: "WARN".to_string(),
            state: "UPDATED".to_string(),
            text: format!("Updated content {i}"),
        })
        .collect())
}

/// Identifier chains accumulated during one batch iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyBindings {
    header: Vec<Identifier>,
    micro: Vec<Identifier>,
}

impl DependencyBindings {
    pub fn get(&self, chain: Chain) -> &[Identifier] {
        match chain {
            Chain::Header => &self.header,
            Chain::Micro => &self.micro,
        }
    }

    pub fn bind(&mut self, chain: Chain, ids: Vec<Identifier>) {
        match chain {
            Chain::Header => self.header = ids,
            Chain::Micro => self.micro = ids,
        }
    }
}

/// Synthesized records for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePayload {
    HeaderCreate(Vec<HeaderCreateItem>),
    HeaderUpdate(Vec<HeaderUpdateItem>),
    MicroCreate(Vec<MicroCreateItem>),
    MicroUpdate(Vec<MicroUpdateItem>),
    ContentCreate(Vec<ContentCreateItem>),
    ContentUpdate(Vec<ContentUpdateItem>),
}

impl StagePayload {
    pub fn stage(&self) -> Stage {
        match self {
            StagePayload::HeaderCreate(_) => Stage::HeaderCreate,
            StagePayload::HeaderUpdate(_) => Stage::HeaderUpdate,
            StagePayload::MicroCreate(_) => Stage::MicroCreate,
            StagePayload::MicroUpdate(_) => Stage::MicroUpdate,
            StagePayload::ContentCreate(_) => Stage::ContentCreate,
            StagePayload::ContentUpdate(_) => Stage::ContentUpdate,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StagePayload::HeaderCreate(v) => v.len(),
            StagePayload::HeaderUpdate(v) => v.len(),
            StagePayload::MicroCreate(v) => v.len(),
            StagePayload::MicroUpdate(v) => v.len(),
            StagePayload::ContentCreate(v) => v.len(),
            StagePayload::ContentUpdate(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One batched mutation embedding every record.
    pub fn request(&self) -> GraphqlRequest {
        let stage = self.stage();
        match self {
            StagePayload::HeaderCreate(v) => bulk_mutation(stage, v),
            StagePayload::HeaderUpdate(v) => bulk_mutation(stage, v),
            StagePayload::MicroCreate(v) => bulk_mutation(stage, v),
            StagePayload::MicroUpdate(v) => bulk_mutation(stage, v),
            StagePayload::ContentCreate(v) => bulk_mutation(stage, v),
            StagePayload::ContentUpdate(v) => bulk_mutation(stage, v),
        }
    }
}

/// Build the records for `stage` from the current bindings.
pub fn synthesize(
    stage: Stage,
    n: i64,
    bindings: &DependencyBindings,
) -> Result<StagePayload, SynthesisError> {
    let header = bindings.get(Chain::Header);
    let micro = bindings.get(Chain::Micro);
    Ok(match stage {
        Stage::HeaderCreate => StagePayload::HeaderCreate(header_create_items(n)?),
        Stage::HeaderUpdate => StagePayload::HeaderUpdate(header_update_items(n, header)?),
        Stage::MicroCreate => StagePayload::MicroCreate(micro_create_items(n, header)?),
        Stage::MicroUpdate => StagePayload::MicroUpdate(micro_update_items(n, micro)?),
        Stage::ContentCreate => StagePayload::ContentCreate(content_create_items(n, header)?),
        Stage::ContentUpdate => StagePayload::ContentUpdate(content_update_items(n, header)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_ids(k: i64) -> Vec<Identifier> {
        (0..k).map(|v| Identifier::Numeric(1000 + v)).collect()
    }

    #[test]
    fn independent_stage_emits_exactly_n() {
        for n in [0, 1, 10, 59, 60, 1_000] {
            assert_eq!(header_create_items(n).unwrap().len(), n as usize);
        }
    }

    #[test]
    fn negative_count_is_rejected() {
        assert_eq!(
            header_create_items(-1).unwrap_err(),
            SynthesisError::InvalidCount(-1)
        );
        assert_eq!(
            content_update_items(-5, &numeric_ids(3)).unwrap_err(),
            SynthesisError::InvalidCount(-5)
        );
    }

    #[test]
    fn dependent_stage_emits_min_of_n_and_ids() {
        let ids = numeric_ids(47);
        assert_eq!(header_update_items(50, &ids).unwrap().len(), 47);
        assert_eq!(micro_create_items(50, &ids).unwrap().len(), 47);
        assert_eq!(content_create_items(10, &ids).unwrap().len(), 10);
        assert_eq!(content_update_items(50, &[]).unwrap().len(), 0);
    }

    #[test]
    fn dependent_records_bind_same_index() {
        let ids = numeric_ids(5);
        let items = header_update_items(5, &ids).unwrap();
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.log_id, ids[i]);
            assert_eq!(item.error_code, format!("PERF-{i:04}"));
            assert_eq!(item.request_duration, 100 + 10 * i as i64);
        }

        let guids: Vec<Identifier> = (0..3)
            .map(|i| Identifier::Text(format!("00000000-0000-0000-0000-00000000000{i}")))
            .collect();
        let updates = micro_update_items(3, &guids).unwrap();
        assert_eq!(updates[2].log_microservice_id, guids[2]);
        assert_eq!(updates[2].text, "Updated 2");
    }

    #[test]
    fn time_fields_stay_valid_for_large_counts() {
        for i in (0..500_000u64).step_by(7).chain([58, 59, 3539, 3540, u64::MAX]) {
            let t = ClockTime::for_index(HEADER_HOUR, i);
            assert!(t.minute <= 59);
            assert!(t.second <= 58);
            assert!(t.next_second().second <= 59);
        }
    }

    #[test]
    fn header_timestamps_match_wrap_rule() {
        let items = header_create_items(61).unwrap();
        assert_eq!(items[0].log_date_in, "2026-02-18T10:00:00Z");
        assert_eq!(items[0].log_date_out, "2026-02-18T10:00:01Z");
        assert_eq!(items[58].log_date_in, "2026-02-18T10:00:58Z");
        assert_eq!(items[58].log_date_out, "2026-02-18T10:00:59Z");
        assert_eq!(items[59].log_date_in, "2026-02-18T10:01:00Z");
        assert_eq!(items[60].log_method_url, "/api/perf/60");
    }

    #[test]
    fn synthesis_is_byte_identical_across_runs() {
        let mut bindings = DependencyBindings::default();
        bindings.bind(Chain::Header, numeric_ids(20));
        bindings.bind(Chain::Micro, vec![Identifier::Text("a-b".into())]);

        for stage in Stage::ALL {
            let a = synthesize(stage, 20, &bindings).unwrap().request();
            let b = synthesize(stage, 20, &bindings).unwrap().request();
            assert_eq!(a.body(), b.body(), "{stage} payload drifted");
        }
    }

    #[test]
    fn synthesize_routes_chains() {
        let mut bindings = DependencyBindings::default();
        bindings.bind(Chain::Header, numeric_ids(4));
        bindings.bind(Chain::Micro, numeric_ids(2));

        assert_eq!(synthesize(Stage::HeaderCreate, 6, &bindings).unwrap().len(), 6);
        assert_eq!(synthesize(Stage::HeaderUpdate, 6, &bindings).unwrap().len(), 4);
        assert_eq!(synthesize(Stage::MicroUpdate, 6, &bindings).unwrap().len(), 2);
        assert_eq!(
            synthesize(Stage::ContentUpdate, 6, &bindings).unwrap().stage(),
            Stage::ContentUpdate
        );
    }

    #[test]
    fn request_embeds_identifiers_with_their_types() {
        let payload = StagePayload::MicroUpdate(
            micro_update_items(1, &[Identifier::Text("9f1c".into())]).unwrap(),
        );
        let q = payload.request().query;
        assert!(q.contains(r#"logMicroserviceId: "9f1c""#));

        let payload = StagePayload::HeaderUpdate(header_update_items(1, &numeric_ids(1)).unwrap());
        let q = payload.request().query;
        assert!(q.contains("logId: 1000, logState: FAILED"));
    }

    #[test]
    fn micro_create_carries_request_and_event_fields() {
        let payload = StagePayload::MicroCreate(micro_create_items(3, &numeric_ids(3)).unwrap());
        let q = payload.request().query;
        assert!(q.contains(
            r#"logId: 1002, requestId: 1002, eventName: "PerfEvent2", logDate: "2026-02-18T12:00:02Z""#
        ));
    }

    #[test]
    fn identifier_decodes_untagged() {
        let ids: Vec<Identifier> = serde_json::from_str(r#"[12, "abc"]"#).unwrap();
        assert_eq!(ids, vec![Identifier::Numeric(12), Identifier::Text("abc".into())]);
    }
}
