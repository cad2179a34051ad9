use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{WireError, WireResult};

/// Codec for wire messages.
///
/// Messages are JSON payloads: requests embed caller-supplied dynamic
/// values (parameters, tags, metric samples), which need a
/// self-describing encoding to round-trip. The channel layer below owns
/// framing (and encryption, when enabled), so the codec never sees frame
/// headers.
pub struct Codec;

impl Codec {
    pub fn encode<T: Serialize>(message: &T) -> WireResult<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| WireError::Serialization(e.to_string()))
    }

    pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> WireResult<T> {
        serde_json::from_slice(payload).map_err(|e| WireError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ErrorEnvelope, ErrorKind};
    use crate::message::{Request, Response};
    use serde_json::json;
    use std::collections::BTreeMap;
    use trialdb_aggregators::AggregatorSpec;
    use trialdb_query::Predicate;
    use trialdb_types::{EntityId, Project, Status, Trial};

    fn trial() -> Trial {
        Trial::new([("a".to_string(), json!(1))].into_iter().collect())
    }

    fn roundtrip_request(request: Request) -> Request {
        let bytes = Codec::encode(&request).unwrap();
        Codec::decode(&bytes).unwrap()
    }

    #[test]
    fn new_trial_roundtrip() {
        let decoded = roundtrip_request(Request::NewTrial { trial: trial() });
        match decoded {
            Request::NewTrial { trial: t } => assert_eq!(t, trial()),
            other => panic!("wrong variant: {}", other.operation()),
        }
    }

    #[test]
    fn set_status_roundtrip_keeps_the_stamp() {
        let mut t = trial();
        t.update_count = 5;
        let decoded = roundtrip_request(Request::SetTrialStatus {
            trial: t.entity_ref(),
            status: Status::Finished,
            error: Some("oom".into()),
        });
        match decoded {
            Request::SetTrialStatus { trial: r, status, error } => {
                assert_eq!(r.update_count, 5);
                assert_eq!(status, Status::Finished);
                assert_eq!(error.as_deref(), Some("oom"));
            }
            other => panic!("wrong variant: {}", other.operation()),
        }
    }

    #[test]
    fn metrics_request_roundtrip() {
        let mut fields = BTreeMap::new();
        fields.insert("loss".to_string(), json!(0.25));
        let decoded = roundtrip_request(Request::LogTrialMetrics {
            trial: trial().entity_ref(),
            step: Some(10),
            aggregator: Some(AggregatorSpec::Ring { capacity: 8 }),
            fields,
        });
        match decoded {
            Request::LogTrialMetrics { step, aggregator, fields, .. } => {
                assert_eq!(step, Some(10));
                assert_eq!(aggregator, Some(AggregatorSpec::Ring { capacity: 8 }));
                assert_eq!(fields.get("loss"), Some(&json!(0.25)));
            }
            other => panic!("wrong variant: {}", other.operation()),
        }
    }

    #[test]
    fn fetch_request_roundtrip() {
        let predicate = Predicate::new().eq("status", "running").is_in(
            "revision",
            vec![json!(0), json!(1)],
        );
        let decoded = roundtrip_request(Request::FetchTrials {
            predicate: predicate.clone(),
        });
        match decoded {
            Request::FetchTrials { predicate: p } => assert_eq!(p, predicate),
            other => panic!("wrong variant: {}", other.operation()),
        }
    }

    #[test]
    fn response_roundtrips() {
        let bytes = Codec::encode(&Response::Projects(vec![Project::new("p")])).unwrap();
        match Codec::decode::<Response>(&bytes).unwrap() {
            Response::Projects(projects) => assert_eq!(projects[0].name, "p"),
            other => panic!("wrong variant: {other:?}"),
        }

        let envelope = ErrorEnvelope::new(ErrorKind::LockTimeout, "timed out");
        let bytes = Codec::encode(&Response::Error(envelope.clone())).unwrap();
        match Codec::decode::<Response>(&bytes).unwrap() {
            Response::Error(e) => assert_eq!(e, envelope),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn maybe_project_roundtrip() {
        let bytes = Codec::encode(&Response::MaybeProject(None)).unwrap();
        assert!(matches!(
            Codec::decode::<Response>(&bytes).unwrap(),
            Response::MaybeProject(None)
        ));
    }

    #[test]
    fn get_by_id_roundtrip() {
        let id = EntityId::for_group("g");
        let decoded = roundtrip_request(Request::GetTrialGroup { id });
        match decoded {
            Request::GetTrialGroup { id: got } => assert_eq!(got, id),
            other => panic!("wrong variant: {}", other.operation()),
        }
    }

    #[test]
    fn truncated_payload_fails_to_decode() {
        let bytes = Codec::encode(&Request::Commit).unwrap();
        let err = Codec::decode::<Request>(&bytes[..bytes.len().saturating_sub(1)]).unwrap_err();
        assert!(matches!(err, WireError::Deserialization(_)));
    }
}
