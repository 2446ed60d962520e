//! Wire model for the pool protocol
//!
//! JSON-RPC style line-delimited messages: requests `{id, method, params}`,
//! notifications `{method, params}` (no id), responses `{id, result|error}`.
//! Responses correlate strictly by numeric id; ids 1 and 2 are reserved for
//! subscribe/authorize and submission ids are allocated above 100.

use crate::error::{PoolError, Result};
use pktmine_hash::{merkle_root, Hash256, WorkHeader};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reserved id for mining.subscribe
pub const SUBSCRIBE_ID: u64 = 1;

/// Reserved id for mining.authorize
pub const AUTHORIZE_ID: u64 = 2;

/// Submission ids are allocated strictly above this floor,
/// partitioned from the control-message ids.
pub const SUBMIT_ID_FLOOR: u64 = 100;

/// Protocol methods
pub mod methods {
    pub const SUBSCRIBE: &str = "mining.subscribe";
    pub const AUTHORIZE: &str = "mining.authorize";
    pub const SUBMIT: &str = "mining.submit";
    pub const NOTIFY: &str = "mining.notify";
    pub const SET_DIFFICULTY: &str = "mining.set_difficulty";
}

/// Client-to-pool request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumRequest {
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

/// Pool-to-client response, matched to a request by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<StratumRpcError>,
}

/// JSON-RPC error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Server-initiated notification (no id field)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumNotification {
    pub method: String,
    pub params: Vec<Value>,
}

/// Any inbound line from the pool
#[derive(Debug, Clone)]
pub enum Inbound {
    Response(StratumResponse),
    Notification(StratumNotification),
}

/// Classify and parse one inbound line.
///
/// Notifications carry a `method`; everything else must be a response with
/// a numeric id. Anything that fits neither shape is a protocol error and
/// is dropped by the caller.
pub fn parse_inbound(line: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(line)?;
    let obj = value
        .as_object()
        .ok_or_else(|| PoolError::Protocol(format!("not a JSON object: {}", line)))?;

    if obj.get("method").is_some() {
        let notification: StratumNotification = serde_json::from_value(value)?;
        return Ok(Inbound::Notification(notification));
    }

    if obj.get("id").map(Value::is_u64).unwrap_or(false) {
        let response: StratumResponse = serde_json::from_value(value)?;
        return Ok(Inbound::Response(response));
    }

    Err(PoolError::Protocol(format!("unroutable message: {}", line)))
}

/// One round of assignable work from the pool.
///
/// Immutable once received; the next notification supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub job_id: String,
    pub prev_hash: Hash256,
    pub coinbase_prefix: Vec<u8>,
    pub coinbase_suffix: Vec<u8>,
    pub merkle_branches: Vec<Hash256>,
    pub version: u32,
    pub bits: u32,
    pub timestamp: u32,
    pub clean_jobs: bool,
}

impl WorkUnit {
    /// Parse from mining.notify params.
    ///
    /// Params: [jobId, prevHash, coinbasePrefix, coinbaseSuffix,
    /// merkleBranches[], version, bits, timestamp, cleanJobs], with the
    /// byte fields hex encoded.
    pub fn from_notify_params(params: &[Value]) -> Result<Self> {
        if params.len() < 9 {
            return Err(PoolError::Protocol(
                "invalid mining.notify params length".to_string(),
            ));
        }

        let job_id = param_str(params, 0, "job_id")?.to_string();
        let prev_hash = Hash256::from_hex(param_str(params, 1, "prev_hash")?)
            .map_err(|e| PoolError::Protocol(format!("invalid prev_hash: {}", e)))?;
        let coinbase_prefix = decode_hex(param_str(params, 2, "coinbase_prefix")?)?;
        let coinbase_suffix = decode_hex(param_str(params, 3, "coinbase_suffix")?)?;

        let merkle_branches = params[4]
            .as_array()
            .ok_or_else(|| PoolError::Protocol("invalid merkle_branches".to_string()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| PoolError::Protocol("invalid merkle branch".to_string()))
                    .and_then(|s| {
                        Hash256::from_hex(s).map_err(|e| {
                            PoolError::Protocol(format!("invalid merkle branch: {}", e))
                        })
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let version = parse_hex_u32(param_str(params, 5, "version")?, "version")?;
        let bits = parse_hex_u32(param_str(params, 6, "bits")?, "bits")?;
        let timestamp = parse_hex_u32(param_str(params, 7, "timestamp")?, "timestamp")?;
        let clean_jobs = params[8]
            .as_bool()
            .ok_or_else(|| PoolError::Protocol("invalid clean_jobs".to_string()))?;

        Ok(Self {
            job_id,
            prev_hash,
            coinbase_prefix,
            coinbase_suffix,
            merkle_branches,
            version,
            bits,
            timestamp,
            clean_jobs,
        })
    }

    /// Build the nonce-independent header, folding the pool-assigned
    /// extranonce into the coinbase.
    pub fn header(&self, extranonce: &[u8]) -> WorkHeader {
        let mut coinbase = Vec::with_capacity(
            self.coinbase_prefix.len() + extranonce.len() + self.coinbase_suffix.len(),
        );
        coinbase.extend_from_slice(&self.coinbase_prefix);
        coinbase.extend_from_slice(extranonce);
        coinbase.extend_from_slice(&self.coinbase_suffix);

        WorkHeader {
            version: self.version,
            prev_hash: self.prev_hash,
            merkle_root: merkle_root(&coinbase, &self.merkle_branches),
            timestamp: self.timestamp,
            bits: self.bits,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {} (clean: {})", self.job_id, self.clean_jobs)
    }
}

/// A qualifying nonce ready for submission.
///
/// Transient: produced by the search loop, consumed by submission, then
/// discarded. Never outlives the work generation it was produced from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub generation: u64,
    pub job_id: String,
    pub extranonce: Vec<u8>,
    pub timestamp: u32,
    pub nonce: u32,
    pub digest: Hash256,
}

/// Outcome of one share submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Accepted,
    Rejected,
}

/// mining.subscribe result
#[derive(Debug, Clone, Default)]
pub struct SubscribeResult {
    pub subscription_id: Option<String>,
    pub extranonce: Vec<u8>,
}

impl SubscribeResult {
    /// Parse from a mining.subscribe response result.
    ///
    /// Pools vary here; both fields are optional and missing pieces
    /// degrade to the empty extranonce rather than failing the handshake.
    pub fn from_response(result: Option<&Value>) -> Self {
        let Some(arr) = result.and_then(Value::as_array) else {
            return Self::default();
        };

        let subscription_id = match arr.first() {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(subs)) => subs
                .iter()
                .find_map(|s| s.as_array())
                .and_then(|pair| pair.get(1))
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        };

        let extranonce = arr
            .get(1)
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s).ok())
            .unwrap_or_default();

        Self {
            subscription_id,
            extranonce,
        }
    }
}

impl StratumRequest {
    /// Create a mining.subscribe request (id 1)
    pub fn subscribe(user_agent: &str) -> Self {
        Self {
            id: SUBSCRIBE_ID,
            method: methods::SUBSCRIBE.to_string(),
            params: vec![Value::String(user_agent.to_string())],
        }
    }

    /// Create a mining.authorize request (id 2)
    pub fn authorize(payout_address: &str, worker_name: &str) -> Self {
        Self {
            id: AUTHORIZE_ID,
            method: methods::AUTHORIZE.to_string(),
            params: vec![
                Value::String(payout_address.to_string()),
                Value::String(worker_name.to_string()),
            ],
        }
    }

    /// Create a mining.submit request for an allocated submission id
    pub fn submit(id: u64, payout_address: &str, candidate: &Candidate) -> Self {
        Self {
            id,
            method: methods::SUBMIT.to_string(),
            params: vec![
                Value::String(payout_address.to_string()),
                Value::String(candidate.job_id.clone()),
                Value::String(hex::encode(&candidate.extranonce)),
                Value::String(format!("{:08x}", candidate.timestamp)),
                Value::String(format!("{:08x}", candidate.nonce)),
            ],
        }
    }
}

fn param_str<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    params[index]
        .as_str()
        .ok_or_else(|| PoolError::Protocol(format!("invalid {}", name)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| PoolError::Protocol(format!("invalid hex field: {}", e)))
}

fn parse_hex_u32(s: &str, name: &str) -> Result<u32> {
    u32::from_str_radix(s, 16).map_err(|e| PoolError::Protocol(format!("invalid {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn notify_params() -> Vec<Value> {
        vec![
            json!("job42"),
            json!(hex::encode([0x11u8; 32])),
            json!("aabb"),
            json!("ccdd"),
            json!([hex::encode([0x22u8; 32])]),
            json!("20000000"),
            json!("1d00ffff"),
            json!("5f5e1000"),
            json!(true),
        ]
    }

    #[test]
    fn test_subscribe_request_reserved_id() {
        let req = StratumRequest::subscribe("pktmine/1.0");
        assert_eq!(req.id, SUBSCRIBE_ID);
        assert_eq!(req.method, "mining.subscribe");
        assert_eq!(req.params.len(), 1);
    }

    #[test]
    fn test_authorize_request_reserved_id() {
        let req = StratumRequest::authorize("pkt1qexample", "mobile");
        assert_eq!(req.id, AUTHORIZE_ID);
        assert_eq!(req.method, "mining.authorize");
        assert_eq!(req.params, vec![json!("pkt1qexample"), json!("mobile")]);
    }

    #[test]
    fn test_submit_request_param_order() {
        let candidate = Candidate {
            generation: 1,
            job_id: "job42".to_string(),
            extranonce: vec![0xf0, 0x00, 0x00, 0x0f],
            timestamp: 0x5f5e_1000,
            nonce: 0xdead_beef,
            digest: Hash256::default(),
        };
        let req = StratumRequest::submit(101, "pkt1qexample", &candidate);
        assert!(req.id > SUBMIT_ID_FLOOR);
        assert_eq!(req.method, "mining.submit");
        assert_eq!(
            req.params,
            vec![
                json!("pkt1qexample"),
                json!("job42"),
                json!("f000000f"),
                json!("5f5e1000"),
                json!("deadbeef"),
            ]
        );
    }

    #[test]
    fn test_work_unit_parsing() {
        let unit = WorkUnit::from_notify_params(&notify_params()).unwrap();
        assert_eq!(unit.job_id, "job42");
        assert_eq!(unit.prev_hash, Hash256::from_bytes([0x11; 32]));
        assert_eq!(unit.coinbase_prefix, vec![0xaa, 0xbb]);
        assert_eq!(unit.coinbase_suffix, vec![0xcc, 0xdd]);
        assert_eq!(unit.merkle_branches, vec![Hash256::from_bytes([0x22; 32])]);
        assert_eq!(unit.version, 0x2000_0000);
        assert_eq!(unit.bits, 0x1d00_ffff);
        assert_eq!(unit.timestamp, 0x5f5e_1000);
        assert!(unit.clean_jobs);
    }

    #[test]
    fn test_work_unit_rejects_short_params() {
        let mut params = notify_params();
        params.truncate(5);
        assert!(WorkUnit::from_notify_params(&params).is_err());
    }

    #[test]
    fn test_work_unit_rejects_bad_hex() {
        let mut params = notify_params();
        params[1] = json!("zzzz");
        assert!(WorkUnit::from_notify_params(&params).is_err());
    }

    #[test]
    fn test_header_folds_extranonce_into_coinbase() {
        let unit = WorkUnit::from_notify_params(&notify_params()).unwrap();
        let a = unit.header(&[0x01, 0x02]);
        let b = unit.header(&[0x03, 0x04]);
        assert_ne!(a.merkle_root, b.merkle_root);
        assert_eq!(a.version, unit.version);
        assert_eq!(a.prev_hash, unit.prev_hash);
    }

    #[test]
    fn test_parse_inbound_routes_by_shape() {
        match parse_inbound(r#"{"id":1,"result":true,"error":null}"#).unwrap() {
            Inbound::Response(resp) => assert_eq!(resp.id, 1),
            other => panic!("expected response, got {:?}", other),
        }

        match parse_inbound(r#"{"method":"mining.set_difficulty","params":[8]}"#).unwrap() {
            Inbound::Notification(n) => assert_eq!(n.method, "mining.set_difficulty"),
            other => panic!("expected notification, got {:?}", other),
        }

        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"result":true}"#).is_err());
        assert!(parse_inbound(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn test_subscribe_result_lenient_parse() {
        let full = SubscribeResult::from_response(Some(&json!([
            [["mining.notify", "sub1"]],
            "f000000f",
            4
        ])));
        assert_eq!(full.subscription_id.as_deref(), Some("sub1"));
        assert_eq!(full.extranonce, vec![0xf0, 0x00, 0x00, 0x0f]);

        let bare = SubscribeResult::from_response(Some(&json!(["sub2"])));
        assert_eq!(bare.subscription_id.as_deref(), Some("sub2"));
        assert!(bare.extranonce.is_empty());

        let none = SubscribeResult::from_response(None);
        assert!(none.subscription_id.is_none());
    }
}
