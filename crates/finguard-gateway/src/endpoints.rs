//! Gateway endpoint table
//!
//! Every enveloped route is a row here: where it forwards to, which
//! decrypted fields it needs, and what the audit log records about it.

use serde_json::{Map, Value};

use crate::config::UpstreamService;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamMethod {
    Get,
    Post,
}

/// A required field in the decrypted payload and its name upstream
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub upstream_name: &'static str,
}

const fn field(name: &'static str) -> Field {
    Field {
        name,
        upstream_name: name,
    }
}

const USER_ID: Field = field("user_id");
const SIMULATION_DATA: Field = field("simulation_data");
const AI_PROMPT: Field = field("ai_prompt");
const QUERY_TEXT: Field = field("query");
const TICKER: Field = field("ticker");
const START_DATE: Field = field("start_date");
const END_DATE: Field = field("end_date");

/// What the upstream call carries as its JSON body
#[derive(Debug, Clone, Copy)]
pub enum Forward {
    /// Exactly these fields, all required
    Fields(&'static [Field]),
    /// The decrypted payload as-is, or no body when there is none
    Payload,
}

/// Which identifying value the audit record carries on success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKey {
    UserId,
    Ticker,
    Query,
}

#[derive(Debug)]
pub struct Endpoint {
    /// Gateway route; `{ticker}` marks a path parameter
    pub route: &'static str,
    pub service: UpstreamService,
    pub method: UpstreamMethod,
    /// Upstream path; `{ticker}` is substituted from the gateway path
    pub upstream_path: &'static str,
    pub forward: Forward,
    /// Whether the request may omit the envelope entirely
    pub body_optional: bool,
    pub audit: AuditKey,
}

pub const USER_DATA: Endpoint = Endpoint {
    route: "/api/user-data",
    service: UpstreamService::Analytics,
    method: UpstreamMethod::Post,
    upstream_path: "/analytics/user-data",
    forward: Forward::Fields(&[USER_ID]),
    body_optional: false,
    audit: AuditKey::UserId,
};

pub const SIMULATE: Endpoint = Endpoint {
    route: "/api/simulate",
    service: UpstreamService::Analytics,
    method: UpstreamMethod::Post,
    upstream_path: "/analytics/simulate",
    forward: Forward::Fields(&[USER_ID, SIMULATION_DATA]),
    body_optional: false,
    audit: AuditKey::UserId,
};

pub const RECOMMEND: Endpoint = Endpoint {
    route: "/api/recommend",
    service: UpstreamService::Analytics,
    method: UpstreamMethod::Post,
    upstream_path: "/analytics/recommend",
    forward: Forward::Fields(&[USER_ID]),
    body_optional: false,
    audit: AuditKey::UserId,
};

pub const STOCK_SENTIMENTS: Endpoint = Endpoint {
    route: "/api/stock-sentiments",
    service: UpstreamService::Nlp,
    method: UpstreamMethod::Post,
    upstream_path: "/nlp/user-stock-sentiments",
    forward: Forward::Fields(&[Field {
        name: "user_id",
        upstream_name: "userId",
    }]),
    body_optional: false,
    audit: AuditKey::UserId,
};

pub const ENHANCE: Endpoint = Endpoint {
    route: "/api/enhance",
    service: UpstreamService::Nlp,
    method: UpstreamMethod::Post,
    upstream_path: "/nlp/enhance",
    forward: Forward::Fields(&[SIMULATION_DATA, USER_ID, AI_PROMPT]),
    body_optional: false,
    audit: AuditKey::UserId,
};

pub const QUERY: Endpoint = Endpoint {
    route: "/api/query",
    service: UpstreamService::Nlp,
    method: UpstreamMethod::Post,
    upstream_path: "/nlp/query",
    forward: Forward::Fields(&[QUERY_TEXT, USER_ID]),
    body_optional: false,
    audit: AuditKey::Query,
};

pub const STOCK_DATA: Endpoint = Endpoint {
    route: "/api/stock-data",
    service: UpstreamService::Financial,
    method: UpstreamMethod::Post,
    upstream_path: "/api/stock/data",
    forward: Forward::Fields(&[TICKER, START_DATE, END_DATE]),
    body_optional: false,
    audit: AuditKey::Ticker,
};

pub const STOCK_LATEST: Endpoint = Endpoint {
    route: "/api/stock-latest/{ticker}",
    service: UpstreamService::Financial,
    method: UpstreamMethod::Get,
    upstream_path: "/api/stock/latest/{ticker}",
    forward: Forward::Payload,
    body_optional: true,
    audit: AuditKey::Ticker,
};

/// All POST routes whose request is a single envelope body
pub static POST_ENDPOINTS: &[&Endpoint] = &[
    &USER_DATA,
    &SIMULATE,
    &RECOMMEND,
    &STOCK_SENTIMENTS,
    &ENHANCE,
    &QUERY,
    &STOCK_DATA,
];

/// Truthiness of a decrypted field: null, false, zero and empty
/// strings/arrays/objects all count as absent.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// "a required", "a and b required", "a, b, and c required"
fn required_message(fields: &[Field]) -> String {
    let names: Vec<&str> = fields.iter().map(|f| f.name).collect();
    let list = match names.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [a, b] => format!("{} and {}", a, b),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    };
    format!("{} required", list)
}

/// Tickers may only use the characters quote symbols are made of
pub fn validate_ticker(ticker: &str) -> Result<(), GatewayError> {
    let valid = !ticker.is_empty()
        && ticker.len() <= 32
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '_'));
    if valid {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!("invalid ticker '{}'", ticker)))
    }
}

impl Endpoint {
    pub fn upstream_path(&self, ticker: Option<&str>) -> String {
        match ticker {
            Some(t) => self.upstream_path.replace("{ticker}", t),
            None => self.upstream_path.to_string(),
        }
    }

    /// Route as it appears in audit records, with the ticker filled in
    pub fn audit_route(&self, ticker: Option<&str>) -> String {
        match ticker {
            Some(t) => self.route.replace("{ticker}", t),
            None => self.route.to_string(),
        }
    }

    /// Validate the decrypted payload and build the upstream JSON body
    pub fn upstream_body(&self, payload: Option<&Value>) -> Result<Option<Value>, GatewayError> {
        match self.forward {
            Forward::Payload => Ok(payload.filter(|p| is_present(p)).cloned()),
            Forward::Fields(fields) => {
                let obj = payload.and_then(Value::as_object).ok_or_else(|| {
                    GatewayError::Validation(format!(
                        "payload must be a JSON object; {}",
                        required_message(fields)
                    ))
                })?;

                let mut body = Map::with_capacity(fields.len());
                for f in fields {
                    match obj.get(f.name) {
                        Some(v) if is_present(v) => {
                            body.insert(f.upstream_name.to_string(), v.clone());
                        }
                        _ => return Err(GatewayError::Validation(required_message(fields))),
                    }
                }
                Ok(Some(Value::Object(body)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_present() {
        assert!(!is_present(&json!(null)));
        assert!(!is_present(&json!(false)));
        assert!(!is_present(&json!(0)));
        assert!(!is_present(&json!(0.0)));
        assert!(!is_present(&json!("")));
        assert!(!is_present(&json!([])));
        assert!(!is_present(&json!({})));

        assert!(is_present(&json!(true)));
        assert!(is_present(&json!(42)));
        assert!(is_present(&json!("uid1")));
        assert!(is_present(&json!([0])));
        assert!(is_present(&json!({"years": 10})));
    }

    #[test]
    fn test_required_messages() {
        assert_eq!(required_message(&[USER_ID]), "user_id required");
        assert_eq!(
            required_message(&[QUERY_TEXT, USER_ID]),
            "query and user_id required"
        );
        assert_eq!(
            required_message(&[TICKER, START_DATE, END_DATE]),
            "ticker, start_date, and end_date required"
        );
    }

    #[test]
    fn test_body_keeps_only_required_fields() {
        let payload = json!({"user_id": "uid1", "simulation_data": {"years": 5}, "extra": "dropped"});
        let body = SIMULATE.upstream_body(Some(&payload)).unwrap().unwrap();
        assert_eq!(body, json!({"user_id": "uid1", "simulation_data": {"years": 5}}));
    }

    #[test]
    fn test_body_renames_for_sentiments() {
        let body = STOCK_SENTIMENTS
            .upstream_body(Some(&json!({"user_id": "uid1", "stocks": ["AAPL"]})))
            .unwrap()
            .unwrap();
        assert_eq!(body, json!({"userId": "uid1"}));
    }

    #[test]
    fn test_missing_field_lists_all_required() {
        let err = ENHANCE
            .upstream_body(Some(&json!({"user_id": "uid1", "simulation_data": {"a": 1}})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: simulation_data, user_id, and ai_prompt required"
        );

        let err = USER_DATA.upstream_body(Some(&json!({"user_id": ""}))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: user_id required");
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let err = USER_DATA.upstream_body(Some(&json!(["uid1"]))).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(USER_DATA.upstream_body(None).is_err());
    }

    #[test]
    fn test_payload_forwarding() {
        assert_eq!(STOCK_LATEST.upstream_body(None).unwrap(), None);
        assert_eq!(STOCK_LATEST.upstream_body(Some(&json!({}))).unwrap(), None);
        assert_eq!(
            STOCK_LATEST.upstream_body(Some(&json!({"interval": "1d"}))).unwrap(),
            Some(json!({"interval": "1d"}))
        );
    }

    #[test]
    fn test_path_substitution() {
        assert_eq!(STOCK_LATEST.upstream_path(Some("AAPL")), "/api/stock/latest/AAPL");
        assert_eq!(STOCK_LATEST.audit_route(Some("AAPL")), "/api/stock-latest/AAPL");
        assert_eq!(QUERY.upstream_path(None), "/nlp/query");
    }

    #[test]
    fn test_ticker_validation() {
        assert!(validate_ticker("AAPL").is_ok());
        assert!(validate_ticker("BRK.B").is_ok());
        assert!(validate_ticker("^GSPC").is_ok());
        assert!(validate_ticker("EURUSD=X").is_ok());
        assert!(validate_ticker("").is_err());
        assert!(validate_ticker("../admin").is_err());
        assert!(validate_ticker("AA PL").is_err());
    }

    #[test]
    fn test_post_routes_are_unique() {
        let mut routes: Vec<&str> = POST_ENDPOINTS.iter().map(|e| e.route).collect();
        routes.sort();
        routes.dedup();
        assert_eq!(routes.len(), POST_ENDPOINTS.len());
        assert!(POST_ENDPOINTS.iter().all(|e| e.method == UpstreamMethod::Post && !e.body_optional));
    }
}
