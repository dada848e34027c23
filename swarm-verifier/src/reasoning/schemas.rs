//! Strict JSON schemas for the structured stages
//!
//! The verdict schema is defined for completeness but not enforced on the
//! wire: the web-search variant of the service rejects `response_format`.

use serde_json::{json, Value};

use swarm_common::models::FailureCause;

pub fn timeframe_extraction() -> Value {
    json!({
        "type": "object",
        "properties": {
            "timeframe_status": {
                "type": "string",
                "enum": ["explicit", "implicit", "inferred", "event_trigger", "missing"],
                "description": "Classification of how the timeframe was determined"
            },
            "start_utc": {
                "type": ["string", "null"],
                "format": "date-time",
                "description": "Start time in ISO-8601 UTC format, usually the tweet timestamp"
            },
            "end_utc": {
                "type": ["string", "null"],
                "format": "date-time",
                "description": "Deadline for verification in ISO-8601 UTC format"
            },
            "precision": {
                "type": "string",
                "enum": ["hour", "day", "week", "month", "quarter", "year", "unbounded", "event"],
                "description": "Granularity of the timeframe"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of how the timeframe was derived"
            },
            "assumptions": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of assumptions made during extraction"
            },
            "confidence": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "Confidence score between 0.0 and 1.0"
            }
        },
        "required": [
            "timeframe_status", "start_utc", "end_utc", "precision",
            "reasoning", "assumptions", "confidence"
        ],
        "additionalProperties": false
    })
}

/// Causes the filter stage may return
pub const FILTER_FAILURE_CAUSES: [FailureCause; 11] = [
    FailureCause::BrokenExtraction,
    FailureCause::VagueTarget,
    FailureCause::PresentState,
    FailureCause::Negation,
    FailureCause::Sarcasm,
    FailureCause::QuotingOthers,
    FailureCause::HeavyHedging,
    FailureCause::FutureTimeframe,
    FailureCause::SelfAnnouncement,
    FailureCause::PersonalAction,
    FailureCause::Other,
];

pub fn filter_validation() -> Value {
    let mut causes: Vec<Value> = FILTER_FAILURE_CAUSES
        .iter()
        .map(|c| Value::String(c.as_str().to_string()))
        .collect();
    causes.push(Value::Null);

    json!({
        "type": "object",
        "properties": {
            "context": {
                "type": "string",
                "description": "Brief summary of what the thread is about and what the author was saying"
            },
            "is_valid": {
                "type": "boolean",
                "description": "Whether this is a valid prediction that should be verified"
            },
            "failure_cause": {
                "type": ["string", "null"],
                "enum": causes,
                "description": "Category of failure (null if is_valid is true). BROKEN_EXTRACTION: slices cut through word boundaries or extract nonsensical fragments. VAGUE_TARGET: target is subjective or unmeasurable. PRESENT_STATE: statement about current conditions, not a prediction. NEGATION: prediction is negated. SARCASM: sarcastic/joking tone. QUOTING_OTHERS: quoting someone else. HEAVY_HEDGING: heavily hedged. FUTURE_TIMEFRAME: prediction hasn't matured yet. SELF_ANNOUNCEMENT: author announcing their own actions/products. PERSONAL_ACTION: local/personal actions not publicly verifiable. OTHER: other disqualifying factors."
            },
            "confidence": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "Confidence score from 0.0 to 1.0 indicating how certain the validation is"
            },
            "reasoning": {
                "type": "string",
                "description": "Explanation of why this is or isn't a valid prediction"
            }
        },
        "required": ["context", "is_valid", "failure_cause", "confidence", "reasoning"],
        "additionalProperties": false
    })
}

pub fn verdict_generation() -> Value {
    json!({
        "type": "object",
        "properties": {
            "valid": {
                "type": "boolean",
                "description": "Whether this was a legitimate prediction (true) or invalid/news (false)"
            },
            "verdict": {
                "type": "boolean",
                "description": "Whether the prediction came true"
            },
            "confidence": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "Confidence score from 0.0 to 1.0 indicating certainty in the verdict determination"
            },
            "reasoning": {
                "type": "string",
                "description": "Brief explanation of why the prediction came true or false, citing specific sources and dates"
            }
        },
        "required": ["valid", "verdict", "confidence", "reasoning"],
        "additionalProperties": false
    })
}
