//! Tests for API request/response models

use prometheus_process_pool::core::RouteOutcome;
use prometheus_process_pool::runtime::{RouteRequest, RouteResponse};
use serde_json::json;

#[test]
fn test_route_request_timeout_optional() {
    let req: RouteRequest =
        serde_json::from_value(json!({ "execution_id": "e-1", "context": { "a": 1 } })).unwrap();
    assert_eq!(req.execution_id, "e-1");
    assert_eq!(req.timeout_seconds, None);
    assert_eq!(req.context["a"], 1);
}

#[test]
fn test_route_response_shape() {
    let dispatched = RouteResponse {
        execution_id: "e-1".into(),
        outcome: RouteOutcome::Dispatched {
            process_id: "fleet:0".into(),
        },
    };
    assert_eq!(
        serde_json::to_value(&dispatched).unwrap(),
        json!({ "execution_id": "e-1", "status": "dispatched", "process_id": "fleet:0" })
    );

    let queued = RouteResponse {
        execution_id: "e-2".into(),
        outcome: RouteOutcome::Queued { position: 3 },
    };
    let value = serde_json::to_value(&queued).unwrap();
    assert_eq!(value["status"], "queued");
    assert_eq!(value["position"], 3);
}
