use super::*;
use crate::coding::{JsonCoder, Value};

const F_INT: MethodSpec = MethodSpec::new("f", &[ParamKind::Int]);
const F_STRING: MethodSpec = MethodSpec::new("f", &[ParamKind::String]);
const F_NUMBER: MethodSpec = MethodSpec::new("f", &[ParamKind::OptionalNumber]);
const G_ANY: MethodSpec = MethodSpec::new("g", &[ParamKind::Any, ParamKind::Array]);

// ============================================================================
// Method resolution
// ============================================================================

#[test]
fn test_number_selects_primitive_overload() {
    let methods = [F_INT, F_STRING];
    assert_eq!(resolve(&methods, "f", &[Value::from(5)]), Some(&F_INT));
    assert_eq!(resolve(&methods, "f", &[Value::from("five")]), Some(&F_STRING));
}

#[test]
fn test_fractional_number_skips_integer_overload() {
    const F_DOUBLE: MethodSpec = MethodSpec::new("f", &[ParamKind::Double]);
    let methods = [F_INT, F_DOUBLE];
    assert_eq!(resolve(&methods, "f", &[Value::from(2)]), Some(&F_INT));
    assert_eq!(resolve(&methods, "f", &[Value::from(2.5)]), Some(&F_DOUBLE));
}

#[test]
fn test_null_disqualifies_primitive_parameter() {
    assert_eq!(F_INT.score("f", &[Value::Null]), 0);
    assert_eq!(resolve(&[F_INT], "f", &[Value::Null]), None);
    assert_eq!(resolve(&[F_INT, F_STRING], "f", &[Value::Null]), Some(&F_STRING));
}

#[test]
fn test_exact_reference_type_beats_primitive() {
    assert_eq!(F_INT.score("f", &[Value::from(1)]), 2);
    assert_eq!(F_NUMBER.score("f", &[Value::from(1)]), 3);
    assert_eq!(resolve(&[F_INT, F_NUMBER], "f", &[Value::from(1)]), Some(&F_NUMBER));
}

#[test]
fn test_name_and_arity_must_match() {
    assert_eq!(F_INT.score("g", &[Value::from(1)]), 0);
    assert_eq!(F_INT.score("f", &[]), 0);
    assert_eq!(F_INT.score("f", &[Value::from(1), Value::from(2)]), 0);
}

#[test]
fn test_assignable_and_any_parameters() {
    let args = [Value::from("x"), Value::typed_array("int", vec![Value::from(1)])];
    assert_eq!(G_ANY.score("g", &args), 3);
    assert_eq!(ParamKind::Extension("Point").score(&Value::from(1)), None);
    assert_eq!(ParamKind::Extension("Point").score(&Value::Null), Some(0));
}

#[test]
fn test_ties_prefer_first_declared() {
    let a = MethodSpec::new("h", &[ParamKind::Any]);
    let b = MethodSpec::one_way("h", &[ParamKind::Any]);
    assert_eq!(resolve(&[a, b], "h", &[Value::from(1)]), Some(&a));
}

#[test]
fn test_signature_key_blanks_nulls() {
    let key = signature_key("add", &[Value::from(1), Value::Null, Value::from("s")]);
    assert_eq!(key, "add:integer::string");
    assert_eq!(signature_key("ping", &[]), "ping");
    assert_ne!(
        signature_key("add", &[Value::from(1), Value::from(2)]),
        signature_key("add", &[Value::from(1.5), Value::from(2)])
    );
}

#[test]
fn test_interface_declares() {
    const METHODS: &[MethodSpec] = &[F_INT, F_STRING];
    let interface = Interface::new("calc", METHODS);
    assert!(interface.declares("f"));
    assert!(!interface.declares("g"));
    assert!(Interface::open("any").resolve("f", &[Value::from(1)]).is_none());
}

#[test]
fn test_param_conversion() {
    let params = vec![Value::from(3), Value::from("x")];
    let n: i32 = param(&params, 0).unwrap();
    assert_eq!(n, 3);
    assert!(param::<i32>(&params, 1).is_err());
    assert!(matches!(param::<i32>(&params, 2), Err(RpcError::InvalidRequest(_))));
}

// ============================================================================
// Requests and responses
// ============================================================================

#[test]
fn test_request_wire_shape() {
    let coder = JsonCoder::standard();
    let request = Request::new(7, "calc", "add", vec![Value::from(3), Value::from(4)]);

    let text = coder.encode(&request.to_value()).unwrap();
    assert_eq!(text, r#"{"id":7,"message":"calc#add","params":[3,4]}"#);

    let decoded = Request::from_value(&coder.decode(&text).unwrap()).unwrap();
    assert_eq!(decoded, request);
    assert_eq!(decoded.service_and_method().unwrap(), ("calc", "add"));
}

#[test]
fn test_request_message_splits_at_first_delimiter() {
    let request = Request {
        id: 1,
        message: "svc#a#b".to_string(),
        params: vec![],
    };
    assert_eq!(request.service_and_method().unwrap(), ("svc", "a#b"));

    let request = Request {
        id: 1,
        message: "nodelimiter".to_string(),
        params: vec![],
    };
    assert!(matches!(request.service_and_method(), Err(RpcError::InvalidRequest(_))));
}

#[test]
fn test_request_rejects_bad_shapes() {
    assert!(Request::from_value(&Value::from(1)).is_err());
    let missing_id = Value::object([("message", Value::from("a#b"))]);
    assert!(Request::from_value(&missing_id).is_err());
}

#[test]
fn test_response_success_round_trip() {
    let coder = JsonCoder::standard();
    let response = Response::success(9, Value::from(7));

    let text = coder.encode(&response.to_value()).unwrap();
    assert_eq!(text, r#"{"error":null,"id":9,"result":7}"#);

    let decoded = Response::from_value(&coder.decode(&text).unwrap()).unwrap();
    assert!(decoded.is_success());
    assert_eq!(decoded.into_result().unwrap(), Value::from(7));
}

#[test]
fn test_response_exception_becomes_remote_invocation() {
    let coder = JsonCoder::standard();
    let exception = RemoteException::new("division by zero").with_cause("bad input");
    let response = Response::exception(2, exception.clone());

    let text = coder.encode(&response.to_value()).unwrap();
    let decoded = Response::from_value(&coder.decode(&text).unwrap()).unwrap();
    match decoded.into_result() {
        Err(RpcError::RemoteInvocation(remote)) => assert_eq!(remote, exception),
        other => panic!("expected remote invocation error, got {:?}", other),
    }
}

#[test]
fn test_response_dropped_signal() {
    let coder = JsonCoder::standard();
    let response = Response::service_dropped(3, "downstream gone");

    let text = coder.encode(&response.to_value()).unwrap();
    let decoded = Response::from_value(&coder.decode(&text).unwrap()).unwrap();
    let err = decoded.into_result().unwrap_err();
    assert!(err.is_service_dropped());
    assert!(err.is_retryable());
}

#[test]
fn test_remote_exception_display_includes_causes() {
    let exception = RemoteException::new("outer").with_cause("inner");
    assert_eq!(exception.to_string(), "outer: inner");
}
