//! Demo services hosted by `xalrpc serve`.

use async_trait::async_trait;
use xalrpc_common::protocol::{param, Interface, MethodSpec, ParamKind};
use xalrpc_common::Value;
use xalrpc_server::{RpcServer, ServiceProvider};

pub const ADD_INT: MethodSpec = MethodSpec::new("add", &[ParamKind::Int, ParamKind::Int]);
pub const ADD_DOUBLE: MethodSpec = MethodSpec::new("add", &[ParamKind::Double, ParamKind::Double]);
pub const DIVIDE: MethodSpec = MethodSpec::new("divide", &[ParamKind::Double, ParamKind::Double]);
pub const DESCRIBE: MethodSpec = MethodSpec::new("describe", &[ParamKind::String]);
pub const LOG: MethodSpec = MethodSpec::one_way("log", &[ParamKind::String]);

pub const CALC: Interface = Interface::new("calc", &[ADD_INT, ADD_DOUBLE, DIVIDE, DESCRIBE, LOG]);

pub const ECHO_METHOD: MethodSpec = MethodSpec::new("echo", &[ParamKind::Any]);

pub const ECHO: Interface = Interface::new("echo", &[ECHO_METHOD]);

/// Arithmetic on numbers, with an integer and a floating point `add`.
pub struct Calc;

#[async_trait]
impl ServiceProvider for Calc {
    async fn invoke(&self, method: &MethodSpec, params: Vec<Value>) -> anyhow::Result<Value> {
        if *method == ADD_INT {
            let a: i64 = param(&params, 0)?;
            let b: i64 = param(&params, 1)?;
            let sum = a
                .checked_add(b)
                .ok_or_else(|| anyhow::anyhow!("{} + {} overflows", a, b))?;
            Ok(Value::from(sum))
        } else if *method == ADD_DOUBLE {
            let a: f64 = param(&params, 0)?;
            let b: f64 = param(&params, 1)?;
            Ok(Value::from(a + b))
        } else if *method == DIVIDE {
            let a: f64 = param(&params, 0)?;
            let b: f64 = param(&params, 1)?;
            if b == 0.0 {
                anyhow::bail!("division by zero");
            }
            Ok(Value::from(a / b))
        } else if *method == DESCRIBE {
            let text: String = param(&params, 0)?;
            Ok(Value::object([
                ("text", Value::from(text.as_str())),
                ("chars", Value::from(text.chars().count() as i64)),
                ("upper", Value::from(text.to_uppercase())),
            ]))
        } else if *method == LOG {
            let text: String = param(&params, 0)?;
            tracing::info!(message = %text, "calc#log");
            Ok(Value::Null)
        } else {
            anyhow::bail!("calc has no method {}", method.name)
        }
    }
}

/// Returns its argument unchanged, shared sub-values and cycles included.
pub struct Echo;

#[async_trait]
impl ServiceProvider for Echo {
    async fn invoke(&self, _method: &MethodSpec, mut params: Vec<Value>) -> anyhow::Result<Value> {
        Ok(params.pop().unwrap_or_default())
    }
}

/// Registers `calc` and `echo` on `server`.
pub fn register(server: &RpcServer) {
    server.add_handler("calc", CALC, Calc);
    server.add_handler("echo", ECHO, Echo);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calc_overloads() {
        let sum = Calc.invoke(&ADD_INT, vec![Value::from(3), Value::from(4)]).await.unwrap();
        assert_eq!(sum, Value::from(7));

        let sum = Calc.invoke(&ADD_DOUBLE, vec![Value::from(1.5), Value::from(2)]).await.unwrap();
        assert_eq!(sum, Value::from(3.5));

        assert_eq!(CALC.resolve("add", &[Value::from(1), Value::from(2)]), Some(&ADD_INT));
        assert_eq!(CALC.resolve("add", &[Value::from(1.5), Value::from(2)]), Some(&ADD_DOUBLE));
    }

    #[tokio::test]
    async fn test_divide_by_zero_fails() {
        let err = Calc.invoke(&DIVIDE, vec![Value::from(1), Value::from(0)]).await.unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
    }

    #[tokio::test]
    async fn test_describe() {
        let described = Calc.invoke(&DESCRIBE, vec![Value::from("héllo")]).await.unwrap();
        let object = described.as_object().unwrap();
        assert_eq!(object.get("chars"), Some(Value::from(5)));
        assert_eq!(object.get("upper"), Some(Value::from("HÉLLO")));
    }

    #[tokio::test]
    async fn test_echo_returns_argument() {
        let value = Value::array(vec![Value::from(1), Value::from("two")]);
        let echoed = Echo.invoke(&ECHO_METHOD, vec![value.clone()]).await.unwrap();
        assert!(echoed.as_array().unwrap().ptr_eq(value.as_array().unwrap()));
    }
}
