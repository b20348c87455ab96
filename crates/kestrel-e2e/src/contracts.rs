//! Scripted test contracts
//!
//! A contract's code is a JSON [`Script`]: a map from function name to a
//! list of [`Op`]s. The [`ScriptInterpreter`] runs the ops in order and talks
//! to the engine only through typed host calls, the way an embedded
//! interpreter would.
//!
//! ```json
//! {"functions": {"pay": [
//!     {"op": "send", "target": "02ab...", "amount": 30},
//!     {"op": "return", "value": "done"}
//! ]}}
//! ```

use crate::{E2EError, E2EResult};
use kestrel_vm::{
    CallInfo, ExecutionContext, HostCall, HostReply, Interpreter, VmError, VmResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// One step of a scripted function
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Write a storage key
    SetData {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Delete a storage key
    DelData {
        /// Key
        key: String,
    },
    /// Return a storage value as a string, or null
    ReturnData {
        /// Key
        key: String,
    },
    /// Call another contract; a failure aborts this function
    Call {
        /// Hex-encoded target address
        target: String,
        /// Function name
        function: String,
        /// Arguments
        #[serde(default)]
        args: Vec<Value>,
        /// Attached value
        #[serde(default)]
        amount: u64,
    },
    /// Call under a recovery point; a failure is rolled back and the
    /// function continues. Returns `{"ok": bool}`.
    TryCall {
        /// Hex-encoded target address
        target: String,
        /// Function name
        function: String,
        /// Arguments
        #[serde(default)]
        args: Vec<Value>,
        /// Attached value
        #[serde(default)]
        amount: u64,
    },
    /// Run another contract's code against this contract's storage
    DelegateCall {
        /// Hex-encoded target address
        target: String,
        /// Function name
        function: String,
        /// Arguments
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Move value to another account
    Send {
        /// Hex-encoded receiver address
        target: String,
        /// Amount
        amount: u64,
    },
    /// Return a balance as a decimal string
    ReturnBalance {
        /// Hex-encoded address, or this contract
        #[serde(default)]
        account: Option<String>,
    },
    /// Return the caller's address
    ReturnSender,
    /// Execute SQL against this contract's structured store
    Sql {
        /// Statements
        statement: String,
    },
    /// Return the integer result of a single-row SQL query
    ReturnSql {
        /// Query
        query: String,
    },
    /// Return the result of a signature check
    Verify {
        /// Hex message digest
        message: String,
        /// Hex signature
        signature: String,
        /// Address to check against
        address: String,
    },
    /// Log a message
    Print {
        /// Message
        message: String,
    },
    /// Fail the function
    Fail {
        /// Failure message
        reason: String,
    },
    /// Set the return value
    Return {
        /// Value
        value: Value,
    },
}

/// Scripted contract code
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Functions by name
    pub functions: BTreeMap<String, Vec<Op>>,
}

impl Script {
    /// Create a script with no functions
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function
    pub fn function(mut self, name: &str, ops: Vec<Op>) -> Self {
        self.functions.insert(name.to_string(), ops);
        self
    }

    /// Encode as contract code
    pub fn to_code(&self) -> E2EResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| E2EError::Setup(e.to_string()))
    }

    /// Decode contract code
    pub fn from_code(code: &[u8]) -> VmResult<Self> {
        serde_json::from_slice(code)
            .map_err(|e| VmError::ContractFailed(format!("invalid script: {e}")))
    }
}

fn encode_args(args: &[Value]) -> VmResult<String> {
    serde_json::to_string(args).map_err(|e| VmError::InvalidArguments(e.to_string()))
}

fn unexpected(reply: HostReply) -> VmError {
    VmError::Internal(format!("unexpected host reply {reply:?}"))
}

/// Interpreter running [`Script`] contracts
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptInterpreter;

impl ScriptInterpreter {
    fn run(&self, host: &mut ExecutionContext, ops: &[Op]) -> VmResult<Value> {
        let mut ret = Value::Null;
        for op in ops {
            match op {
                Op::SetData { key, value } => {
                    host.dispatch(HostCall::SetData {
                        key: key.as_bytes().to_vec(),
                        value: value.as_bytes().to_vec(),
                    })?;
                }
                Op::DelData { key } => {
                    host.dispatch(HostCall::DelData {
                        key: key.as_bytes().to_vec(),
                    })?;
                }
                Op::ReturnData { key } => {
                    ret = match host.dispatch(HostCall::GetData {
                        key: key.as_bytes().to_vec(),
                    })? {
                        HostReply::Data(Some(v)) => json!(String::from_utf8_lossy(&v)),
                        HostReply::Data(None) => Value::Null,
                        other => return Err(unexpected(other)),
                    };
                }
                Op::Call {
                    target,
                    function,
                    args,
                    amount,
                } => {
                    ret = match host.dispatch(HostCall::Call {
                        target: target.clone(),
                        function: function.clone(),
                        args: encode_args(args)?,
                        amount: (*amount).into(),
                    })? {
                        HostReply::Value(v) => v,
                        other => return Err(unexpected(other)),
                    };
                }
                Op::TryCall {
                    target,
                    function,
                    args,
                    amount,
                } => {
                    let seq = match host.dispatch(HostCall::SetRecoveryPoint)? {
                        HostReply::Seq(seq) => seq,
                        other => return Err(unexpected(other)),
                    };
                    let result = host.dispatch(HostCall::Call {
                        target: target.clone(),
                        function: function.clone(),
                        args: encode_args(args)?,
                        amount: (*amount).into(),
                    });
                    let ok = match result {
                        Ok(_) => true,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::debug!("Nested call {}.{} failed: {}", target, function, e);
                            false
                        }
                    };
                    host.dispatch(HostCall::ClearRecovery { seq, is_error: !ok })?;
                    ret = json!({ "ok": ok });
                }
                Op::DelegateCall {
                    target,
                    function,
                    args,
                } => {
                    ret = match host.dispatch(HostCall::DelegateCall {
                        target: target.clone(),
                        function: function.clone(),
                        args: encode_args(args)?,
                    })? {
                        HostReply::Value(v) => v,
                        other => return Err(unexpected(other)),
                    };
                }
                Op::Send { target, amount } => {
                    host.dispatch(HostCall::Send {
                        target: target.clone(),
                        amount: (*amount).into(),
                    })?;
                }
                Op::ReturnBalance { account } => {
                    ret = match host.dispatch(HostCall::GetBalance {
                        account: account.clone(),
                    })? {
                        HostReply::Text(balance) => json!(balance),
                        other => return Err(unexpected(other)),
                    };
                }
                Op::ReturnSender => {
                    ret = match host.dispatch(HostCall::GetSender)? {
                        HostReply::Text(sender) => json!(sender),
                        other => return Err(unexpected(other)),
                    };
                }
                Op::Sql { statement } => {
                    let handle = match host.dispatch(HostCall::GetDbHandle)? {
                        HostReply::Db(handle) => handle,
                        other => return Err(unexpected(other)),
                    };
                    host.with_sql(&handle, |conn| conn.execute_batch(statement))?;
                }
                Op::ReturnSql { query } => {
                    let handle = match host.dispatch(HostCall::GetDbHandle)? {
                        HostReply::Db(handle) => handle,
                        other => return Err(unexpected(other)),
                    };
                    let n: i64 = host.with_sql(&handle, |conn| {
                        conn.query_row(query, [], |row| row.get(0))
                    })?;
                    ret = json!(n);
                }
                Op::Verify {
                    message,
                    signature,
                    address,
                } => {
                    ret = match host.dispatch(HostCall::EcVerify {
                        message: message.clone(),
                        signature: signature.clone(),
                        address: address.clone(),
                    })? {
                        HostReply::Bool(ok) => json!(ok),
                        other => return Err(unexpected(other)),
                    };
                }
                Op::Print { message } => {
                    host.dispatch(HostCall::Print {
                        message: message.clone(),
                    })?;
                }
                Op::Fail { reason } => return Err(VmError::ContractFailed(reason.clone())),
                Op::Return { value } => ret = value.clone(),
            }
        }
        Ok(ret)
    }
}

impl Interpreter for ScriptInterpreter {
    fn invoke(
        &self,
        host: &mut ExecutionContext,
        code: &[u8],
        call: &CallInfo,
    ) -> VmResult<Value> {
        let script = Script::from_code(code)?;
        let ops = script.functions.get(&call.function).ok_or_else(|| {
            VmError::ContractFailed(format!("{} has no function {}", call.contract, call.function))
        })?;
        tracing::debug!("Running {}.{} ({} ops)", call.contract, call.function, ops.len());
        self.run(host, ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_json_shape() {
        let script: Script = serde_json::from_str(
            r#"{"functions": {"pay": [
                {"op": "send", "target": "00", "amount": 30},
                {"op": "try_call", "target": "00", "function": "f"},
                {"op": "return", "value": "done"}
            ]}}"#,
        )
        .unwrap();
        let ops = &script.functions["pay"];
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[1],
            Op::TryCall {
                target: "00".to_string(),
                function: "f".to_string(),
                args: vec![],
                amount: 0,
            }
        );
    }

    #[test]
    fn test_invalid_code() {
        assert!(matches!(
            Script::from_code(b"not json"),
            Err(VmError::ContractFailed(_))
        ));
    }
}
