//! Typed host calls
//!
//! Interpreters that cannot hold a `&mut ExecutionContext` across the
//! boundary talk to the engine through [`HostCall`] requests, dispatched
//! either on a context directly or through the
//! [`ContextRegistry`](crate::ContextRegistry) by handle.

use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::sql::SqlHandle;
use kestrel_primitives::{Address, U256};
use serde_json::Value;

/// Request from contract code to the engine
#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    /// Read a storage key of the current contract
    GetData {
        /// Key
        key: Vec<u8>,
    },
    /// Write a storage key of the current contract
    SetData {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete a storage key of the current contract
    DelData {
        /// Key
        key: Vec<u8>,
    },
    /// Call another contract
    Call {
        /// Hex-encoded target address
        target: String,
        /// Function name
        function: String,
        /// JSON-array arguments
        args: String,
        /// Attached value
        amount: U256,
    },
    /// Run another contract's code in the current frame
    DelegateCall {
        /// Hex-encoded target address
        target: String,
        /// Function name
        function: String,
        /// JSON-array arguments
        args: String,
    },
    /// Move value to another account
    Send {
        /// Hex-encoded receiver address
        target: String,
        /// Amount
        amount: U256,
    },
    /// Push a recovery checkpoint
    SetRecoveryPoint,
    /// Release or roll back a recovery checkpoint
    ClearRecovery {
        /// Sequence number returned by `SetRecoveryPoint`
        seq: u64,
        /// Roll back instead of release
        is_error: bool,
    },
    /// Balance of the current contract, or of `account`
    GetBalance {
        /// Hex-encoded address
        account: Option<String>,
    },
    /// Caller of the current contract
    GetSender,
    /// Originator of the transaction
    GetOrigin,
    /// Transaction hash
    GetTxHash,
    /// Block height
    GetBlockHeight,
    /// Block timestamp in seconds
    GetTimestamp,
    /// Current contract address
    GetContractId,
    /// Value attached to the current call
    GetAmount,
    /// Structured-store connection of the current contract
    GetDbHandle,
    /// SHA-256 digest
    Sha256 {
        /// Input bytes
        data: Vec<u8>,
    },
    /// Signature verification
    EcVerify {
        /// Hex message digest
        message: String,
        /// Hex signature
        signature: String,
        /// Native or short-form address
        address: String,
    },
    /// Log a message
    Print {
        /// Message
        message: String,
    },
}

/// Engine answer to a [`HostCall`]
#[derive(Clone, Debug, PartialEq)]
pub enum HostReply {
    /// No result
    Unit,
    /// Storage value, if present
    Data(Option<Vec<u8>>),
    /// Return value of a contract call
    Value(Value),
    /// Recovery sequence number
    Seq(u64),
    /// Text result (addresses, hashes, decimal amounts)
    Text(String),
    /// Integer result
    Integer(u64),
    /// Boolean result
    Bool(bool),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Structured-store handle
    Db(SqlHandle),
}

fn parse_address(s: &str) -> VmResult<Address> {
    Address::decode(s).map_err(|e| VmError::InvalidAddress(e.to_string()))
}

impl ExecutionContext {
    /// Run one host call against this context
    pub fn dispatch(&mut self, call: HostCall) -> VmResult<HostReply> {
        let reply = match call {
            HostCall::GetData { key } => HostReply::Data(self.get_data(&key)?),
            HostCall::SetData { key, value } => {
                self.set_data(key, value)?;
                HostReply::Unit
            }
            HostCall::DelData { key } => {
                self.del_data(key)?;
                HostReply::Unit
            }
            HostCall::Call {
                target,
                function,
                args,
                amount,
            } => {
                let target = parse_address(&target)?;
                HostReply::Value(self.call(&target, &function, &args, amount)?)
            }
            HostCall::DelegateCall {
                target,
                function,
                args,
            } => {
                let target = parse_address(&target)?;
                HostReply::Value(self.delegate_call(&target, &function, &args)?)
            }
            HostCall::Send { target, amount } => {
                let target = parse_address(&target)?;
                self.send(&target, amount)?;
                HostReply::Unit
            }
            HostCall::SetRecoveryPoint => HostReply::Seq(self.set_recovery_point()?),
            HostCall::ClearRecovery { seq, is_error } => {
                self.clear_recovery(seq, is_error)?;
                HostReply::Unit
            }
            HostCall::GetBalance { account } => {
                let account = account.as_deref().map(parse_address).transpose()?;
                HostReply::Text(self.get_balance(account.as_ref())?.to_string())
            }
            HostCall::GetSender => HostReply::Text(self.sender()?.encode()),
            HostCall::GetOrigin => HostReply::Text(self.origin().encode()),
            HostCall::GetTxHash => HostReply::Text(self.tx_hash()),
            HostCall::GetBlockHeight => HostReply::Integer(self.block_height()),
            HostCall::GetTimestamp => HostReply::Integer(self.timestamp()),
            HostCall::GetContractId => HostReply::Text(self.contract_id()?.encode()),
            HostCall::GetAmount => HostReply::Text(self.amount()?),
            HostCall::GetDbHandle => HostReply::Db(self.get_db_handle()?),
            HostCall::Sha256 { data } => {
                HostReply::Bytes(kestrel_crypto::sha256(&data).as_bytes().to_vec())
            }
            HostCall::EcVerify {
                message,
                signature,
                address,
            } => HostReply::Bool(kestrel_crypto::ec_verify(&message, &signature, &address)?),
            HostCall::Print { message } => {
                self.print(&message);
                HostReply::Unit
            }
        };
        Ok(reply)
    }
}
