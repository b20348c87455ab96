//! Shared fixtures for unit tests

use crate::config::EngineConfig;
use crate::context::{ExecutionContext, TxMeta};
use crate::frame::Frame;
use crate::interpreter::NativeInterpreter;
use kestrel_crypto::account_id;
use kestrel_primitives::{Address, U256};
use kestrel_storage::{AccountState, MemoryStore, StateReader, StateWriter};
use serde_json::Value;
use std::sync::Arc;

/// Code deployed at the fixture contract
pub const ROOT_CODE: &[u8] = b"root";

/// Address with `byte` in the last position; never a valid public key
pub fn address(byte: u8) -> Address {
    let mut bytes = [0u8; Address::LEN];
    bytes[Address::LEN - 1] = byte;
    Address::from_bytes(bytes)
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub meta: TxMeta,
    pub contract: Address,
    pub interpreter: NativeInterpreter,
    pub config: EngineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            meta: TxMeta::new(address(0xf0)),
            contract: address(1),
            interpreter: NativeInterpreter::new().with(ROOT_CODE, |_, _| Ok(Value::Null)),
            config: EngineConfig::default(),
        }
    }

    /// Context with no active frame
    pub fn context(&self, query: bool) -> ExecutionContext {
        let reader: Arc<dyn StateReader> = self.store.clone();
        ExecutionContext::new(
            reader,
            Arc::new(self.interpreter.clone()),
            self.config.clone(),
            self.meta.clone(),
            query,
        )
    }

    /// Context positioned inside the fixture contract's root frame
    pub fn root_context(&self, balance: u64) -> ExecutionContext {
        self.enter_root(balance, false)
    }

    /// Query context positioned inside the fixture contract's root frame
    pub fn query_context(&self) -> ExecutionContext {
        self.enter_root(0, true)
    }

    fn enter_root(&self, balance: u64, query: bool) -> ExecutionContext {
        let code_hash = self.store.put_code(ROOT_CODE.to_vec()).unwrap();
        self.store.set_account(
            account_id(&self.contract),
            AccountState {
                balance: U256::from(balance),
                code_hash,
                ..AccountState::default()
            },
        );

        let mut ctx = self.context(query);
        let call_state = ctx.resolve(&self.contract, true).unwrap();
        let frame = Frame {
            contract: self.contract,
            call_state,
            amount: U256::zero(),
            sender: self.meta.sender,
            sql_recovery_point: 0,
        };
        ctx.frames.push(frame);
        ctx.depth = 1;
        ctx
    }
}
