//! Test harness for E2E testing
//!
//! Runs transactions end to end: context creation through the registry,
//! root invocation with the [`ScriptInterpreter`], finish, and application of
//! the resulting change set to an in-memory store.

use crate::builder::{TxBuilder, TxOutcome};
use crate::contracts::{Script, ScriptInterpreter};
use crate::{E2EError, E2EResult};
use k256::ecdsa::SigningKey;
use kestrel_crypto::{
    account_id, public_key_to_address, sha256, short_address, sign, sign_compact, sign_der,
};
use kestrel_primitives::{Address, H256, U256};
use kestrel_storage::{AccountState, MemoryStore, StateReader, StateWriter};
use kestrel_vm::{ContextRegistry, EngineConfig, ExecutionContext, Interpreter, TxMeta};
use std::sync::Arc;

/// Starting block timestamp, in seconds
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Test account with private key and address
#[derive(Clone)]
pub struct TestAccount {
    /// Private key for signing
    private_key: SigningKey,
    /// Derived native address
    address: Address,
}

impl TestAccount {
    /// Create a new random test account
    pub fn random() -> Self {
        let private_key = SigningKey::random(&mut rand::thread_rng());
        let address = public_key_to_address(private_key.verifying_key());
        Self {
            private_key,
            address,
        }
    }

    /// Create from a known private key (hex string without 0x prefix)
    pub fn from_hex(hex: &str) -> E2EResult<Self> {
        let bytes = hex::decode(hex).map_err(|e| E2EError::Setup(e.to_string()))?;
        let private_key =
            SigningKey::from_slice(&bytes).map_err(|e| E2EError::Setup(e.to_string()))?;
        let address = public_key_to_address(private_key.verifying_key());
        Ok(Self {
            private_key,
            address,
        })
    }

    /// Native address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Short-form address, hex with 0x prefix
    pub fn short_address(&self) -> String {
        short_address(self.private_key.verifying_key()).to_hex()
    }

    /// Sign a digest in the native recoverable layout, hex encoded
    pub fn sign_native(&self, digest: &H256) -> E2EResult<String> {
        Ok(hex::encode(sign_compact(digest.as_bytes(), &self.private_key)?))
    }

    /// Sign a digest in the short-form recoverable layout, hex encoded
    pub fn sign_short(&self, digest: &H256) -> E2EResult<String> {
        Ok(hex::encode(sign(digest.as_bytes(), &self.private_key)?.to_bytes()))
    }

    /// Sign a digest as DER, hex encoded
    pub fn sign_der(&self, digest: &H256) -> E2EResult<String> {
        Ok(hex::encode(sign_der(digest.as_bytes(), &self.private_key)?))
    }
}

impl std::fmt::Debug for TestAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestAccount")
            .field("address", &self.address.encode())
            .finish()
    }
}

/// Test harness for E2E engine testing
pub struct TestHarness {
    /// Committed state
    store: Arc<MemoryStore>,
    /// Contract interpreter
    interpreter: Arc<dyn Interpreter>,
    /// Engine configuration
    config: EngineConfig,
    /// Live transaction contexts
    registry: ContextRegistry,
    /// Height of the last executed block
    block_height: u64,
}

impl TestHarness {
    /// Create a harness with in-memory structured stores
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a harness with a specific engine configuration
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            interpreter: Arc::new(ScriptInterpreter),
            config,
            registry: ContextRegistry::new(),
            block_height: 0,
        }
    }

    /// Height of the last executed block
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Committed store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Create a test account holding `balance`
    pub fn create_account(&mut self, balance: u64) -> TestAccount {
        let account = TestAccount::random();
        self.fund(&account.address(), balance);
        account
    }

    /// Set the balance of `address`
    pub fn fund(&mut self, address: &Address, balance: u64) {
        let id = account_id(address);
        let mut state = self.store.get_account_state(&id).ok().flatten().unwrap_or_default();
        state.balance = U256::from(balance);
        self.store.set_account(id, state);
    }

    /// Deploy `script` at a fresh address holding `balance`
    pub fn deploy(&mut self, script: &Script, balance: u64) -> E2EResult<Address> {
        let address = TestAccount::random().address();
        self.deploy_at(address, script, balance)?;
        Ok(address)
    }

    /// Deploy `script` at `address` holding `balance`
    pub fn deploy_at(&mut self, address: Address, script: &Script, balance: u64) -> E2EResult<()> {
        let code_hash = self.store.put_code(script.to_code()?)?;
        self.store.set_account(
            account_id(&address),
            AccountState {
                balance: U256::from(balance),
                code_hash,
                ..AccountState::default()
            },
        );
        tracing::debug!("Deployed contract at {}", address);
        Ok(())
    }

    /// Committed balance of `address`
    pub fn balance(&self, address: &Address) -> E2EResult<U256> {
        Ok(self.store.get_balance(&account_id(address))?)
    }

    /// Committed storage value of `address`
    pub fn storage(&self, address: &Address, key: &str) -> E2EResult<Option<String>> {
        let value = self.store.get_storage(&account_id(address), key.as_bytes())?;
        Ok(value.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Committed structured-store recovery point of `address`
    pub fn sql_recovery_point(&self, address: &Address) -> E2EResult<u64> {
        Ok(self.store.account_state_or_default(&account_id(address))?.sql_recovery_point)
    }

    /// Execute `tx` from `sender` in a new block.
    ///
    /// Failed transactions are reported in the outcome; only harness-level
    /// problems return an error.
    pub fn execute(&mut self, sender: &TestAccount, tx: TxBuilder) -> E2EResult<TxOutcome> {
        if !tx.query {
            self.block_height += 1;
        }
        let meta = TxMeta {
            sender: sender.address(),
            origin: sender.address(),
            block_height: self.block_height,
            timestamp_nanos: (GENESIS_TIMESTAMP + self.block_height) * 1_000_000_000,
            tx_hash: sha256(format!("{}:{}:{}", sender.address(), tx.function, self.block_height).as_bytes()),
        };
        let args = serde_json::to_string(&tx.args).map_err(|e| E2EError::Setup(e.to_string()))?;
        let reader: Arc<dyn StateReader> = self.store.clone();
        let ctx = ExecutionContext::new(
            reader,
            Arc::clone(&self.interpreter),
            self.config.clone(),
            meta,
            tx.query,
        );

        let lease = self.registry.create(ctx);
        let (result, transfer_failed) = lease.with(|ctx| {
            let result = ctx.invoke_root(&tx.contract, &tx.function, &args, tx.amount);
            Ok((result, ctx.transfer_failed()))
        })?;

        let outcome = match result {
            Ok(value) => match lease.finish(true) {
                Ok(changes) => {
                    self.store.apply(&changes)?;
                    TxOutcome {
                        value: Some(value),
                        error: None,
                        error_class: None,
                        transfer_failed,
                        committed: !tx.query,
                    }
                }
                Err(e) => TxOutcome {
                    value: Some(value),
                    error: Some(e.to_string()),
                    error_class: Some(e.class()),
                    transfer_failed,
                    committed: false,
                },
            },
            Err(e) => {
                // A poisoned context reports its poisoning error again here.
                let _ = lease.finish(false);
                TxOutcome {
                    value: None,
                    error: Some(e.to_string()),
                    error_class: Some(e.class()),
                    transfer_failed,
                    committed: false,
                }
            }
        };
        tracing::debug!(
            "Block {}: {}.{} -> {:?}",
            self.block_height,
            tx.contract,
            tx.function,
            outcome.error
        );
        Ok(outcome)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
