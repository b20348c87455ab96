//! Registry behaviour across threads

use kestrel_crypto::account_id;
use kestrel_primitives::{Address, U256};
use kestrel_storage::{AccountState, MemoryStore, StateReader, StateWriter};
use kestrel_vm::{
    ContextRegistry, EngineConfig, ExecutionContext, HostCall, HostReply, Interpreter,
    NativeInterpreter, TxMeta, VmError,
};
use serde_json::{json, Value};
use std::sync::Arc;

const COUNTER: &[u8] = b"counter";

fn address(byte: u8) -> Address {
    let mut bytes = [0u8; Address::LEN];
    bytes[Address::LEN - 1] = byte;
    Address::from_bytes(bytes)
}

fn counter() -> Arc<dyn Interpreter> {
    Arc::new(NativeInterpreter::new().with(COUNTER, |ctx, _| {
        let current = ctx
            .get_data(b"count")?
            .map(|v| u64::from_be_bytes(v.try_into().unwrap_or([0; 8])))
            .unwrap_or(0);
        ctx.set_data(b"count".to_vec(), (current + 1).to_be_bytes().to_vec())?;
        Ok(json!(current + 1))
    }))
}

fn deploy(store: &MemoryStore, contract: &Address) {
    let code_hash = store.put_code(COUNTER.to_vec()).unwrap();
    store.set_account(
        account_id(contract),
        AccountState {
            code_hash,
            ..AccountState::default()
        },
    );
}

fn new_context(store: &Arc<MemoryStore>, interpreter: &Arc<dyn Interpreter>, sender: u8) -> ExecutionContext {
    let reader: Arc<dyn StateReader> = store.clone();
    ExecutionContext::new(
        reader,
        Arc::clone(interpreter),
        EngineConfig::default(),
        TxMeta::new(address(sender)),
        false,
    )
}

#[test]
fn test_concurrent_transactions_are_isolated() {
    let store = Arc::new(MemoryStore::new());
    let interpreter = counter();
    let registry = ContextRegistry::new();
    let contracts: Vec<Address> = (1..=8).map(address).collect();
    for contract in &contracts {
        deploy(&store, contract);
    }

    std::thread::scope(|scope| {
        for (i, contract) in contracts.iter().enumerate() {
            let store = &store;
            let interpreter = &interpreter;
            let registry = &registry;
            scope.spawn(move || {
                let lease = registry.create(new_context(store, interpreter, 100 + i as u8));
                for _ in 0..3 {
                    lease
                        .with(|ctx| ctx.invoke_root(contract, "bump", "[]", U256::zero()))
                        .unwrap();
                }
                let changes = lease.finish(true).unwrap();
                store.apply(&changes).unwrap();
            });
        }
    });

    assert!(registry.is_empty());
    for contract in &contracts {
        let count = store.get_storage(&account_id(contract), b"count").unwrap();
        assert_eq!(count, Some(3u64.to_be_bytes().to_vec()));
    }
}

#[test]
fn test_dropped_lease_discards_changes() {
    let store = Arc::new(MemoryStore::new());
    let interpreter = counter();
    let registry = ContextRegistry::new();
    let contract = address(1);
    deploy(&store, &contract);

    {
        let lease = registry.create(new_context(&store, &interpreter, 100));
        let value: Value = lease
            .with(|ctx| ctx.invoke_root(&contract, "bump", "[]", U256::zero()))
            .unwrap();
        assert_eq!(value, json!(1));
    }

    assert!(registry.is_empty());
    assert!(store
        .get_storage(&account_id(&contract), b"count")
        .unwrap()
        .is_none());
}

#[test]
fn test_dispatch_requires_active_frame() {
    let store = Arc::new(MemoryStore::new());
    let interpreter = counter();
    let registry = ContextRegistry::new();
    let lease = registry.create(new_context(&store, &interpreter, 100));

    assert_eq!(
        lease.dispatch(HostCall::GetOrigin).unwrap(),
        HostReply::Text(address(100).encode())
    );
    assert!(matches!(
        lease.dispatch(HostCall::GetContractId),
        Err(VmError::Internal(_))
    ));
}
