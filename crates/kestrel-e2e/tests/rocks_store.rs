//! Transactions committed to the RocksDB state store

use kestrel_crypto::account_id;
use kestrel_e2e::{Op, Script, ScriptInterpreter, TestAccount};
use kestrel_primitives::{Address, U256};
use kestrel_storage::{AccountState, Database, RocksStateStore, StateReader, StateWriter};
use kestrel_vm::{EngineConfig, ExecutionContext, TxMeta, VmResult};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Arc<RocksStateStore> {
    let db = Database::new(dir.path());
    db.open().unwrap();
    Arc::new(RocksStateStore::new(db))
}

fn deploy(store: &RocksStateStore, script: &Script, balance: u64) -> Address {
    let address = TestAccount::random().address();
    let code_hash = store.put_code(script.to_code().unwrap()).unwrap();
    let changes = kestrel_storage::ChangeSet {
        accounts: [(
            account_id(&address),
            AccountState {
                balance: U256::from(balance),
                code_hash,
                ..AccountState::default()
            },
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    };
    store.apply(&changes).unwrap();
    address
}

fn execute(
    store: &Arc<RocksStateStore>,
    contract: &Address,
    function: &str,
    height: u64,
) -> VmResult<Value> {
    let reader: Arc<dyn StateReader> = store.clone();
    let mut meta = TxMeta::new(TestAccount::random().address());
    meta.block_height = height;
    let mut ctx = ExecutionContext::new(
        reader,
        Arc::new(ScriptInterpreter),
        EngineConfig::default(),
        meta,
        false,
    );
    let result = ctx.invoke_root(contract, function, "[]", U256::zero());
    let changes = ctx.finish(result.is_ok())?;
    store.apply(&changes).unwrap();
    result
}

#[test]
fn test_committed_transaction_persists() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let receiver = TestAccount::random().address();
    let script = Script::new().function(
        "pay",
        vec![
            Op::SetData {
                key: "paid".to_string(),
                value: "yes".to_string(),
            },
            Op::Send {
                target: receiver.encode(),
                amount: 40,
            },
        ],
    );
    let contract = deploy(&store, &script, 100);

    execute(&store, &contract, "pay", 1).unwrap();

    let id = account_id(&contract);
    assert_eq!(store.get_balance(&id).unwrap(), U256::from(60u64));
    assert_eq!(store.get_balance(&account_id(&receiver)).unwrap(), U256::from(40u64));
    assert_eq!(store.get_storage(&id, b"paid").unwrap(), Some(b"yes".to_vec()));
}

#[test]
fn test_failed_transaction_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let script = Script::new().function(
        "fail",
        vec![
            Op::SetData {
                key: "k".to_string(),
                value: "v".to_string(),
            },
            Op::Fail {
                reason: "rejected".to_string(),
            },
        ],
    );
    let contract = deploy(&store, &script, 10);

    assert!(execute(&store, &contract, "fail", 1).is_err());

    let id = account_id(&contract);
    assert_eq!(store.get_balance(&id).unwrap(), U256::from(10u64));
    assert!(store.get_storage(&id, b"k").unwrap().is_none());
}
