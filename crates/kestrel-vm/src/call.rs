//! Contract invocation: root entry, call, delegate-call, send

use crate::call_state::CallStateId;
use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use crate::frame::{CallGuard, Frame};
use crate::interpreter::{decode_args, CallInfo, CallKind};
use kestrel_primitives::{Address, U256};
use serde_json::Value;
use std::sync::Arc;

impl ExecutionContext {
    fn check_depth(&self) -> VmResult<()> {
        if self.depth >= self.config.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.config.max_call_depth));
        }
        Ok(())
    }

    fn contract_code(&self, id: CallStateId, address: &Address) -> VmResult<Vec<u8>> {
        self.call_states
            .get(id)
            .code()
            .map(<[u8]>::to_vec)
            .ok_or(VmError::UnknownContract(*address))
    }

    fn move_value(&mut self, from: CallStateId, to: CallStateId, amount: U256) -> VmResult<()> {
        match self.call_states.transfer(from, to, amount) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(self.poison(e)),
            Err(e) => {
                self.mark_transfer_failed(&e);
                Err(e)
            }
        }
    }

    fn run(&mut self, frame: Option<Frame>, code: &[u8], info: &CallInfo) -> VmResult<Value> {
        let interpreter = Arc::clone(&self.interpreter);
        let mut guard = CallGuard::enter(self, frame);
        let result = interpreter.invoke(&mut guard, code, info);
        drop(guard);
        result.map_err(|e| {
            tracing::debug!("Call {}.{} failed: {}", info.contract, info.function, e);
            self.poison(e)
        })
    }

    /// Run the transaction entry point: move `amount` from the transaction
    /// sender to `contract` and invoke `function` with the root frame.
    pub fn invoke_root(
        &mut self,
        contract: &Address,
        function: &str,
        args: &str,
        amount: U256,
    ) -> VmResult<Value> {
        self.ensure_live()?;
        if !self.frames.is_empty() {
            return Err(VmError::Internal("root frame already active".to_string()));
        }
        if self.is_query() && !amount.is_zero() {
            return Err(self.deny("value transfer"));
        }

        let sender = self.meta().sender;
        let target = self.resolve(contract, true)?;
        let code = self.contract_code(target, contract)?;
        let args = decode_args(args)?;
        self.check_depth()?;

        if !amount.is_zero() {
            let from = self.resolve(&sender, false)?;
            self.move_value(from, target, amount)?;
        }

        let frame = Frame {
            contract: *contract,
            call_state: target,
            amount,
            sender,
            sql_recovery_point: self.call_states.get(target).cur_state.sql_recovery_point,
        };
        let info = CallInfo {
            contract: *contract,
            function: function.to_string(),
            args,
            amount,
            kind: CallKind::Root,
        };
        tracing::debug!("Invoke {}.{} from {}", contract, function, sender);
        self.run(Some(frame), &code, &info)
    }

    /// Call `function` of `target` with its own frame and storage, attaching
    /// `amount` from the current contract.
    ///
    /// On any failure the caller's frame is current again when this returns.
    /// Balance and storage effects of a failed callee stay in place until the
    /// caller unwinds its recovery point.
    pub fn call(
        &mut self,
        target: &Address,
        function: &str,
        args: &str,
        amount: U256,
    ) -> VmResult<Value> {
        self.ensure_live()?;
        if self.is_query() && !amount.is_zero() {
            return Err(self.deny("value transfer"));
        }
        let caller = self.current_frame()?.clone();

        let callee = self.resolve(target, true)?;
        let code = self.contract_code(callee, target)?;
        let args = decode_args(args)?;
        self.check_depth()?;

        if !amount.is_zero() {
            self.move_value(caller.call_state, callee, amount)?;
        }
        if self.recovery.is_active() {
            self.checkpoint(Some(caller.call_state), callee, amount, true)?;
        }

        let frame = Frame {
            contract: *target,
            call_state: callee,
            amount,
            sender: caller.contract,
            sql_recovery_point: self.call_states.get(callee).cur_state.sql_recovery_point,
        };
        let info = CallInfo {
            contract: *target,
            function: function.to_string(),
            args,
            amount,
            kind: CallKind::Call,
        };
        tracing::debug!("Call {}.{} from {} (amount {})", target, function, caller.contract, amount);
        self.run(Some(frame), &code, &info)
    }

    /// Run `function` of `target`'s code against the current frame and
    /// storage. No value moves and no frame or call state is created for
    /// `target`.
    pub fn delegate_call(&mut self, target: &Address, function: &str, args: &str) -> VmResult<Value> {
        self.ensure_live()?;
        let caller = self.current_frame()?.clone();

        let code = match self.reader.get_account_code(&kestrel_crypto::account_id(target)) {
            Ok(Some(code)) => code,
            Ok(None) => return Err(VmError::UnknownContract(*target)),
            Err(e) => return Err(self.poison(e.into())),
        };
        let args = decode_args(args)?;
        self.check_depth()?;

        if self.recovery.is_active() {
            self.checkpoint(None, caller.call_state, U256::zero(), true)?;
        }

        let info = CallInfo {
            contract: *target,
            function: function.to_string(),
            args,
            amount: U256::zero(),
            kind: CallKind::Delegate,
        };
        tracing::debug!("Delegate {}.{} from {}", target, function, caller.contract);
        self.run(None, &code, &info)
    }

    /// Move `amount` from the current contract to `target`
    pub fn send(&mut self, target: &Address, amount: U256) -> VmResult<()> {
        self.ensure_live()?;
        if self.is_query() {
            return Err(self.deny("send"));
        }
        let sender = self.current_frame()?.call_state;
        let receiver = self.resolve(target, false)?;

        self.move_value(sender, receiver, amount)?;
        if self.recovery.is_active() {
            self.checkpoint(Some(sender), receiver, amount, false)?;
        }
        tracing::debug!("Sent {} to {}", amount, target);
        Ok(())
    }

    /// Call under a fresh recovery point: a non-fatal failure of the callee
    /// is rolled back and returned, success keeps its effects.
    pub fn pcall(
        &mut self,
        target: &Address,
        function: &str,
        args: &str,
        amount: U256,
    ) -> VmResult<Value> {
        let seq = self.set_recovery_point()?;
        let result = self.call(target, function, args, amount);
        match &result {
            Err(e) if e.is_fatal() => {}
            Err(_) => self.clear_recovery(seq, true)?,
            Ok(_) => self.clear_recovery(seq, false)?,
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{address, Fixture};
    use crate::EngineConfig;
    use kestrel_crypto::account_id;
    use kestrel_storage::{AccountState, StateWriter};
    use serde_json::json;

    const CALLEE: &[u8] = b"callee";
    const FAILING: &[u8] = b"failing";
    const RECURSE: &[u8] = b"recurse";

    fn fixture() -> Fixture {
        let mut fx = Fixture::new();
        fx.interpreter
            .register(CALLEE, |ctx, call| {
                ctx.set_data(b"touched".to_vec(), call.function.as_bytes().to_vec())?;
                Ok(json!({
                    "contract": ctx.contract_id()?.encode(),
                    "sender": ctx.sender()?.encode(),
                    "amount": ctx.amount()?,
                    "depth": ctx.depth(),
                }))
            })
            .register(FAILING, |ctx, _| {
                ctx.set_data(b"touched".to_vec(), b"fail".to_vec())?;
                Err(VmError::ContractFailed("boom".into()))
            })
            .register(RECURSE, |ctx, call| {
                let me = ctx.contract_id()?;
                ctx.call(&me, &call.function, "[]", U256::zero())
            });
        fx
    }

    fn deploy(fx: &Fixture, byte: u8, code: &[u8], balance: u64) -> Address {
        let hash = fx.store.put_code(code.to_vec()).unwrap();
        let addr = address(byte);
        fx.store.set_account(
            account_id(&addr),
            AccountState {
                balance: U256::from(balance),
                code_hash: hash,
                ..AccountState::default()
            },
        );
        addr
    }

    // ==================== call ====================

    #[test]
    fn test_call_switches_frame_and_restores() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(100);
        let root = ctx.current_frame().unwrap().clone();

        let ret = ctx.call(&b, "hello", "[]", U256::from(30u64)).unwrap();
        assert_eq!(ret["contract"], json!(b.encode()));
        assert_eq!(ret["sender"], json!(fx.contract.encode()));
        assert_eq!(ret["amount"], json!("30"));
        assert_eq!(ret["depth"], json!(2));

        assert_eq!(ctx.current_frame().unwrap(), &root);
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.get_balance(None).unwrap(), U256::from(70u64));
        assert_eq!(ctx.get_balance(Some(&b)).unwrap(), U256::from(30u64));
    }

    #[test]
    fn test_call_failure_restores_frame() {
        let fx = fixture();
        let c = deploy(&fx, 21, FAILING, 0);
        let mut ctx = fx.root_context(100);
        let root = ctx.current_frame().unwrap().clone();

        let err = ctx.call(&c, "f", "[]", U256::zero()).unwrap_err();
        assert!(matches!(err, VmError::ContractFailed(_)));
        assert_eq!(ctx.current_frame().unwrap(), &root);
        assert_eq!(ctx.frames().len(), 1);
    }

    #[test]
    fn test_call_unknown_contract() {
        let fx = fixture();
        let mut ctx = fx.root_context(100);
        let err = ctx.call(&address(99), "f", "[]", U256::from(5u64)).unwrap_err();
        assert!(matches!(err, VmError::UnknownContract(_)));
        assert_eq!(ctx.get_balance(None).unwrap(), U256::from(100u64));
        assert!(!ctx.transfer_failed());
    }

    #[test]
    fn test_call_bad_args_touch_nothing() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(100);
        ctx.set_recovery_point().unwrap();

        let err = ctx.call(&b, "f", "[1,", U256::from(5u64)).unwrap_err();
        assert!(matches!(err, VmError::InvalidArguments(_)));
        assert_eq!(ctx.get_balance(None).unwrap(), U256::from(100u64));
        assert_eq!(ctx.recovery_log().len(), 1);
    }

    #[test]
    fn test_call_insufficient_balance() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(10);
        ctx.set_recovery_point().unwrap();

        let err = ctx.call(&b, "f", "[]", U256::from(11u64)).unwrap_err();
        assert!(matches!(err, VmError::InsufficientBalance { .. }));
        assert!(ctx.transfer_failed());
        assert!(!ctx.is_poisoned());
        assert_eq!(ctx.get_balance(None).unwrap(), U256::from(10u64));
        assert_eq!(ctx.get_balance(Some(&b)).unwrap(), U256::zero());
        // no checkpoint was pushed for the failed transfer
        assert_eq!(ctx.recovery_log().len(), 1);
    }

    #[test]
    fn test_call_pushes_checkpoint_when_chain_active() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(100);

        ctx.call(&b, "f", "[]", U256::from(1u64)).unwrap();
        assert!(ctx.recovery_log().is_empty());

        ctx.set_recovery_point().unwrap();
        ctx.call(&b, "f", "[]", U256::from(1u64)).unwrap();
        let head = ctx.recovery_log().get(2).unwrap();
        assert_eq!(head.amount, U256::from(1u64));
        assert!(head.sender.is_some());
        assert!(head.storage_snapshot.is_some());
    }

    #[test]
    fn test_call_depth_limit() {
        let mut fx = fixture();
        fx.config = EngineConfig {
            max_call_depth: 4,
            ..EngineConfig::default()
        };
        let r = deploy(&fx, 22, RECURSE, 0);
        let mut ctx = fx.root_context(0);

        let err = ctx.call(&r, "loop", "[]", U256::zero()).unwrap_err();
        assert!(matches!(err, VmError::CallDepthExceeded(4)));
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.frames().len(), 1);
    }

    #[test]
    fn test_query_call_with_value_denied() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.query_context();
        assert!(matches!(
            ctx.call(&b, "f", "[]", U256::one()),
            Err(VmError::PermissionDenied(_))
        ));
        // value-free calls run, but writes inside are rejected
        assert!(matches!(
            ctx.call(&b, "f", "[]", U256::zero()),
            Err(VmError::PermissionDenied("set"))
        ));
    }

    // ==================== delegate_call ====================

    #[test]
    fn test_delegate_keeps_frame_and_storage() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(100);
        let touched = ctx.call_states().len();

        let ret = ctx.delegate_call(&b, "borrowed", "[]").unwrap();
        assert_eq!(ret["contract"], json!(fx.contract.encode()));
        assert_eq!(ret["depth"], json!(2));
        assert_eq!(ctx.call_states().len(), touched);
        assert_eq!(ctx.get_data(b"touched").unwrap(), Some(b"borrowed".to_vec()));
    }

    #[test]
    fn test_delegate_checkpoint_guards_caller() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(100);
        let seq = ctx.set_recovery_point().unwrap();

        ctx.delegate_call(&b, "borrowed", "[]").unwrap();
        let head = ctx.recovery_log().get(seq + 1).unwrap();
        assert_eq!(head.call_state, ctx.current_frame().unwrap().call_state);
        assert!(head.sender.is_none());

        ctx.unwind(seq, true).unwrap();
        assert!(ctx.get_data(b"touched").unwrap().is_none());
    }

    #[test]
    fn test_delegate_unknown_contract() {
        let fx = fixture();
        let mut ctx = fx.root_context(100);
        assert!(matches!(
            ctx.delegate_call(&address(98), "f", "[]"),
            Err(VmError::UnknownContract(_))
        ));
    }

    // ==================== send / pcall ====================

    #[test]
    fn test_send_query_denied() {
        let fx = fixture();
        let mut ctx = fx.query_context();
        assert!(matches!(
            ctx.send(&address(3), U256::one()),
            Err(VmError::PermissionDenied("send"))
        ));
    }

    #[test]
    fn test_send_insufficient_sets_flag() {
        let fx = fixture();
        let mut ctx = fx.root_context(1);
        assert!(ctx.send(&address(3), U256::from(2u64)).is_err());
        assert!(ctx.transfer_failed());
    }

    #[test]
    fn test_pcall_rolls_back_failed_callee() {
        let fx = fixture();
        let c = deploy(&fx, 21, FAILING, 0);
        let mut ctx = fx.root_context(100);

        assert!(ctx.pcall(&c, "f", "[]", U256::from(30u64)).is_err());
        assert_eq!(ctx.get_balance(None).unwrap(), U256::from(100u64));
        assert_eq!(ctx.get_balance(Some(&c)).unwrap(), U256::zero());
        assert!(ctx.recovery_log().is_empty());
    }

    #[test]
    fn test_pcall_keeps_successful_callee() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.root_context(100);

        ctx.pcall(&b, "f", "[]", U256::from(30u64)).unwrap();
        assert_eq!(ctx.get_balance(None).unwrap(), U256::from(70u64));
        assert_eq!(ctx.get_balance(Some(&b)).unwrap(), U256::from(30u64));
    }

    // ==================== invoke_root ====================

    #[test]
    fn test_invoke_root_transfers_from_sender() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        fx.store.set_account(
            account_id(&fx.meta.sender),
            AccountState::with_balance(U256::from(50u64)),
        );
        let mut ctx = fx.context(false);

        let ret = ctx.invoke_root(&b, "main", "[]", U256::from(20u64)).unwrap();
        assert_eq!(ret["sender"], json!(fx.meta.sender.encode()));
        assert_eq!(ret["depth"], json!(1));
        assert!(ctx.frames().is_empty());

        let changes = ctx.finish(true).unwrap();
        assert_eq!(changes.accounts[&account_id(&b)].balance, U256::from(20u64));
        assert_eq!(
            changes.accounts[&account_id(&fx.meta.sender)].balance,
            U256::from(30u64)
        );
    }

    #[test]
    fn test_invoke_root_query_with_value_denied() {
        let fx = fixture();
        let b = deploy(&fx, 20, CALLEE, 0);
        let mut ctx = fx.context(true);
        assert!(matches!(
            ctx.invoke_root(&b, "main", "[]", U256::one()),
            Err(VmError::PermissionDenied(_))
        ));
    }
}
