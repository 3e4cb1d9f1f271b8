//! Actor-based access to the staking engine
//!
//! The engine is a single writer: one Tokio task owns the
//! [`ResourceSystem`] and applies [`Action`]s in mailbox order. Callers
//! hold a cloneable [`SystemHandle`] and await a oneshot reply per
//! request. The bounded mailbox gives backpressure.
//!
//! ```text
//!   SystemHandle (Clone) ──mpsc (bounded)──▶ SystemActor ──▶ ResourceSystem
//!          ▲                                     │
//!          └──────────── oneshot reply ──────────┘
//! ```

use crate::asset::Asset;
use crate::host::Host;
use crate::metrics::Metrics;
use crate::state::ChainState;
use crate::system::{HousekeepingReport, ResourceSystem, SellOutcome};
use crate::types::{AccountName, LoanKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One engine action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Action {
    DelegateBandwidth {
        from: AccountName,
        receiver: AccountName,
        net: Asset,
        cpu: Asset,
        transfer: bool,
    },
    UndelegateBandwidth {
        from: AccountName,
        receiver: AccountName,
        net: Asset,
        cpu: Asset,
    },
    Refund {
        owner: AccountName,
    },
    Deposit {
        owner: AccountName,
        amount: Asset,
    },
    Withdraw {
        owner: AccountName,
        amount: Asset,
    },
    BuyRex {
        from: AccountName,
        amount: Asset,
    },
    UnstakeToRex {
        owner: AccountName,
        receiver: AccountName,
        from_net: Asset,
        from_cpu: Asset,
    },
    SellRex {
        from: AccountName,
        rex: Asset,
    },
    CancelRexOrder {
        owner: AccountName,
    },
    Rent {
        kind: LoanKind,
        from: AccountName,
        receiver: AccountName,
        loan_payment: Asset,
        loan_fund: Asset,
    },
    FundLoan {
        kind: LoanKind,
        from: AccountName,
        loan_num: u64,
        payment: Asset,
    },
    DefundLoan {
        kind: LoanKind,
        from: AccountName,
        loan_num: u64,
        amount: Asset,
    },
    UpdateRex {
        owner: AccountName,
    },
    RexExec {
        user: AccountName,
        max: u16,
    },
    Consolidate {
        owner: AccountName,
    },
    MoveToSavings {
        owner: AccountName,
        rex: Asset,
    },
    MoveFromSavings {
        owner: AccountName,
        rex: Asset,
    },
    CloseRex {
        owner: AccountName,
    },
    ChannelToRex {
        from: AccountName,
        amount: Asset,
    },
    ChannelNamebidToRex {
        amount: Asset,
    },
    RegisterProducer {
        producer: AccountName,
    },
    UnregisterProducer {
        producer: AccountName,
    },
    RegisterProxy {
        proxy: AccountName,
        is_proxy: bool,
    },
    VoteProducer {
        voter: AccountName,
        proxy: Option<AccountName>,
        producers: Vec<AccountName>,
    },
}

/// Value returned by a committed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionReceipt {
    /// Action had no return value
    Done,
    /// REX shares received
    Rex(Asset),
    /// Sell request outcome
    Sold(SellOutcome),
    /// New loan number
    LoanOpened(u64),
    /// Housekeeping work done
    Housekeeping(HousekeepingReport),
}

impl<H: Host> ResourceSystem<H> {
    /// Dispatch `action` to its handler
    pub fn apply(&mut self, action: Action) -> Result<ActionReceipt> {
        use ActionReceipt::Done;
        match action {
            Action::DelegateBandwidth {
                from,
                receiver,
                net,
                cpu,
                transfer,
            } => self
                .delegate_bandwidth(&from, &receiver, net, cpu, transfer)
                .map(|_| Done),
            Action::UndelegateBandwidth {
                from,
                receiver,
                net,
                cpu,
            } => self
                .undelegate_bandwidth(&from, &receiver, net, cpu)
                .map(|_| Done),
            Action::Refund { owner } => self.refund(&owner).map(|_| Done),
            Action::Deposit { owner, amount } => self.deposit(&owner, amount).map(|_| Done),
            Action::Withdraw { owner, amount } => self.withdraw(&owner, amount).map(|_| Done),
            Action::BuyRex { from, amount } => self.buy_rex(&from, amount).map(ActionReceipt::Rex),
            Action::UnstakeToRex {
                owner,
                receiver,
                from_net,
                from_cpu,
            } => self
                .unstake_to_rex(&owner, &receiver, from_net, from_cpu)
                .map(ActionReceipt::Rex),
            Action::SellRex { from, rex } => self.sell_rex(&from, rex).map(ActionReceipt::Sold),
            Action::CancelRexOrder { owner } => self.cancel_rex_order(&owner).map(|_| Done),
            Action::Rent {
                kind,
                from,
                receiver,
                loan_payment,
                loan_fund,
            } => self
                .rent(kind, &from, &receiver, loan_payment, loan_fund)
                .map(ActionReceipt::LoanOpened),
            Action::FundLoan {
                kind,
                from,
                loan_num,
                payment,
            } => self.fund_loan(kind, &from, loan_num, payment).map(|_| Done),
            Action::DefundLoan {
                kind,
                from,
                loan_num,
                amount,
            } => self.defund_loan(kind, &from, loan_num, amount).map(|_| Done),
            Action::UpdateRex { owner } => self.update_rex(&owner).map(|_| Done),
            Action::RexExec { user, max } => {
                self.rex_exec(&user, max).map(ActionReceipt::Housekeeping)
            }
            Action::Consolidate { owner } => self.consolidate(&owner).map(|_| Done),
            Action::MoveToSavings { owner, rex } => self.move_to_savings(&owner, rex).map(|_| Done),
            Action::MoveFromSavings { owner, rex } => {
                self.move_from_savings(&owner, rex).map(|_| Done)
            }
            Action::CloseRex { owner } => self.close_rex(&owner).map(|_| Done),
            Action::ChannelToRex { from, amount } => {
                self.channel_to_rex(&from, amount).map(|_| Done)
            }
            Action::ChannelNamebidToRex { amount } => {
                self.channel_namebid_to_rex(amount).map(|_| Done)
            }
            Action::RegisterProducer { producer } => self.register_producer(&producer).map(|_| Done),
            Action::UnregisterProducer { producer } => {
                self.unregister_producer(&producer).map(|_| Done)
            }
            Action::RegisterProxy { proxy, is_proxy } => {
                self.register_proxy(&proxy, is_proxy).map(|_| Done)
            }
            Action::VoteProducer {
                voter,
                proxy,
                producers,
            } => self.vote_producer(&voter, proxy, producers).map(|_| Done),
        }
    }
}

/// Message sent to the engine actor
#[derive(Debug)]
pub enum SystemMessage {
    /// Apply an action
    Execute {
        action: Action,
        response: oneshot::Sender<Result<ActionReceipt>>,
    },

    /// Copy of the current state
    GetState {
        response: oneshot::Sender<ChainState>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the engine
#[derive(Debug)]
pub struct SystemActor<H: Host> {
    system: ResourceSystem<H>,
    mailbox: mpsc::Receiver<SystemMessage>,
    metrics: Metrics,
}

impl<H: Host> SystemActor<H> {
    /// Create new actor
    pub fn new(
        system: ResourceSystem<H>,
        mailbox: mpsc::Receiver<SystemMessage>,
        metrics: Metrics,
    ) -> Self {
        metrics.observe_state(system.state());
        Self {
            system,
            mailbox,
            metrics,
        }
    }

    /// Run until shutdown or until every handle is dropped; returns the
    /// engine for persistence
    pub async fn run(mut self) -> ResourceSystem<H> {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                SystemMessage::Execute { action, response } => {
                    let started = Instant::now();
                    let result = self.system.apply(action);
                    self.metrics
                        .record_action_duration(started.elapsed().as_secs_f64());
                    self.metrics.record_action(&result);
                    self.metrics.observe_state(self.system.state());
                    let _ = response.send(result);
                }
                SystemMessage::GetState { response } => {
                    let _ = response.send(self.system.state().clone());
                }
                SystemMessage::Shutdown => {
                    tracing::info!("engine actor shutting down");
                    break;
                }
            }
        }
        self.system
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct SystemHandle {
    sender: mpsc::Sender<SystemMessage>,
}

impl SystemHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<SystemMessage>) -> Self {
        Self { sender }
    }

    /// Apply an action and wait for its receipt
    pub async fn execute(&self, action: Action) -> Result<ActionReceipt> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SystemMessage::Execute {
                action,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Current state
    pub async fn state(&self) -> Result<ChainState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SystemMessage::GetState { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SystemMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the engine actor on the current runtime
pub fn spawn_system_actor<H>(
    system: ResourceSystem<H>,
    capacity: usize,
    metrics: Metrics,
) -> (SystemHandle, JoinHandle<ResourceSystem<H>>)
where
    H: Host + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let actor = SystemActor::new(system, rx, metrics);
    let task = tokio::spawn(actor.run());
    (SystemHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::testkit::{acct, core, setup};

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, task) = spawn_system_actor(setup(), 16, Metrics::new().unwrap());
        handle.shutdown().await.unwrap();
        let system = task.await.unwrap();
        assert!(system.producer(&acct("prod.a")).is_some());
    }

    #[tokio::test]
    async fn test_actor_executes_in_order() {
        let mut sys = setup();
        let alice = acct("alice");
        sys.host_mut().issue(&alice, 10_0000);
        let metrics = Metrics::new().unwrap();
        let (handle, task) = spawn_system_actor(sys, 16, metrics.clone());

        let receipt = handle
            .execute(Action::Deposit {
                owner: alice.clone(),
                amount: core(4_0000),
            })
            .await
            .unwrap();
        assert_eq!(receipt, ActionReceipt::Done);

        let err = handle
            .execute(Action::BuyRex {
                from: alice.clone(),
                amount: core(4_0000),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));

        let state = handle.state().await.unwrap();
        assert_eq!(state.funds.balance_of(&alice), 4_0000);
        assert_eq!(metrics.actions_total.get(), 1);
        assert_eq!(
            metrics
                .action_failures
                .with_label_values(&["precondition_failed"])
                .get(),
            1
        );

        handle.shutdown().await.unwrap();
        let system = task.await.unwrap();
        assert_eq!(system.host().balance_of(&alice), 6_0000);
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (handle, task) = spawn_system_actor(setup(), 4, Metrics::new().unwrap());
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        let err = handle
            .execute(Action::Refund { owner: acct("alice") })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }

    #[test]
    fn test_action_encodes_with_bincode() {
        let action = Action::RexExec {
            user: acct("bob"),
            max: 5,
        };
        let bytes = bincode::serialize(&action).unwrap();
        let decoded: Action = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, action);
    }
}
