//! This module implements the top level DisputeManager. It polls the chain, records the
//! transactions of every active setup, replays them through the [`DisputeStateMachine`] and queues
//! whatever the resulting duty asks for.

use std::{sync::Arc, time::Duration};

use dispute_db::{
    outgoing::OutgoingDb,
    persistent::{config::RetryPolicy, sqlite::execute_with_retries},
    setup::SetupDb,
    templates::TemplateDb,
    tracker::ChainTxDb,
    DisputeDb,
};
use dispute_params::DisputeParams;
use dispute_primitives::types::{BitcoinBlockHeight, Role, SetupId, SetupStatus};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, error, info};
use wots::CommitmentSecret;

use crate::{
    chain::{scan_blocks, ChainClient},
    dispute_state_machine::{DisputeState, DisputeStateMachine},
    errors::DisputeManagerErr,
    executors::DutyExecutor,
    oracle::TraceOracle,
    shutdown::ShutdownGuard,
};

/// How the manager follows the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// The role of the local agent.
    pub role: Role,

    /// Blocks a transaction has to be buried under before it is acted upon.
    pub finality_depth: u64,

    /// The first block scanned for a setup that was never scanned before.
    pub start_height: BitcoinBlockHeight,

    /// Time between two ticks.
    pub poll_interval: Duration,

    /// Time a single call to the chain client may take.
    pub rpc_timeout: Duration,

    /// Time the trace oracle may take to answer for one duty.
    pub oracle_timeout: Duration,

    /// Retries of failed database calls.
    pub db_retry: RetryPolicy,
}

/// Drives every active setup of the local agent.
#[derive(Debug)]
pub struct DisputeManager<D, C, O> {
    cfg: ManagerConfig,
    params: DisputeParams,
    secret: CommitmentSecret,
    db: Arc<D>,
    chain: Arc<C>,
    oracle: O,
}

impl<D, C, O> DisputeManager<D, C, O>
where
    D: DisputeDb + 'static,
    C: ChainClient + 'static,
    O: TraceOracle + Clone + 'static,
{
    /// Creates a manager. `params` must be the parameters every stored graph was built with.
    pub const fn new(
        cfg: ManagerConfig,
        params: DisputeParams,
        secret: CommitmentSecret,
        db: Arc<D>,
        chain: Arc<C>,
        oracle: O,
    ) -> Self {
        Self {
            cfg,
            params,
            secret,
            db,
            chain,
            oracle,
        }
    }

    /// Runs the polling loop on its own task until `shutdown` fires.
    pub fn spawn(self, mut shutdown: ShutdownGuard) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(role = %self.cfg.role, interval = ?self.cfg.poll_interval, "starting dispute manager");
            loop {
                if shutdown.should_shutdown() {
                    break;
                }

                match self.tick().await {
                    Ok(processed) => debug!(%processed, "tick complete"),
                    Err(e) => error!(%e, "tick failed"),
                }

                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(self.cfg.poll_interval) => {}
                }
            }
            info!("dispute manager stopped");
        })
    }

    /// Processes every active setup once. Returns the number of setups processed without error.
    pub async fn tick(&self) -> Result<usize, DisputeManagerErr> {
        let tip = timeout(self.cfg.rpc_timeout, self.chain.get_block_count())
            .await
            .map_err(|_| DisputeManagerErr::Timeout("fetching the chain tip".to_string()))??;

        let Some(finalized) = tip.checked_sub(self.cfg.finality_depth) else {
            debug!(%tip, "chain is shorter than the finality depth");
            return Ok(0);
        };

        let setups = execute_with_retries(&self.cfg.db_retry, || {
            self.db.get_setups_with_status(SetupStatus::Active)
        })
        .await?;

        let results = join_all(
            setups
                .iter()
                .map(|setup_id| self.process_setup(setup_id, finalized, tip)),
        )
        .await;

        let mut processed = 0;
        for (setup_id, result) in setups.iter().zip(results) {
            match result {
                Ok(()) => processed += 1,
                Err(e) => error!(%setup_id, %e, "failed to process setup"),
            }
        }

        Ok(processed)
    }

    async fn process_setup(
        &self,
        setup_id: &SetupId,
        finalized: BitcoinBlockHeight,
        tip: BitcoinBlockHeight,
    ) -> Result<(), DisputeManagerErr> {
        let retry = &self.cfg.db_retry;
        let set = execute_with_retries(retry, || self.db.get_templates(setup_id))
            .await?
            .ok_or_else(|| DisputeManagerErr::MissingTemplates(setup_id.clone()))?;
        let mut confirmed =
            execute_with_retries(retry, || self.db.get_confirmed_txs(setup_id)).await?;

        let from = execute_with_retries(retry, || self.db.get_last_scanned_height(setup_id))
            .await?
            .map_or(self.cfg.start_height, |height| height + 1);
        if from <= finalized {
            let found = scan_blocks(self.chain.as_ref(), &set, &confirmed, from, finalized).await?;
            for tx in &found {
                info!(%setup_id, template = %tx.name, txid = %tx.txid, height = %tx.height, "template confirmed");
                execute_with_retries(retry, || self.db.add_confirmed_tx(setup_id, tx.clone()))
                    .await?;
            }
            execute_with_retries(retry, || {
                self.db.set_last_scanned_height(setup_id, finalized)
            })
            .await?;
            confirmed.extend(found);
        }

        let decision = DisputeStateMachine::new(self.cfg.role, &set, &self.params)
            .replay(&confirmed, tip)?;

        if let DisputeState::Resolved(outcome) = decision.state {
            info!(%setup_id, ?outcome, "dispute resolved");
            execute_with_retries(retry, || {
                self.db.set_setup_status(setup_id, SetupStatus::from(outcome))
            })
            .await?;
            return Ok(());
        }

        let Some(duty) = decision.duty else {
            debug!(%setup_id, state = ?decision.state, "nothing to do");
            return Ok(());
        };

        let executor = DutyExecutor::new(
            self.cfg.role,
            setup_id.clone(),
            self.secret.clone(),
            self.oracle.clone(),
            self.params,
        );
        let Some(tx) = timeout(self.cfg.oracle_timeout, executor.execute(&set, duty))
            .await
            .map_err(|_| DisputeManagerErr::Timeout("waiting for the trace oracle".to_string()))??
        else {
            return Ok(());
        };

        let name = tx.name;
        let queued = execute_with_retries(retry, || self.db.queue_outgoing(setup_id, tx.clone()))
            .await?;
        if queued {
            info!(%setup_id, template = %name, "queued transaction");
        } else {
            debug!(%setup_id, template = %name, "transaction already queued");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bitcoin::{
        absolute::LockTime, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence,
        Transaction, TxIn, TxOut, Txid, Witness,
    };
    use dispute_db::{inmemory::DisputeInMemoryDb, outgoing::OutgoingTx};
    use dispute_primitives::template_name::TemplateName;
    use dispute_tx_graph::TemplateSet;
    use wots::CommittedValue;

    use super::*;
    use crate::{
        chain::test_utils::MockChain,
        oracle::{ArgumentData, Refutation, RevealedArgument, SimulatedTrace, SimulationError},
        shutdown::ShutdownSignal,
        test_utils::{keyed_graph, secret, setup_id},
    };

    type Manager = DisputeManager<DisputeInMemoryDb, MockChain, SimulatedTrace>;

    fn manager(
        role: Role,
        params: DisputeParams,
        db: &Arc<DisputeInMemoryDb>,
        chain: &Arc<MockChain>,
        proof_valid: bool,
    ) -> Manager {
        Manager::new(
            config(role),
            params,
            secret(role),
            db.clone(),
            chain.clone(),
            trace(proof_valid),
        )
    }

    fn config(role: Role) -> ManagerConfig {
        ManagerConfig {
            role,
            finality_depth: 1,
            start_height: 0,
            poll_interval: Duration::from_millis(10),
            rpc_timeout: Duration::from_secs(1),
            oracle_timeout: Duration::from_secs(1),
            db_retry: RetryPolicy::fixed(2, Duration::from_millis(1)),
        }
    }

    fn trace(proof_valid: bool) -> SimulatedTrace {
        SimulatedTrace {
            seed: "seed".to_string(),
            instruction_count: 1_000,
            proof: (1..=8u64).map(CommittedValue::from).collect(),
            proof_valid,
            faulty_from: None,
        }
    }

    /// A trace that takes `delay` to hand out the proof.
    #[derive(Debug, Clone)]
    struct SlowTrace {
        inner: SimulatedTrace,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl TraceOracle for SlowTrace {
        type Error = SimulationError;

        fn instruction_count(&self) -> u64 {
            self.inner.instruction_count()
        }

        async fn proof(&self) -> Result<Vec<CommittedValue>, Self::Error> {
            tokio::time::sleep(self.delay).await;
            self.inner.proof().await
        }

        async fn check_proof(&self, proof: &[CommittedValue]) -> Result<bool, Self::Error> {
            self.inner.check_proof(proof).await
        }

        async fn state_roots(
            &self,
            proof: &[CommittedValue],
            lines: &[u64],
        ) -> Result<Vec<CommittedValue>, Self::Error> {
            self.inner.state_roots(proof, lines).await
        }

        async fn find_error_selection(
            &self,
            proof: &[CommittedValue],
            states: &[CommittedValue],
            path: &[u8],
        ) -> Result<u8, Self::Error> {
            self.inner.find_error_selection(proof, states, path).await
        }

        async fn argument(
            &self,
            proof: &[CommittedValue],
            path: &[u8],
        ) -> Result<ArgumentData, Self::Error> {
            self.inner.argument(proof, path).await
        }

        async fn refute(
            &self,
            proof: &[CommittedValue],
            argument: &RevealedArgument,
            states: &[Vec<CommittedValue>],
        ) -> Result<Refutation, Self::Error> {
            self.inner.refute(proof, argument, states).await
        }
    }

    /// Instantiates a queued template the way a publisher would.
    fn instantiate(
        set: &TemplateSet,
        txids: &BTreeMap<TemplateName, Txid>,
        outgoing: &OutgoingTx,
    ) -> Transaction {
        let template = set.by_name(outgoing.name).unwrap();
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: template
                .inputs
                .iter()
                .zip(&outgoing.witness)
                .map(|(input, witness)| {
                    let parent = set.get(input.spends.template).unwrap();
                    let previous_output = if parent.is_external() {
                        parent.outpoint(input.spends.output).unwrap()
                    } else {
                        OutPoint {
                            txid: txids[&parent.name],
                            vout: input.spends.output as u32,
                        }
                    };
                    TxIn {
                        previous_output,
                        script_sig: ScriptBuf::new(),
                        sequence: input.sequence.map_or(Sequence::MAX, Sequence::from_height),
                        witness: Witness::from_slice(witness),
                    }
                })
                .collect(),
            output: vec![TxOut {
                value: Amount::from_sat(template.ordinal as u64),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_unchallenged_proof_pays_out() {
        let (set, params) = keyed_graph(3);
        let db = Arc::new(DisputeInMemoryDb::default());
        let chain = Arc::new(MockChain::default());
        chain.mine_empty(2);

        db.put_templates(&setup_id(), &set).await.unwrap();
        db.set_setup_status(&setup_id(), SetupStatus::Active)
            .await
            .unwrap();

        let prover = manager(Role::Prover, params, &db, &chain, true);
        let verifier = manager(Role::Verifier, params, &db, &chain, true);

        assert_eq!(prover.tick().await.unwrap(), 1);
        let proof = db
            .get_outgoing(&setup_id(), TemplateName::Proof)
            .await
            .unwrap()
            .unwrap();

        // a second tick does not queue the proof again
        prover.tick().await.unwrap();
        assert_eq!(db.get_ready_outgoing(&setup_id()).await.unwrap().len(), 1);

        let mut txids = BTreeMap::new();
        let proof_tx = instantiate(&set, &txids, &proof);
        txids.insert(TemplateName::Proof, proof_tx.compute_txid());
        chain.mine(vec![proof_tx]);
        chain.mine_empty(1);

        verifier.tick().await.unwrap();
        assert_eq!(
            db.get_confirmed_txs(&setup_id()).await.unwrap().len(),
            1,
            "the proof is final and recorded"
        );
        assert!(db
            .get_outgoing(&setup_id(), TemplateName::Challenge)
            .await
            .unwrap()
            .is_none());

        chain.mine_empty(params.small_timeout_blocks as usize);
        prover.tick().await.unwrap();
        let claim = db
            .get_outgoing(&setup_id(), TemplateName::ProofUncontested)
            .await
            .unwrap()
            .unwrap();

        chain.mine(vec![instantiate(&set, &txids, &claim)]);
        chain.mine_empty(1);
        prover.tick().await.unwrap();

        assert_eq!(
            db.get_setup_status(&setup_id()).await.unwrap(),
            Some(SetupStatus::PegoutSuccessful)
        );
        assert_eq!(prover.tick().await.unwrap(), 0, "resolved setups are not processed");
    }

    #[tokio::test]
    async fn test_invalid_proof_is_challenged() {
        let (set, params) = keyed_graph(3);
        let db = Arc::new(DisputeInMemoryDb::default());
        let chain = Arc::new(MockChain::default());
        chain.mine_empty(2);

        db.put_templates(&setup_id(), &set).await.unwrap();
        db.set_setup_status(&setup_id(), SetupStatus::Active)
            .await
            .unwrap();

        let prover = manager(Role::Prover, params, &db, &chain, true);
        let verifier = manager(Role::Verifier, params, &db, &chain, false);

        prover.tick().await.unwrap();
        let proof = db
            .get_outgoing(&setup_id(), TemplateName::Proof)
            .await
            .unwrap()
            .unwrap();
        chain.mine(vec![instantiate(&set, &BTreeMap::new(), &proof)]);

        // not final yet
        verifier.tick().await.unwrap();
        assert!(db.get_confirmed_txs(&setup_id()).await.unwrap().is_empty());

        chain.mine_empty(1);
        verifier.tick().await.unwrap();
        let challenge = db
            .get_outgoing(&setup_id(), TemplateName::Challenge)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(challenge.witness, vec![Vec::<Vec<u8>>::new()]);
    }

    #[tokio::test]
    async fn test_missing_templates_are_reported_per_setup() {
        let (_, params) = keyed_graph(3);
        let db = Arc::new(DisputeInMemoryDb::default());
        let chain = Arc::new(MockChain::default());
        chain.mine_empty(3);

        db.set_setup_status(&setup_id(), SetupStatus::Active)
            .await
            .unwrap();

        let prover = manager(Role::Prover, params, &db, &chain, true);
        assert_eq!(prover.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_slow_oracle_times_out_the_setup() {
        let (set, params) = keyed_graph(3);
        let db = Arc::new(DisputeInMemoryDb::default());
        let chain = Arc::new(MockChain::default());
        chain.mine_empty(2);

        db.put_templates(&setup_id(), &set).await.unwrap();
        db.set_setup_status(&setup_id(), SetupStatus::Active)
            .await
            .unwrap();

        let slow = SlowTrace {
            inner: trace(true),
            delay: Duration::from_millis(200),
        };
        let prover = |oracle_timeout| {
            DisputeManager::new(
                ManagerConfig {
                    oracle_timeout,
                    ..config(Role::Prover)
                },
                params,
                secret(Role::Prover),
                db.clone(),
                chain.clone(),
                slow.clone(),
            )
        };

        assert_eq!(prover(Duration::from_millis(20)).tick().await.unwrap(), 0);
        assert!(db.get_ready_outgoing(&setup_id()).await.unwrap().is_empty());
        assert_eq!(
            db.get_last_scanned_height(&setup_id()).await.unwrap(),
            Some(0),
            "blocks scanned before the timeout stay recorded"
        );

        assert_eq!(prover(Duration::from_secs(1)).tick().await.unwrap(), 1);
        assert!(db
            .get_outgoing(&setup_id(), TemplateName::Proof)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_spawned_manager_stops_on_shutdown() {
        let (_, params) = keyed_graph(3);
        let db = Arc::new(DisputeInMemoryDb::default());
        let chain = Arc::new(MockChain::default());
        chain.mine_empty(3);

        let (signal, guard) = ShutdownSignal::new();
        let handle = manager(Role::Prover, params, &db, &chain, true).spawn(guard);
        tokio::time::sleep(Duration::from_millis(30)).await;

        signal.send();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
