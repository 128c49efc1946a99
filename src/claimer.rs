use std::fmt;

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{utils::format_ether, Address, Bytes, TxHash, U256},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolCall,
};

use DropERC1155::{claimCall, AllowlistProof};

use crate::{
    chain::{ChainClient, Inclusion},
    config::ClaimTemplate,
};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    contract DropERC1155 {
        struct AllowlistProof {
            bytes32[] proof;
            uint256 quantityLimitPerWallet;
            uint256 pricePerToken;
            address currency;
        }

        function claim(
            address _receiver,
            uint256 _quantity,
            address _currency,
            uint256 _pricePerToken,
            AllowlistProof calldata _allowlistProof,
            bytes memory _data
        ) external payable;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Succeeded { tx_hash: TxHash },
    InsufficientFunds { balance: U256 },
    GasEstimationFailed { reason: String },
    Reverted { tx_hash: TxHash },
    UnexpectedError { reason: String },
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { tx_hash } => write!(f, "claimed in {tx_hash}"),
            Self::InsufficientFunds { balance } => {
                write!(f, "insufficient funds ({} ether)", format_ether(*balance))
            },
            Self::GasEstimationFailed { reason } => write!(f, "gas estimation failed: {reason}"),
            Self::Reverted { tx_hash } => write!(f, "reverted in {tx_hash}"),
            Self::UnexpectedError { reason } => write!(f, "unexpected error: {reason}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    pub succeeded: usize,
    pub insufficient_funds: usize,
    pub gas_estimation_failed: usize,
    pub reverted: usize,
    pub unexpected_error: usize,
}

impl ClaimSummary {
    pub fn from_outcomes(outcomes: &[ClaimOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Self::default(), |mut summary, outcome| {
                match outcome {
                    ClaimOutcome::Succeeded { .. } => summary.succeeded += 1,
                    ClaimOutcome::InsufficientFunds { .. } => summary.insufficient_funds += 1,
                    ClaimOutcome::GasEstimationFailed { .. } => summary.gas_estimation_failed += 1,
                    ClaimOutcome::Reverted { .. } => summary.reverted += 1,
                    ClaimOutcome::UnexpectedError { .. } => summary.unexpected_error += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.succeeded
            + self.insufficient_funds
            + self.gas_estimation_failed
            + self.reverted
            + self.unexpected_error
    }
}

impl fmt::Display for ClaimSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} claimed, {} insufficient funds, {} gas estimation failed, {} reverted, {} errored",
            self.total(),
            self.succeeded,
            self.insufficient_funds,
            self.gas_estimation_failed,
            self.reverted,
            self.unexpected_error,
        )
    }
}

/// Calldata for a public claim: the allow-list proof is always left empty.
pub fn claim_calldata(template: &ClaimTemplate, receiver: Address) -> Bytes {
    claimCall {
        _receiver: receiver,
        _quantity: template.quantity,
        _currency: template.currency,
        _pricePerToken: template.price_per_token,
        _allowlistProof: AllowlistProof {
            proof: vec![],
            quantityLimitPerWallet: U256::ZERO,
            pricePerToken: U256::ZERO,
            currency: Address::ZERO,
        },
        _data: Bytes::new(),
    }
    .abi_encode()
    .into()
}

/// Submits one claim per account, strictly in order. A failing account never
/// stops the batch.
pub struct Claimer<C> {
    chain: C,
    template: ClaimTemplate,
}

impl<C: ChainClient> Claimer<C> {
    pub fn new(chain: C, template: ClaimTemplate) -> Self {
        Self { chain, template }
    }

    pub async fn claim_for_all(&self, signers: &[PrivateKeySigner]) -> Vec<ClaimOutcome> {
        let total = signers.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, signer) in signers.iter().enumerate() {
            tracing::info!("Processing key {}/{total} for {}", i + 1, signer.address());

            let outcome = self.claim(signer).await;
            tracing::debug!("Key {}: {outcome}", i + 1);
            match &outcome {
                ClaimOutcome::Succeeded { .. } => tracing::info!("Completed claim for key {}", i + 1),
                _ => tracing::warn!("Skipping to next key due to failure"),
            }

            outcomes.push(outcome);
        }

        outcomes
    }

    pub async fn claim(&self, signer: &PrivateKeySigner) -> ClaimOutcome {
        let address = signer.address();

        match self.try_claim(signer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error claiming for {address}: {e:#}");
                ClaimOutcome::UnexpectedError {
                    reason: format!("{e:#}"),
                }
            }
        }
    }

    async fn try_claim(&self, signer: &PrivateKeySigner) -> eyre::Result<ClaimOutcome> {
        let template = &self.template;
        let from = signer.address();

        let balance = self.chain.balance(from).await?;
        if balance < template.min_balance {
            tracing::warn!(
                "Insufficient balance for {from}: {} ether, need at least {} ether",
                format_ether(balance),
                format_ether(template.min_balance)
            );
            return Ok(ClaimOutcome::InsufficientFunds { balance });
        }

        tracing::info!("Attempting claim for {from}");

        let mut tx_request = TransactionRequest::default()
            .with_from(from)
            .with_to(template.contract)
            .with_value(template.value)
            .with_input(claim_calldata(template, from));

        let gas_estimate = match self.chain.estimate_gas(&tx_request).await {
            Ok(gas) => gas,
            Err(e) => {
                tracing::error!("Gas estimation failed for {from}: {e:#}");
                return Ok(ClaimOutcome::GasEstimationFailed {
                    reason: format!("{e:#}"),
                });
            }
        };

        let nonce = self.chain.nonce(from).await?;
        let gas_limit = gas_estimate
            .checked_add(template.gas_limit_margin)
            .ok_or_else(|| eyre::eyre!("Gas limit overflows"))?;

        tx_request.set_chain_id(template.chain_id);
        tx_request.set_nonce(nonce);
        tx_request.set_gas_price(template.gas_price);
        tx_request.set_gas_limit(gas_limit.into());

        let wallet = EthereumWallet::from(signer.clone());
        let signed_transaction = tx_request.build(&wallet).await?;
        let tx_hash = self.chain.send_raw(signed_transaction).await?;
        tracing::info!("Claim submitted for {from}: {}", template.tx_link(tx_hash));

        let inclusion = self.wait_for_inclusion(tx_hash).await?;
        let url = template.tx_link(inclusion.tx_hash);

        if inclusion.success {
            tracing::info!("Successfully claimed for {from}: {url}");
            Ok(ClaimOutcome::Succeeded {
                tx_hash: inclusion.tx_hash,
            })
        } else {
            tracing::error!(
                "Transaction reverted for {from} in block {:?}: {url}",
                inclusion.block_number
            );
            Ok(ClaimOutcome::Reverted {
                tx_hash: inclusion.tx_hash,
            })
        }
    }

    async fn wait_for_inclusion(&self, tx_hash: TxHash) -> eyre::Result<Inclusion> {
        match self.template.receipt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.poll_receipt(tx_hash))
                .await
                .map_err(|_| eyre::eyre!("No receipt for {tx_hash} after {}s", timeout.as_secs()))?,
            None => self.poll_receipt(tx_hash).await,
        }
    }

    async fn poll_receipt(&self, tx_hash: TxHash) -> eyre::Result<Inclusion> {
        loop {
            if let Some(inclusion) = self.chain.receipt(tx_hash).await? {
                return Ok(inclusion);
            }
            tokio::time::sleep(self.template.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet, VecDeque},
        str::FromStr,
        sync::Mutex,
        time::Duration,
    };

    use alloy::{
        consensus::TxEnvelope,
        primitives::{keccak256, TxKind},
    };

    use super::*;
    use crate::config::Config;

    // Anvil's first three dev accounts
    const KEYS: [&str; 3] = [
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    ];

    const GAS_ESTIMATE: u64 = 150_000;

    #[derive(Default)]
    struct FakeChain {
        balances: HashMap<Address, U256>,
        failing_estimates: HashSet<Address>,
        failing_sends: HashSet<Address>,
        reverting: HashSet<Address>,
        // polls that return `None` before the receipt shows up
        pending_polls: Mutex<usize>,
        never_mined: bool,
        calls: Mutex<Vec<String>>,
        sent: Mutex<Vec<TxEnvelope>>,
        senders: Mutex<HashMap<TxHash, Address>>,
        estimates: Mutex<VecDeque<TransactionRequest>>,
    }

    impl FakeChain {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl ChainClient for FakeChain {
        async fn chain_id(&self) -> eyre::Result<u64> {
            Ok(31337)
        }

        async fn balance(&self, address: Address) -> eyre::Result<U256> {
            self.record(format!("balance {address}"));
            Ok(self.balances.get(&address).copied().unwrap_or(U256::ZERO))
        }

        async fn estimate_gas(&self, tx: &TransactionRequest) -> eyre::Result<u64> {
            let from = tx.from.unwrap();
            self.record(format!("estimate {from}"));
            self.estimates.lock().unwrap().push_back(tx.clone());

            if self.failing_estimates.contains(&from) {
                eyre::bail!("execution reverted: DropNoActiveCondition");
            }
            Ok(GAS_ESTIMATE)
        }

        async fn nonce(&self, address: Address) -> eyre::Result<u64> {
            self.record(format!("nonce {address}"));
            Ok(7)
        }

        async fn send_raw(&self, envelope: TxEnvelope) -> eyre::Result<TxHash> {
            let input = &envelope
                .as_legacy()
                .ok_or_else(|| eyre::eyre!("expected a legacy transaction"))?
                .tx()
                .input;
            let from = claimCall::abi_decode(input, true)?._receiver;
            self.record(format!("send {from}"));

            if self.failing_sends.contains(&from) {
                eyre::bail!("insufficient funds for gas * price + value");
            }

            let tx_hash = keccak256(from);
            self.senders.lock().unwrap().insert(tx_hash, from);
            self.sent.lock().unwrap().push(envelope);
            Ok(tx_hash)
        }

        async fn receipt(&self, tx_hash: TxHash) -> eyre::Result<Option<Inclusion>> {
            self.record(format!("receipt {tx_hash}"));

            if self.never_mined {
                return Ok(None);
            }

            let mut pending = self.pending_polls.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Ok(None);
            }

            let from = self.senders.lock().unwrap()[&tx_hash];
            Ok(Some(Inclusion {
                tx_hash,
                block_number: Some(1),
                success: !self.reverting.contains(&from),
            }))
        }
    }

    fn signers() -> Vec<PrivateKeySigner> {
        KEYS.iter()
            .map(|key| PrivateKeySigner::from_str(key).unwrap())
            .collect()
    }

    fn template() -> ClaimTemplate {
        let config = Config {
            chain_id: 31337,
            receipt_poll_interval_ms: 1,
            ..Config::default()
        };
        ClaimTemplate::from_config(&config).unwrap()
    }

    fn funded_chain(signers: &[PrivateKeySigner], template: &ClaimTemplate) -> FakeChain {
        FakeChain {
            balances: signers
                .iter()
                .map(|s| (s.address(), template.min_balance))
                .collect(),
            ..FakeChain::default()
        }
    }

    #[tokio::test]
    async fn estimation_failure_in_the_middle_does_not_stop_the_batch() {
        let signers = signers();
        let template = template();
        let mut chain = funded_chain(&signers, &template);
        chain.failing_estimates.insert(signers[1].address());

        let claimer = Claimer::new(chain, template);
        let outcomes = claimer.claim_for_all(&signers).await;

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ClaimOutcome::Succeeded { .. }));
        assert!(matches!(outcomes[1], ClaimOutcome::GasEstimationFailed { .. }));
        assert!(matches!(outcomes[2], ClaimOutcome::Succeeded { .. }));

        let chain = &claimer.chain;
        assert_eq!(chain.count("send"), 2);
        assert!(!chain.calls().contains(&format!("send {}", signers[1].address())));
        assert!(!chain.calls().contains(&format!("nonce {}", signers[1].address())));
    }

    #[tokio::test]
    async fn underfunded_account_is_skipped_before_estimation() {
        let signers = signers();
        let template = template();
        let mut chain = funded_chain(&signers, &template);
        let short = template.min_balance - U256::from(1u64);
        chain.balances.insert(signers[0].address(), short);

        let claimer = Claimer::new(chain, template);
        let outcome = claimer.claim(&signers[0]).await;

        assert_eq!(outcome, ClaimOutcome::InsufficientFunds { balance: short });
        assert_eq!(
            claimer.chain.calls(),
            vec![format!("balance {}", signers[0].address())]
        );
    }

    #[tokio::test]
    async fn balance_exactly_at_threshold_proceeds() {
        let signers = signers();
        let template = template();
        let chain = funded_chain(&signers, &template);

        let claimer = Claimer::new(chain, template);
        let outcome = claimer.claim(&signers[0]).await;

        assert!(matches!(outcome, ClaimOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn failed_receipt_status_is_reported_as_reverted() {
        let signers = signers();
        let template = template();
        let mut chain = funded_chain(&signers, &template);
        chain.reverting.insert(signers[2].address());

        let claimer = Claimer::new(chain, template);
        let outcome = claimer.claim(&signers[2]).await;

        assert_eq!(
            outcome,
            ClaimOutcome::Reverted {
                tx_hash: keccak256(signers[2].address())
            }
        );
    }

    #[tokio::test]
    async fn send_error_becomes_unexpected_error_and_batch_continues() {
        let signers = signers();
        let template = template();
        let mut chain = funded_chain(&signers, &template);
        chain.failing_sends.insert(signers[0].address());

        let claimer = Claimer::new(chain, template);
        let outcomes = claimer.claim_for_all(&signers).await;

        match &outcomes[0] {
            ClaimOutcome::UnexpectedError { reason } => {
                assert!(reason.contains("insufficient funds"))
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(outcomes[1], ClaimOutcome::Succeeded { .. }));
        assert!(matches!(outcomes[2], ClaimOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn waits_through_pending_polls() {
        let signers = signers();
        let template = template();
        let chain = funded_chain(&signers, &template);
        *chain.pending_polls.lock().unwrap() = 3;

        let claimer = Claimer::new(chain, template);
        let outcome = claimer.claim(&signers[0]).await;

        assert!(matches!(outcome, ClaimOutcome::Succeeded { .. }));
        assert_eq!(claimer.chain.count("receipt"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn receipt_timeout_is_an_unexpected_error() {
        let signers = signers();
        let mut template = template();
        template.receipt_timeout = Some(Duration::from_secs(30));
        let chain = FakeChain {
            never_mined: true,
            ..funded_chain(&signers, &template)
        };

        let claimer = Claimer::new(chain, template);
        let outcome = claimer.claim(&signers[0]).await;

        match outcome {
            ClaimOutcome::UnexpectedError { reason } => assert!(reason.contains("No receipt")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn built_transaction_uses_template_values() {
        let signers = signers();
        let template = template();
        let chain = funded_chain(&signers, &template);

        let claimer = Claimer::new(chain, template.clone());
        claimer.claim(&signers[1]).await;

        let estimate = claimer.chain.estimates.lock().unwrap()[0].clone();
        assert_eq!(estimate.from, Some(signers[1].address()));
        assert_eq!(estimate.value, Some(template.value));

        let sent = claimer.chain.sent.lock().unwrap();
        let tx = sent[0].as_legacy().expect("legacy transaction").tx();

        assert_eq!(tx.chain_id, Some(31337));
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.gas_price, template.gas_price);
        assert_eq!(
            u128::from(tx.gas_limit),
            u128::from(GAS_ESTIMATE + template.gas_limit_margin)
        );
        assert_eq!(tx.value, template.value);
        assert_eq!(tx.to, TxKind::Call(template.contract));

        let call = claimCall::abi_decode(&tx.input, true).unwrap();
        assert_eq!(call._receiver, signers[1].address());
        assert_eq!(call._quantity, U256::from(1u64));
        assert_eq!(call._currency, template.currency);
        assert!(call._allowlistProof.proof.is_empty());
        assert_eq!(call._allowlistProof.currency, Address::ZERO);
        assert!(call._data.is_empty());
    }

    #[test]
    fn insufficient_funds_is_shown_in_ether() {
        let outcome = ClaimOutcome::InsufficientFunds {
            balance: U256::from(1_500_000_000_000_000_000u64),
        };

        let shown = outcome.to_string();
        assert!(shown.starts_with("insufficient funds (1.5"), "{shown}");
        assert!(shown.ends_with(" ether)"), "{shown}");
    }

    #[test]
    fn summary_counts_each_outcome() {
        let outcomes = vec![
            ClaimOutcome::Succeeded {
                tx_hash: TxHash::ZERO,
            },
            ClaimOutcome::GasEstimationFailed {
                reason: "reverted".to_string(),
            },
            ClaimOutcome::Succeeded {
                tx_hash: TxHash::ZERO,
            },
            ClaimOutcome::InsufficientFunds {
                balance: U256::ZERO,
            },
        ];

        let summary = ClaimSummary::from_outcomes(&outcomes);

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.gas_estimation_failed, 1);
        assert_eq!(summary.insufficient_funds, 1);
        assert_eq!(summary.total(), 4);
        assert!(summary.to_string().starts_with("4 processed: 2 claimed"));
    }
}
