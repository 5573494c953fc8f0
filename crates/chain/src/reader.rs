//! Read-only protocol queries: allowances, balances, position state and
//! risk parameters.
//!
//! Every query returns an explicit `Result`; RPC failures become
//! [`ReadError`] values, never panics. The orchestration layer keeps the
//! latest allowance snapshots as [`ReadState`] values so it can tell
//! "still resolving" apart from "failed" apart from "known, possibly zero".

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::contracts::{IERC20, IStakingEngine, ISpotter, IVat, ProtocolAddresses};

/// Read failure. `Rpc` covers transport and node errors; `Invalid` covers
/// responses that decode but make no sense for the query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("rpc read failed: {0}")]
    Rpc(String),
    #[error("invalid response: {0}")]
    Invalid(String),
}

/// Latest-known state of an asynchronous read: the (data, isLoading, error)
/// triple downstream gating logic consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState<T> {
    pub data: Option<T>,
    pub error: Option<ReadError>,
    pub loading: bool,
}

impl<T> ReadState<T> {
    /// A read that has been issued but not yet resolved.
    pub fn loading() -> Self {
        Self {
            data: None,
            error: None,
            loading: true,
        }
    }

    pub fn ready(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            loading: false,
        }
    }

    pub fn failed(error: ReadError) -> Self {
        Self {
            data: None,
            error: Some(error),
            loading: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.data.is_some()
    }
}

impl<T> From<Result<T, ReadError>> for ReadState<T> {
    fn from(result: Result<T, ReadError>) -> Self {
        match result {
            Ok(data) => Self::ready(data),
            Err(e) => Self::failed(e),
        }
    }
}

/// Structural state of one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrnState {
    /// Locked collateral (wad)
    pub ink: U256,
    /// Normalized debt (wad); multiply by the accumulated rate for the
    /// actual debt
    pub art: U256,
    /// Selected reward farm, if any
    pub reward_route: Option<Address>,
    /// Selected vote delegate, if any
    pub delegate: Option<Address>,
}

impl UrnState {
    /// A position counts as closed once collateral and debt are both zero;
    /// the index itself is never reused.
    pub fn is_closed(&self) -> bool {
        self.ink.is_zero() && self.art.is_zero()
    }
}

/// Protocol-wide risk parameters for the collateral type, refreshed per
/// block and shared by every position judged in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Accumulated rate (ray): debt multiplier applied to normalized debt
    pub rate: U256,
    /// Spot price with the safety margin applied (ray)
    pub spot: U256,
    /// Liquidation ratio (ray)
    pub mat: U256,
    /// Reference price normalization factor (ray)
    pub par: U256,
    /// Minimum non-zero debt per position (rad)
    pub dust: U256,
    /// Protocol-wide debt ceiling for this collateral (rad)
    pub line: U256,
    /// Total normalized debt currently drawn against this collateral (wad)
    pub total_art: U256,
}

/// Position-state reads, abstracted so the risk engine and tests can
/// substitute in-memory fixtures for the RPC-backed reader.
#[async_trait]
pub trait PositionReads: Send + Sync {
    async fn urn_count(&self, owner: Address) -> Result<u64, ReadError>;
    async fn urn_state(&self, owner: Address, index: u64) -> Result<UrnState, ReadError>;
    async fn risk_params(&self) -> Result<RiskParams, ReadError>;
}

/// Token allowance/balance reads.
#[async_trait]
pub trait TokenReads: Send + Sync {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ReadError>;
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ReadError>;
}

type AllowanceKey = (Address, Address, Address);

/// RPC-backed protocol reader. Providers are built per call from the held
/// URL; the only retained state is the latest allowance snapshots.
pub struct ProtocolReader {
    rpc_url: String,
    addresses: ProtocolAddresses,
    allowances: DashMap<AllowanceKey, ReadState<U256>>,
}

impl ProtocolReader {
    pub fn new(rpc_url: impl Into<String>, addresses: ProtocolAddresses) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            addresses,
            allowances: DashMap::new(),
        }
    }

    pub fn addresses(&self) -> &ProtocolAddresses {
        &self.addresses
    }

    fn provider(&self) -> Result<impl alloy::providers::Provider, ReadError> {
        let url = self
            .rpc_url
            .parse()
            .map_err(|e| ReadError::Rpc(format!("invalid rpc url: {e}")))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    /// Latest known allowance snapshot for (token, owner, spender). Returns
    /// a loading state until [`Self::refresh_allowance`] has resolved once.
    pub fn allowance_state(&self, token: Address, owner: Address, spender: Address) -> ReadState<U256> {
        self.allowances
            .get(&(token, owner, spender))
            .map(|s| s.clone())
            .unwrap_or_else(ReadState::loading)
    }

    /// Re-fetch an allowance and store the outcome. Called after a
    /// successful approval lands; confirmed state is re-read, never patched
    /// in place.
    pub async fn refresh_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> ReadState<U256> {
        self.allowances
            .insert((token, owner, spender), ReadState::loading());
        let state: ReadState<U256> = self.allowance(token, owner, spender).await.into();
        self.allowances
            .insert((token, owner, spender), state.clone());
        state
    }

    /// Drop a cached allowance so the next gate check re-resolves it.
    pub fn invalidate_allowance(&self, token: Address, owner: Address, spender: Address) {
        self.allowances.remove(&(token, owner, spender));
    }

    /// Fetch several positions with bounded parallelism, preserving index
    /// association in the output.
    pub async fn urn_states(
        &self,
        owner: Address,
        indices: &[u64],
        max_concurrent: usize,
    ) -> Vec<(u64, Result<UrnState, ReadError>)> {
        stream::iter(indices.iter().copied())
            .map(|index| async move {
                let result = self.urn_state(owner, index).await;
                (index, result)
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await
    }
}

#[async_trait]
impl TokenReads for ProtocolReader {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ReadError> {
        let provider = self.provider()?;
        let erc20 = IERC20::new(token, &provider);
        let allowance = erc20
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| ReadError::Rpc(e.to_string()))?
            ._0;
        debug!(token = %token, owner = %owner, spender = %spender, allowance = %allowance, "Allowance fetched");
        Ok(allowance)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ReadError> {
        let provider = self.provider()?;
        let erc20 = IERC20::new(token, &provider);
        let balance = erc20
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ReadError::Rpc(e.to_string()))?
            ._0;
        Ok(balance)
    }
}

#[async_trait]
impl PositionReads for ProtocolReader {
    async fn urn_count(&self, owner: Address) -> Result<u64, ReadError> {
        let provider = self.provider()?;
        let engine = IStakingEngine::new(self.addresses.engine, &provider);
        let count = engine
            .ownerUrnsCount(owner)
            .call()
            .await
            .map_err(|e| ReadError::Rpc(e.to_string()))?
            ._0;
        count
            .try_into()
            .map_err(|_| ReadError::Invalid(format!("urn count {count} exceeds u64")))
    }

    async fn urn_state(&self, owner: Address, index: u64) -> Result<UrnState, ReadError> {
        let provider = self.provider()?;
        let engine = IStakingEngine::new(self.addresses.engine, &provider);
        let vat = IVat::new(self.addresses.vat, &provider);

        let urn = engine
            .ownerUrns(owner, U256::from(index))
            .call()
            .await
            .map_err(|e| ReadError::Rpc(e.to_string()))?
            .urn;
        if urn.is_zero() {
            return Err(ReadError::Invalid(format!(
                "no urn at index {index} for {owner}"
            )));
        }

        // Collateral/debt, farm and delegate are independent; fetch in parallel.
        let urns_call = vat.urns(self.addresses.ilk, urn);
        let farm_call = engine.urnFarms(urn);
        let delegate_call = engine.urnVoteDelegates(urn);
        let (urns, farm, delegate) =
            tokio::join!(urns_call.call(), farm_call.call(), delegate_call.call());

        let urns = urns.map_err(|e| ReadError::Rpc(e.to_string()))?;
        let farm = farm.map_err(|e| ReadError::Rpc(e.to_string()))?.farm;
        let delegate = delegate
            .map_err(|e| ReadError::Rpc(e.to_string()))?
            .voteDelegate;

        Ok(UrnState {
            ink: urns.ink,
            art: urns.art,
            reward_route: (!farm.is_zero()).then_some(farm),
            delegate: (!delegate.is_zero()).then_some(delegate),
        })
    }

    async fn risk_params(&self) -> Result<RiskParams, ReadError> {
        let provider = self.provider()?;
        let vat = IVat::new(self.addresses.vat, &provider);
        let spotter = ISpotter::new(self.addresses.spotter, &provider);

        let ilk_call = vat.ilks(self.addresses.ilk);
        let par_call = spotter.par();
        let spot_call = spotter.ilks(self.addresses.ilk);
        let (ilk, par, spot_ilk) = tokio::join!(ilk_call.call(), par_call.call(), spot_call.call());

        let ilk = ilk.map_err(|e| ReadError::Rpc(e.to_string()))?;
        let par = par.map_err(|e| ReadError::Rpc(e.to_string()))?._0;
        let mat = spot_ilk.map_err(|e| ReadError::Rpc(e.to_string()))?.mat;

        Ok(RiskParams {
            rate: ilk.rate,
            spot: ilk.spot,
            mat,
            par,
            dust: ilk.dust,
            line: ilk.line,
            total_art: ilk.Art,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_state_transitions() {
        let loading = ReadState::<U256>::loading();
        assert!(loading.loading);
        assert!(!loading.is_ready());

        let ready = ReadState::ready(U256::from(5));
        assert!(ready.is_ready());
        assert_eq!(ready.data, Some(U256::from(5)));
        assert!(ready.error.is_none());

        let failed = ReadState::<U256>::failed(ReadError::Rpc("boom".into()));
        assert!(!failed.is_ready());
        assert!(!failed.loading);
        assert!(failed.error.is_some());

        let from_ok: ReadState<U256> = Ok::<_, ReadError>(U256::ZERO).into();
        // A resolved zero is a known value, not a pending one.
        assert!(from_ok.is_ready());
    }

    #[test]
    fn test_urn_closed_flag() {
        let open = UrnState {
            ink: U256::from(10),
            art: U256::ZERO,
            reward_route: None,
            delegate: None,
        };
        assert!(!open.is_closed());

        let closed = UrnState {
            ink: U256::ZERO,
            art: U256::ZERO,
            reward_route: None,
            delegate: None,
        };
        assert!(closed.is_closed());
    }

    #[test]
    fn test_allowance_snapshot_cache() {
        let reader = ProtocolReader::new(
            "http://localhost:8545",
            ProtocolAddresses {
                engine: Address::repeat_byte(1),
                vat: Address::repeat_byte(2),
                spotter: Address::repeat_byte(3),
                gov_token: Address::repeat_byte(4),
                stable_token: Address::repeat_byte(5),
                ilk: ProtocolAddresses::ilk_from_name("LSE-GOV"),
            },
        );
        let (t, o, s) = (
            Address::repeat_byte(4),
            Address::repeat_byte(9),
            Address::repeat_byte(1),
        );

        // Nothing fetched yet: the gate must see "loading", not zero.
        assert!(reader.allowance_state(t, o, s).loading);

        reader
            .allowances
            .insert((t, o, s), ReadState::ready(U256::from(7)));
        assert_eq!(reader.allowance_state(t, o, s).data, Some(U256::from(7)));

        reader.invalidate_allowance(t, o, s);
        assert!(reader.allowance_state(t, o, s).loading);
    }
}
