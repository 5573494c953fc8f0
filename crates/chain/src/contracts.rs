//! Contract bindings for the staking engine and its supporting modules.
//!
//! All on-chain surfaces the client touches are declared here with the
//! `sol!` macro so reads and calldata encoding share one typed source.

use alloy::primitives::{Address, FixedBytes};
use alloy::sol;

sol! {
    /// Staking engine: users lock the governance token as collateral in a
    /// per-owner, per-index position ("urn"), draw stablecoin debt against
    /// it, route staking rewards to a farm, and optionally delegate votes.
    ///
    /// `multicall` executes the encoded sub-calls sequentially and in the
    /// exact order given; the engine does not reorder.
    #[sol(rpc)]
    interface IStakingEngine {
        function open(uint256 index) external returns (address urn);
        function lock(address owner, uint256 index, uint256 wad, uint16 refCode) external;
        function free(address owner, uint256 index, address to, uint256 wad) external;
        function draw(address owner, uint256 index, address to, uint256 wad) external;
        function wipe(address owner, uint256 index, uint256 wad) external;
        function wipeAll(address owner, uint256 index) external returns (uint256 wiped);
        function selectFarm(address owner, uint256 index, address farm, uint16 refCode) external;
        function selectVoteDelegate(address owner, uint256 index, address voteDelegate) external;
        function getReward(address owner, uint256 index, address farm, address to) external returns (uint256 amt);
        function multicall(bytes[] calldata data) external returns (bytes[] memory results);

        function ownerUrnsCount(address owner) external view returns (uint256);
        function ownerUrns(address owner, uint256 index) external view returns (address urn);
        function urnFarms(address urn) external view returns (address farm);
        function urnVoteDelegates(address urn) external view returns (address voteDelegate);
    }

    /// Core accounting module holding per-urn collateral/debt and the
    /// per-collateral risk parameters.
    #[sol(rpc)]
    interface IVat {
        function urns(bytes32 ilk, address urn) external view returns (uint256 ink, uint256 art);
        function ilks(bytes32 ilk) external view returns (uint256 Art, uint256 rate, uint256 spot, uint256 line, uint256 dust);
    }

    /// Price relay: reference price normalization factor and the
    /// liquidation ratio per collateral type.
    #[sol(rpc)]
    interface ISpotter {
        function par() external view returns (uint256);
        function ilks(bytes32 ilk) external view returns (address pip, uint256 mat);
    }

    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 value) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
    }

    /// Multisig execution events. A queued proposal is correlated to the
    /// transaction that lands it on-chain via the proposal hash topic.
    interface ISafe {
        event ExecutionSuccess(bytes32 indexed txHash, uint256 payment);
        event ExecutionFailure(bytes32 indexed txHash, uint256 payment);
    }
}

/// Deployed addresses of the protocol modules the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolAddresses {
    /// Staking engine (all position mutations go through it)
    pub engine: Address,
    /// Core accounting module
    pub vat: Address,
    /// Price relay
    pub spotter: Address,
    /// Governance token locked as collateral
    pub gov_token: Address,
    /// Stablecoin drawn as debt
    pub stable_token: Address,
    /// Collateral type identifier
    pub ilk: FixedBytes<32>,
}

impl ProtocolAddresses {
    /// Collateral type identifier from a short ASCII name, zero-padded.
    pub fn ilk_from_name(name: &str) -> FixedBytes<32> {
        let mut ilk = [0u8; 32];
        let bytes = name.as_bytes();
        let len = bytes.len().min(32);
        ilk[..len].copy_from_slice(&bytes[..len]);
        FixedBytes::from(ilk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ilk_from_name() {
        let ilk = ProtocolAddresses::ilk_from_name("LSE-GOV");
        assert_eq!(&ilk[..7], b"LSE-GOV");
        assert!(ilk[7..].iter().all(|b| *b == 0));
    }
}
