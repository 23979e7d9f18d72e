//! Typed interface definitions for every contract the policy engine touches.
//!
//! All calldata decoding in this crate goes through these `sol!` types, so a
//! decoded call is always an exhaustive, compile-time-checked struct rather
//! than a loosely-typed field bag.

use alloy_sol_types::sol;

sol! {
    /// Dispatch and owner-management surface of the smart-contract account.
    #[derive(Debug, PartialEq, Eq)]
    interface SmartAccount {
        struct Call {
            address target;
            uint256 value;
            bytes data;
        }

        function execute(address target, uint256 value, bytes calldata data) external payable;
        function executeBatch(Call[] calldata calls) external payable;

        function addOwnerAddress(address owner) external;
        function removeOwnerAtIndex(uint256 index, bytes calldata owner) external;
        function isOwnerAddress(address account) external view returns (bool);
    }

    /// Counterfactual account factory.
    #[derive(Debug, PartialEq, Eq)]
    interface AccountFactory {
        function createAccount(bytes[] calldata owners, uint256 nonce)
            external
            payable
            returns (address account);

        function getAddress(bytes[] calldata owners, uint256 nonce)
            external
            view
            returns (address predicted);
    }

    /// Orchestrator for the staged vault deployment flows.
    #[derive(Debug, PartialEq, Eq)]
    interface VaultBatcher {
        function deployPhase1(address owner, address creatorToken) external;
        function deployPhase2(address owner, address creatorToken, address vault) external;
        function deployPhase3(address owner, address creatorToken, address vault) external;
        function deployLegacy(address owner, address creatorToken) external;
    }

    /// Orchestrator for activating an already-deployed vault.
    #[derive(Debug, PartialEq, Eq)]
    interface ActivationBatcher {
        function activate(address owner, address creatorToken) external;
    }

    /// The subset of the creator token surface the policy sponsors.
    #[derive(Debug, PartialEq, Eq)]
    interface CreatorToken {
        function approve(address spender, uint256 amount) external returns (bool);
        function setPayoutRecipient(address recipient) external;
    }

    /// Vault admin calls reachable only in the second deploy phase.
    #[derive(Debug, PartialEq, Eq)]
    interface Vault {
        function setRouterStatus(address router, bool enabled) external;
        function setPayoutRouter(address router) external;
    }

    /// Deterministic deployer backed by an on-chain byte-code store.
    #[derive(Debug, PartialEq, Eq)]
    interface CodeStore {
        function creationCode(bytes32 codeId) external view returns (bytes memory code);

        function deploy(bytes32 codeId, bytes32 salt, bytes calldata constructorArgs)
            external
            returns (address deployed);
    }

    /// Permit-style delegated transfer contract. The leading argument is a
    /// nested tuple, so this signature must always go through the full
    /// ABI-aware decoder.
    #[derive(Debug, PartialEq, Eq)]
    interface PermitTransfer {
        struct TokenPermissions {
            address token;
            uint256 amount;
        }

        struct PermitTransferFrom {
            TokenPermissions permitted;
            uint256 nonce;
            uint256 deadline;
        }

        struct SignatureTransferDetails {
            address to;
            uint256 requestedAmount;
        }

        function permitTransferFrom(
            PermitTransferFrom memory permit,
            SignatureTransferDetails calldata transferDetails,
            address owner,
            bytes calldata signature
        ) external;
    }
}

/// Domain-separator tag for the burn-router CREATE2 salt.
pub const BURN_ROUTER_SALT_TAG: &[u8] = b"creator.burn-router.v1";

/// Domain-separator tag for the payout-router CREATE2 salt.
pub const PAYOUT_ROUTER_SALT_TAG: &[u8] = b"creator.payout-router.v1";
