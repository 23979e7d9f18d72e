//! Intent classification and per-call policy validation.
//!
//! Two single passes over the decoded inner calls. Detection scans in order
//! for the one orchestrator call that fixes the batch's mode and parameters;
//! validation then judges every call against the allow-set for that mode.
//! There is no backtracking: the first rule a call breaks rejects the whole
//! batch.

use alloy_primitives::{keccak256, Address, FixedBytes, B256, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use futures::try_join;

use crate::chain::ChainReader;
use crate::config::ProtocolAddresses;
use crate::contracts::{
    ActivationBatcher, CodeStore, CreatorToken, PermitTransfer, SmartAccount, Vault, VaultBatcher,
    BURN_ROUTER_SALT_TAG, PAYOUT_ROUTER_SALT_TAG,
};
use crate::decode::InnerCall;
use crate::error::DenyReason;
use crate::predict::{create2_address, derive_salt, init_code_hash, CreationCodeCache};
use crate::session::Session;

/// Sponsorable batch intents, fixed by the primary orchestrator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DeployPhase1,
    DeployPhase2,
    DeployPhase3,
    DeployLegacy,
    Activate,
}

impl Mode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeployPhase1 => "deploy_phase1",
            Self::DeployPhase2 => "deploy_phase2",
            Self::DeployPhase3 => "deploy_phase3",
            Self::DeployLegacy => "deploy_legacy",
            Self::Activate => "activate",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The orchestrator call that anchors a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryCall {
    pub mode: Mode,
    pub owner: Address,
    pub creator_token: Address,
    /// Present for the phases operating on an already-deployed vault.
    pub vault: Option<Address>,
    /// Position within the decoded batch.
    pub index: usize,
}

/// Addresses and constructor payloads derived for the second deploy phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedAddresses {
    pub burn_router: Address,
    pub payout_router: Address,
    pub burn_salt: B256,
    pub payout_salt: B256,
    pub burn_ctor_args: Bytes,
    pub payout_ctor_args: Bytes,
}

/// A call broke a policy rule. The payloads are diagnostics; dispatch always
/// goes through the variant itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("primary call owner {owner} does not match sender {sender}")]
    OwnerMismatch { owner: Address, sender: Address },

    #[error("no sponsorable primary call in batch; saw {observed}")]
    NoPrimaryCall { observed: String },

    #[error("second orchestrator call at index {second} (first at {first})")]
    DuplicatePrimaryCall { first: usize, second: usize },

    #[error("call {index} carries value; sponsored calls must be value-free")]
    CallValueNotAllowed { index: usize },

    #[error("call target {target} is not sponsorable")]
    CalledAddressNotAllowed { target: Address },

    #[error("selector {selector} is not sponsorable on {target}")]
    SelectorNotAllowed {
        target: Address,
        selector: FixedBytes<4>,
    },

    #[error("owner management requires a deploy session")]
    DeploySessionRequired,

    #[error("owner-management argument does not name the recorded session owner")]
    SessionOwnerMismatch,

    #[error("permit names token {got}, expected the creator token")]
    PermitTokenMismatch { got: Address },

    #[error("permit transfers to {got}, expected the sender account")]
    PermitRecipientMismatch { got: Address },

    #[error("permit signed by {got}, expected the session address")]
    PermitOwnerMismatch { got: Address },

    #[error("deterministic deploy is not sponsorable in mode {mode}")]
    DeployNotAllowedInMode { mode: Mode },

    #[error("code id {0} is not a known router code id")]
    UnknownCodeId(B256),

    #[error("deploy salt {got} does not match the derived salt {expected}")]
    SaltMismatch { got: B256, expected: B256 },

    #[error("constructor args do not match the derived router parameters")]
    ConstructorArgsMismatch,

    #[error("vault {vault} runtime code does not match the pinned hash")]
    VaultCodeHashMismatch { vault: Address },

    #[error("vault admin call does not reference the derived router addresses")]
    VaultAdminArgMismatch,

    #[error("predicted router address {0} is already deployed")]
    PredictedAddressTaken(Address),

    #[error("approve spender {got} is not a sponsorable spender")]
    ApproveSpenderNotAllowed { got: Address },

    #[error("payout recipient {got} does not match the derived payout router")]
    PayoutRecipientMismatch { got: Address },

    #[error("setPayoutRecipient is only sponsorable in the second deploy phase")]
    PayoutRecipientWrongMode,

    #[error("operation targets entry point {got}, not the pinned entry point")]
    EntryPointMismatch { got: Address },

    #[error("request is for chain {got}, not the pinned chain")]
    ChainIdMismatch { got: u64 },

    #[error("an expired or failed deploy session may only remove its session owner")]
    CleanupShapeNotAllowed,
}

impl PolicyViolation {
    /// Stable tag for metrics labels and the JSON-RPC `data` field.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::OwnerMismatch { .. } => "owner_mismatch",
            Self::NoPrimaryCall { .. } => "no_primary_call",
            Self::DuplicatePrimaryCall { .. } => "duplicate_primary_call",
            Self::CallValueNotAllowed { .. } => "call_value_not_allowed",
            Self::CalledAddressNotAllowed { .. } => "called_address_not_allowed",
            Self::SelectorNotAllowed { .. } => "selector_not_allowed",
            Self::DeploySessionRequired => "deploy_session_required",
            Self::SessionOwnerMismatch => "session_owner_mismatch",
            Self::PermitTokenMismatch { .. } => "permit_token_mismatch",
            Self::PermitRecipientMismatch { .. } => "permit_recipient_mismatch",
            Self::PermitOwnerMismatch { .. } => "permit_owner_mismatch",
            Self::DeployNotAllowedInMode { .. } => "deploy_not_allowed_in_mode",
            Self::UnknownCodeId(_) => "unknown_code_id",
            Self::SaltMismatch { .. } => "salt_mismatch",
            Self::ConstructorArgsMismatch => "constructor_args_mismatch",
            Self::VaultCodeHashMismatch { .. } => "vault_code_hash_mismatch",
            Self::VaultAdminArgMismatch => "vault_admin_arg_mismatch",
            Self::PredictedAddressTaken(_) => "predicted_address_taken",
            Self::ApproveSpenderNotAllowed { .. } => "approve_spender_not_allowed",
            Self::PayoutRecipientMismatch { .. } => "payout_recipient_mismatch",
            Self::PayoutRecipientWrongMode => "payout_recipient_wrong_mode",
            Self::EntryPointMismatch { .. } => "entry_point_mismatch",
            Self::ChainIdMismatch { .. } => "chain_id_mismatch",
            Self::CleanupShapeNotAllowed => "cleanup_shape_not_allowed",
        }
    }
}

/// Validates decoded batches against the sponsorship policy.
#[derive(Debug)]
pub struct PolicyValidator {
    contracts: ProtocolAddresses,
    code_cache: CreationCodeCache,
}

impl PolicyValidator {
    pub fn new(contracts: ProtocolAddresses) -> Self {
        Self {
            contracts,
            code_cache: CreationCodeCache::new(),
        }
    }

    /// Rejects operations aimed at anything but the pinned entry point and
    /// chain. Runs before any other work.
    pub fn check_pinning(
        &self,
        entry_point: Address,
        chain_id: Option<u64>,
    ) -> Result<(), PolicyViolation> {
        if entry_point != self.contracts.entry_point {
            return Err(PolicyViolation::EntryPointMismatch { got: entry_point });
        }
        if let Some(id) = chain_id {
            if id != self.contracts.chain_id {
                return Err(PolicyViolation::ChainIdMismatch { got: id });
            }
        }
        Ok(())
    }

    /// Ordered scan fixing the batch's mode from its one orchestrator call.
    pub fn detect_primary(
        &self,
        sender: Address,
        calls: &[InnerCall],
    ) -> Result<PrimaryCall, DenyReason> {
        let mut primary: Option<PrimaryCall> = None;

        for (index, call) in calls.iter().enumerate() {
            let Some(decoded) = self.decode_orchestrator(call, index)? else {
                continue;
            };

            if let Some(first) = &primary {
                return Err(PolicyViolation::DuplicatePrimaryCall {
                    first: first.index,
                    second: index,
                }
                .into());
            }
            primary = Some(decoded);
        }

        let primary = primary.ok_or_else(|| PolicyViolation::NoPrimaryCall {
            observed: describe_calls(calls),
        })?;

        if primary.owner != sender {
            return Err(PolicyViolation::OwnerMismatch {
                owner: primary.owner,
                sender,
            }
            .into());
        }

        Ok(primary)
    }

    fn decode_orchestrator(
        &self,
        call: &InnerCall,
        index: usize,
    ) -> Result<Option<PrimaryCall>, DenyReason> {
        let Some(selector) = call.selector() else {
            return Ok(None);
        };

        if call.target == self.contracts.vault_batcher {
            let decode_err = |e: alloy_sol_types::Error| {
                DenyReason::Decode(format!("orchestrator calldata malformed: {e}"))
            };

            let primary = if selector == VaultBatcher::deployPhase1Call::SELECTOR {
                let c = VaultBatcher::deployPhase1Call::abi_decode(&call.data)
                    .map_err(decode_err)?;
                PrimaryCall {
                    mode: Mode::DeployPhase1,
                    owner: c.owner,
                    creator_token: c.creatorToken,
                    vault: None,
                    index,
                }
            } else if selector == VaultBatcher::deployPhase2Call::SELECTOR {
                let c = VaultBatcher::deployPhase2Call::abi_decode(&call.data)
                    .map_err(decode_err)?;
                PrimaryCall {
                    mode: Mode::DeployPhase2,
                    owner: c.owner,
                    creator_token: c.creatorToken,
                    vault: Some(c.vault),
                    index,
                }
            } else if selector == VaultBatcher::deployPhase3Call::SELECTOR {
                let c = VaultBatcher::deployPhase3Call::abi_decode(&call.data)
                    .map_err(decode_err)?;
                PrimaryCall {
                    mode: Mode::DeployPhase3,
                    owner: c.owner,
                    creator_token: c.creatorToken,
                    vault: Some(c.vault),
                    index,
                }
            } else if selector == VaultBatcher::deployLegacyCall::SELECTOR {
                let c = VaultBatcher::deployLegacyCall::abi_decode(&call.data)
                    .map_err(decode_err)?;
                PrimaryCall {
                    mode: Mode::DeployLegacy,
                    owner: c.owner,
                    creator_token: c.creatorToken,
                    vault: None,
                    index,
                }
            } else {
                return Err(PolicyViolation::SelectorNotAllowed {
                    target: call.target,
                    selector,
                }
                .into());
            };

            return Ok(Some(primary));
        }

        if call.target == self.contracts.activation_batcher {
            if selector != ActivationBatcher::activateCall::SELECTOR {
                return Err(PolicyViolation::SelectorNotAllowed {
                    target: call.target,
                    selector,
                }
                .into());
            }
            let c = ActivationBatcher::activateCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("activate calldata malformed: {e}")))?;
            return Ok(Some(PrimaryCall {
                mode: Mode::Activate,
                owner: c.owner,
                creator_token: c.creatorToken,
                vault: None,
                index,
            }));
        }

        Ok(None)
    }

    /// Derives the expected auxiliary contract addresses for the second
    /// deploy phase. Other modes derive nothing.
    pub async fn derive_expected(
        &self,
        chain: &dyn ChainReader,
        sender: Address,
        primary: &PrimaryCall,
    ) -> Result<Option<ExpectedAddresses>, DenyReason> {
        if primary.mode != Mode::DeployPhase2 {
            return Ok(None);
        }
        let Some(vault) = primary.vault else {
            return Ok(None);
        };

        // The first phase must have left the exact pinned vault code behind.
        let vault_code = chain.get_code(vault).await?;
        if keccak256(&vault_code) != self.contracts.vault_code_hash {
            return Err(PolicyViolation::VaultCodeHashMismatch { vault }.into());
        }

        let token = primary.creator_token;
        let store = self.contracts.code_store;
        let burn_salt = derive_salt(BURN_ROUTER_SALT_TAG, token, sender);
        let payout_salt = derive_salt(PAYOUT_ROUTER_SALT_TAG, token, sender);

        let (burn_code, payout_code) = try_join!(
            self.code_cache
                .get_or_fetch(chain, store, self.contracts.burn_router_code_id),
            self.code_cache
                .get_or_fetch(chain, store, self.contracts.payout_router_code_id),
        )?;

        let burn_ctor_args: Bytes = (vault, token, self.contracts.protocol_treasury)
            .abi_encode_params()
            .into();
        let burn_router =
            create2_address(store, burn_salt, init_code_hash(&burn_code, &burn_ctor_args));

        // The payout router's constructor references the burn router, so the
        // two derivations are ordered.
        let payout_ctor_args: Bytes = (token, burn_router, sender).abi_encode_params().into();
        let payout_router = create2_address(
            store,
            payout_salt,
            init_code_hash(&payout_code, &payout_ctor_args),
        );

        let (burn_deployed, payout_deployed) =
            try_join!(chain.get_code(burn_router), chain.get_code(payout_router))?;
        if !burn_deployed.is_empty() {
            return Err(PolicyViolation::PredictedAddressTaken(burn_router).into());
        }
        if !payout_deployed.is_empty() {
            return Err(PolicyViolation::PredictedAddressTaken(payout_router).into());
        }

        Ok(Some(ExpectedAddresses {
            burn_router,
            payout_router,
            burn_salt,
            payout_salt,
            burn_ctor_args,
            payout_ctor_args,
        }))
    }

    /// Judges every inner call against the mode's allow-set. Any violation is
    /// terminal for the whole batch.
    pub fn validate(
        &self,
        session: &Session,
        sender: Address,
        calls: &[InnerCall],
        primary: &PrimaryCall,
        expected: Option<&ExpectedAddresses>,
    ) -> Result<(), DenyReason> {
        for (index, call) in calls.iter().enumerate() {
            if call.value != U256::ZERO {
                return Err(PolicyViolation::CallValueNotAllowed { index }.into());
            }
            if index == primary.index {
                continue;
            }
            self.validate_call(session, sender, call, primary, expected)?;
        }
        Ok(())
    }

    fn validate_call(
        &self,
        session: &Session,
        sender: Address,
        call: &InnerCall,
        primary: &PrimaryCall,
        expected: Option<&ExpectedAddresses>,
    ) -> Result<(), DenyReason> {
        let target = call.target;

        if target == sender {
            return self.validate_self_call(session, call);
        }
        if target == self.contracts.permit {
            return self.validate_permit(session, sender, call, primary);
        }
        if target == self.contracts.code_store {
            return self.validate_store_deploy(call, primary, expected);
        }
        if primary.vault == Some(target) {
            return self.validate_vault_admin(call, expected);
        }
        if target == primary.creator_token {
            return self.validate_creator_token(call, primary, expected);
        }

        Err(PolicyViolation::CalledAddressNotAllowed { target }.into())
    }

    /// Owner management on the account itself. Only the recorded session
    /// owner of an active deploy session may be added or removed.
    fn validate_self_call(&self, session: &Session, call: &InnerCall) -> Result<(), DenyReason> {
        let deploy = session
            .deploy()
            .ok_or(PolicyViolation::DeploySessionRequired)?;
        let selector = self.known_selector(call)?;

        if selector == SmartAccount::addOwnerAddressCall::SELECTOR {
            let c = SmartAccount::addOwnerAddressCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("addOwnerAddress malformed: {e}")))?;
            if c.owner != deploy.session_owner {
                return Err(PolicyViolation::SessionOwnerMismatch.into());
            }
            return Ok(());
        }

        if selector == SmartAccount::removeOwnerAtIndexCall::SELECTOR {
            let c = SmartAccount::removeOwnerAtIndexCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("removeOwnerAtIndex malformed: {e}")))?;
            // The owner blob is the ABI word of the session owner address.
            if c.owner.as_ref() != deploy.session_owner.into_word().as_slice() {
                return Err(PolicyViolation::SessionOwnerMismatch.into());
            }
            return Ok(());
        }

        Err(PolicyViolation::SelectorNotAllowed {
            target: call.target,
            selector,
        }
        .into())
    }

    fn validate_permit(
        &self,
        session: &Session,
        sender: Address,
        call: &InnerCall,
        primary: &PrimaryCall,
    ) -> Result<(), DenyReason> {
        let selector = self.known_selector(call)?;
        if selector != PermitTransfer::permitTransferFromCall::SELECTOR {
            return Err(PolicyViolation::SelectorNotAllowed {
                target: call.target,
                selector,
            }
            .into());
        }

        let c = PermitTransfer::permitTransferFromCall::abi_decode(&call.data)
            .map_err(|e| DenyReason::Decode(format!("permitTransferFrom malformed: {e}")))?;

        if c.permit.permitted.token != primary.creator_token {
            return Err(PolicyViolation::PermitTokenMismatch {
                got: c.permit.permitted.token,
            }
            .into());
        }
        if c.transferDetails.to != sender {
            return Err(PolicyViolation::PermitRecipientMismatch {
                got: c.transferDetails.to,
            }
            .into());
        }
        if c.owner != session.address {
            return Err(PolicyViolation::PermitOwnerMismatch { got: c.owner }.into());
        }
        Ok(())
    }

    fn validate_store_deploy(
        &self,
        call: &InnerCall,
        primary: &PrimaryCall,
        expected: Option<&ExpectedAddresses>,
    ) -> Result<(), DenyReason> {
        let Some(expected) = expected else {
            return Err(PolicyViolation::DeployNotAllowedInMode { mode: primary.mode }.into());
        };

        let selector = self.known_selector(call)?;
        if selector != CodeStore::deployCall::SELECTOR {
            return Err(PolicyViolation::SelectorNotAllowed {
                target: call.target,
                selector,
            }
            .into());
        }

        let c = CodeStore::deployCall::abi_decode(&call.data)
            .map_err(|e| DenyReason::Decode(format!("deploy calldata malformed: {e}")))?;

        let (expected_salt, expected_args) = if c.codeId == self.contracts.burn_router_code_id {
            (expected.burn_salt, &expected.burn_ctor_args)
        } else if c.codeId == self.contracts.payout_router_code_id {
            (expected.payout_salt, &expected.payout_ctor_args)
        } else {
            return Err(PolicyViolation::UnknownCodeId(c.codeId).into());
        };

        if c.salt != expected_salt {
            return Err(PolicyViolation::SaltMismatch {
                got: c.salt,
                expected: expected_salt,
            }
            .into());
        }
        if &c.constructorArgs != expected_args {
            return Err(PolicyViolation::ConstructorArgsMismatch.into());
        }
        Ok(())
    }

    fn validate_vault_admin(
        &self,
        call: &InnerCall,
        expected: Option<&ExpectedAddresses>,
    ) -> Result<(), DenyReason> {
        let Some(expected) = expected else {
            // Vault admin is only reachable in the phase that derives the
            // router addresses it must reference.
            return Err(PolicyViolation::CalledAddressNotAllowed {
                target: call.target,
            }
            .into());
        };

        let selector = self.known_selector(call)?;

        if selector == Vault::setRouterStatusCall::SELECTOR {
            let c = Vault::setRouterStatusCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("setRouterStatus malformed: {e}")))?;
            if c.router != expected.burn_router || !c.enabled {
                return Err(PolicyViolation::VaultAdminArgMismatch.into());
            }
            return Ok(());
        }

        if selector == Vault::setPayoutRouterCall::SELECTOR {
            let c = Vault::setPayoutRouterCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("setPayoutRouter malformed: {e}")))?;
            if c.router != expected.payout_router {
                return Err(PolicyViolation::VaultAdminArgMismatch.into());
            }
            return Ok(());
        }

        Err(PolicyViolation::SelectorNotAllowed {
            target: call.target,
            selector,
        }
        .into())
    }

    fn validate_creator_token(
        &self,
        call: &InnerCall,
        primary: &PrimaryCall,
        expected: Option<&ExpectedAddresses>,
    ) -> Result<(), DenyReason> {
        let selector = self.known_selector(call)?;

        if selector == CreatorToken::approveCall::SELECTOR {
            let c = CreatorToken::approveCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("approve malformed: {e}")))?;
            let allowed = c.spender == self.contracts.vault_batcher
                || c.spender == self.contracts.activation_batcher
                || c.spender == self.contracts.permit;
            if !allowed {
                return Err(PolicyViolation::ApproveSpenderNotAllowed { got: c.spender }.into());
            }
            return Ok(());
        }

        if selector == CreatorToken::setPayoutRecipientCall::SELECTOR {
            if primary.mode != Mode::DeployPhase2 {
                return Err(PolicyViolation::PayoutRecipientWrongMode.into());
            }
            let c = CreatorToken::setPayoutRecipientCall::abi_decode(&call.data)
                .map_err(|e| DenyReason::Decode(format!("setPayoutRecipient malformed: {e}")))?;
            let payout_router = expected
                .map(|e| e.payout_router)
                .ok_or(PolicyViolation::PayoutRecipientWrongMode)?;
            if c.recipient != payout_router {
                return Err(PolicyViolation::PayoutRecipientMismatch { got: c.recipient }.into());
            }
            return Ok(());
        }

        Err(PolicyViolation::SelectorNotAllowed {
            target: call.target,
            selector,
        }
        .into())
    }

    /// Cleanup-only branch for expired or failed deploy sessions: the sole
    /// legal batch is one self-call removing the recorded session owner.
    pub fn validate_cleanup(
        &self,
        session: &Session,
        sender: Address,
        calls: &[InnerCall],
    ) -> Result<(), DenyReason> {
        let deploy = session
            .deploy()
            .ok_or(PolicyViolation::DeploySessionRequired)?;

        let [call] = calls else {
            return Err(PolicyViolation::CleanupShapeNotAllowed.into());
        };
        if call.target != sender || call.value != U256::ZERO {
            return Err(PolicyViolation::CleanupShapeNotAllowed.into());
        }
        if call.selector() != Some(SmartAccount::removeOwnerAtIndexCall::SELECTOR.into()) {
            return Err(PolicyViolation::CleanupShapeNotAllowed.into());
        }

        let c = SmartAccount::removeOwnerAtIndexCall::abi_decode(&call.data)
            .map_err(|e| DenyReason::Decode(format!("removeOwnerAtIndex malformed: {e}")))?;
        if c.owner.as_ref() != deploy.session_owner.into_word().as_slice() {
            return Err(PolicyViolation::SessionOwnerMismatch.into());
        }
        Ok(())
    }

    fn known_selector(&self, call: &InnerCall) -> Result<FixedBytes<4>, DenyReason> {
        call.selector()
            .ok_or_else(|| DenyReason::Decode("inner call shorter than a selector".to_string()))
    }
}

fn describe_calls(calls: &[InnerCall]) -> String {
    if calls.is_empty() {
        return "an empty batch".to_string();
    }
    let parts: Vec<String> = calls
        .iter()
        .map(|c| match c.selector() {
            Some(sel) => format!("{}:{sel}", c.target),
            None => format!("{}:<no selector>", c.target),
        })
        .collect();
    parts.join(", ")
}
