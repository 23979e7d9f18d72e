//! Ownership verification.
//!
//! Sponsorship requires the authenticated session to own the account the
//! operation declares as `sender`. A deployed account answers for itself via
//! its on-chain owner registry; an undeployed account is judged entirely by
//! its init code, which must name an allow-listed factory, list the session
//! among the initial owners, and actually deploy to the declared sender.

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;

use crate::chain::ChainReader;
use crate::contracts::{AccountFactory, SmartAccount};
use crate::error::{DenyReason, OwnershipViolation};

/// Verifies that a session address owns an operation's sender account.
#[derive(Debug)]
pub struct OwnershipVerifier {
    factories: Vec<Address>,
}

impl OwnershipVerifier {
    pub fn new(factories: Vec<Address>) -> Self {
        Self { factories }
    }

    /// Checks that `session` owns `sender`, consulting the chain for deployed
    /// accounts and the init code for counterfactual ones.
    pub async fn verify(
        &self,
        chain: &dyn ChainReader,
        session: Address,
        sender: Address,
        init_code: Option<&Bytes>,
    ) -> Result<(), DenyReason> {
        let code = chain.get_code(sender).await?;

        if !code.is_empty() {
            return self.verify_deployed(chain, session, sender).await;
        }

        let init_code = init_code.filter(|c| !c.is_empty()).ok_or_else(|| {
            DenyReason::MalformedRequest("undeployed sender carries no init code".to_string())
        })?;
        self.verify_counterfactual(chain, session, sender, init_code)
            .await
    }

    async fn verify_deployed(
        &self,
        chain: &dyn ChainReader,
        session: Address,
        sender: Address,
    ) -> Result<(), DenyReason> {
        let calldata = SmartAccount::isOwnerAddressCall { account: session }.abi_encode();
        let ret = chain.call(sender, calldata.into()).await?;

        let is_owner = SmartAccount::isOwnerAddressCall::abi_decode_returns(&ret)
            .map_err(|e| DenyReason::StateUnavailable(format!("owner check malformed: {e}")))?;

        if is_owner {
            Ok(())
        } else {
            Err(OwnershipViolation::NotOwner { session, sender }.into())
        }
    }

    /// An undeployed sender is exactly as trustworthy as its init code, so
    /// every claim in it is re-derived: factory allow-listed, session listed
    /// as an initial owner, and the factory's own address derivation agreeing
    /// with the declared sender.
    async fn verify_counterfactual(
        &self,
        chain: &dyn ChainReader,
        session: Address,
        sender: Address,
        init_code: &Bytes,
    ) -> Result<(), DenyReason> {
        if init_code.len() < 20 {
            return Err(DenyReason::Decode("init code shorter than a factory address".to_string()));
        }

        let factory = Address::from_slice(&init_code[..20]);
        if !self.factories.contains(&factory) {
            return Err(OwnershipViolation::FactoryNotAllowed { factory }.into());
        }

        let call = AccountFactory::createAccountCall::abi_decode(&init_code[20..])
            .map_err(|e| DenyReason::Decode(format!("factory calldata malformed: {e}")))?;

        if !call.owners.iter().any(|owner| owner_matches(owner, session)) {
            return Err(OwnershipViolation::NotOwner { session, sender }.into());
        }

        // The factory is the authority on where this init code deploys.
        let query = AccountFactory::getAddressCall {
            owners: call.owners,
            nonce: call.nonce,
        }
        .abi_encode();
        let ret = chain.call(factory, query.into()).await?;
        let predicted = AccountFactory::getAddressCall::abi_decode_returns(&ret)
            .map_err(|e| DenyReason::StateUnavailable(format!("getAddress malformed: {e}")))?;

        if predicted != sender {
            return Err(OwnershipViolation::SenderAddressMismatch { predicted, sender }.into());
        }

        Ok(())
    }
}

/// An initial-owner entry names `session` when its trailing 20 bytes are the
/// address and everything before them is zero padding. Longer entries are
/// other key types (e.g. passkeys) and never match an address session.
fn owner_matches(owner: &Bytes, session: Address) -> bool {
    if owner.len() < 20 || owner.len() > 32 {
        return false;
    }

    let (padding, tail) = owner.split_at(owner.len() - 20);
    tail == session.as_slice() && padding.iter().all(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainReader;
    use alloy_primitives::{address, bytes, U256};
    use alloy_sol_types::SolValue;

    const FACTORY: Address = address!("0BA5ED0c6AA8c49038F819E587E2633c4A9F428a");
    const SESSION: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const SENDER: Address = address!("cccccccccccccccccccccccccccccccccccccccc");

    fn verifier() -> OwnershipVerifier {
        OwnershipVerifier::new(vec![FACTORY])
    }

    fn padded_owner(address: Address) -> Bytes {
        address.into_word().into()
    }

    fn init_code(factory: Address, owners: Vec<Bytes>, nonce: U256) -> Bytes {
        let mut out = factory.to_vec();
        out.extend(AccountFactory::createAccountCall { owners, nonce }.abi_encode());
        out.into()
    }

    fn chain_predicting(owners: Vec<Bytes>, nonce: U256, predicted: Address) -> MockChainReader {
        let chain = MockChainReader::default();
        chain.set_call(
            FACTORY,
            AccountFactory::getAddressCall { owners, nonce }.abi_encode(),
            predicted.abi_encode(),
        );
        chain
    }

    #[tokio::test]
    async fn deployed_owner_passes() {
        let chain = MockChainReader::default();
        chain.set_code(SENDER, bytes!("60806040"));
        chain.set_call(
            SENDER,
            SmartAccount::isOwnerAddressCall { account: SESSION }.abi_encode(),
            true.abi_encode(),
        );

        verifier()
            .verify(&chain, SESSION, SENDER, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deployed_non_owner_is_denied() {
        let chain = MockChainReader::default();
        chain.set_code(SENDER, bytes!("60806040"));
        chain.set_call(
            SENDER,
            SmartAccount::isOwnerAddressCall { account: SESSION }.abi_encode(),
            false.abi_encode(),
        );

        let err = verifier()
            .verify(&chain, SESSION, SENDER, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OwnershipViolation::NotOwner {
                session: SESSION,
                sender: SENDER
            }
            .into()
        );
    }

    #[tokio::test]
    async fn counterfactual_owner_passes() {
        let owners = vec![padded_owner(SESSION)];
        let chain = chain_predicting(owners.clone(), U256::ZERO, SENDER);

        verifier()
            .verify(
                &chain,
                SESSION,
                SENDER,
                Some(&init_code(FACTORY, owners, U256::ZERO)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_factory_is_denied() {
        let other = address!("1111111111111111111111111111111111111111");
        let chain = MockChainReader::default();

        let err = verifier()
            .verify(
                &chain,
                SESSION,
                SENDER,
                Some(&init_code(other, vec![padded_owner(SESSION)], U256::ZERO)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OwnershipViolation::FactoryNotAllowed { factory: other }.into()
        );
    }

    #[tokio::test]
    async fn session_absent_from_owners_is_denied() {
        let stranger = address!("2222222222222222222222222222222222222222");
        let owners = vec![padded_owner(stranger)];
        let chain = chain_predicting(owners.clone(), U256::ZERO, SENDER);

        let err = verifier()
            .verify(
                &chain,
                SESSION,
                SENDER,
                Some(&init_code(FACTORY, owners, U256::ZERO)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DenyReason::Ownership(OwnershipViolation::NotOwner { .. })
        ));
    }

    #[tokio::test]
    async fn predicted_address_mismatch_is_denied() {
        let elsewhere = address!("3333333333333333333333333333333333333333");
        let owners = vec![padded_owner(SESSION)];
        let chain = chain_predicting(owners.clone(), U256::ZERO, elsewhere);

        let err = verifier()
            .verify(
                &chain,
                SESSION,
                SENDER,
                Some(&init_code(FACTORY, owners, U256::ZERO)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OwnershipViolation::SenderAddressMismatch {
                predicted: elsewhere,
                sender: SENDER
            }
            .into()
        );
    }

    #[tokio::test]
    async fn undeployed_without_init_code_is_malformed() {
        let chain = MockChainReader::default();

        let err = verifier()
            .verify(&chain, SESSION, SENDER, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DenyReason::MalformedRequest(_)));
    }

    #[test]
    fn owner_entry_matching() {
        assert!(owner_matches(&padded_owner(SESSION), SESSION));
        assert!(owner_matches(&Bytes::from(SESSION.to_vec()), SESSION));

        // Nonzero padding means a different key, not an address.
        let mut dirty = padded_owner(SESSION).to_vec();
        dirty[0] = 1;
        assert!(!owner_matches(&dirty.into(), SESSION));

        // A 64-byte passkey entry never matches an address session.
        assert!(!owner_matches(&Bytes::from(vec![0u8; 64]), SESSION));
    }
}
