//! Binary call decoder for account dispatch calldata.
//!
//! A user operation's `callData` encodes the account's dispatch call. Two
//! shapes are recognized: a single `execute` and an `executeBatch` of
//! `(target, value, data)` tuples. Everything else decodes to an empty list,
//! which downstream validation treats as "no inner calls" and rejects.

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::SolCall;
use thiserror::Error;

use crate::contracts::SmartAccount;

/// One call the account would perform on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerCall {
    pub target: Address,
    pub value: U256,
    pub data: Bytes,
}

impl InnerCall {
    /// The 4-byte function selector of the call data, if present.
    pub fn selector(&self) -> Option<FixedBytes<4>> {
        (self.data.len() >= 4).then(|| FixedBytes::from_slice(&self.data[..4]))
    }
}

/// Dispatch calldata that matched a known selector but did not decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("execute calldata malformed: {0}")]
    Execute(String),

    #[error("executeBatch calldata malformed: {0}")]
    ExecuteBatch(String),
}

/// Decodes dispatch calldata into the account's inner calls.
///
/// Returns an empty list for selectors that are not a dispatch call; a
/// malformed body under a recognized selector is an error, never a partial
/// result.
pub fn decode_inner_calls(call_data: &[u8]) -> Result<Vec<InnerCall>, DecodeError> {
    let Some(&selector) = call_data.first_chunk::<4>() else {
        return Ok(Vec::new());
    };

    if selector == SmartAccount::executeCall::SELECTOR {
        let call = SmartAccount::executeCall::abi_decode(call_data)
            .map_err(|e| DecodeError::Execute(e.to_string()))?;
        Ok(vec![InnerCall {
            target: call.target,
            value: call.value,
            data: call.data,
        }])
    } else if selector == SmartAccount::executeBatchCall::SELECTOR {
        let call = SmartAccount::executeBatchCall::abi_decode(call_data)
            .map_err(|e| DecodeError::ExecuteBatch(e.to_string()))?;
        Ok(call
            .calls
            .into_iter()
            .map(|c| InnerCall {
                target: c.target,
                value: c.value,
                data: c.data,
            })
            .collect())
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};

    fn execute_calldata(target: Address, value: U256, data: Bytes) -> Vec<u8> {
        SmartAccount::executeCall {
            target,
            value,
            data,
        }
        .abi_encode()
    }

    #[test]
    fn decodes_single_execute() {
        let target = address!("1111111111111111111111111111111111111111");
        let data = bytes!("deadbeef");
        let calldata = execute_calldata(target, U256::ZERO, data.clone());

        let calls = decode_inner_calls(&calldata).unwrap();
        assert_eq!(
            calls,
            vec![InnerCall {
                target,
                value: U256::ZERO,
                data,
            }]
        );
    }

    #[test]
    fn decodes_execute_batch() {
        let calldata = SmartAccount::executeBatchCall {
            calls: vec![
                SmartAccount::Call {
                    target: address!("1111111111111111111111111111111111111111"),
                    value: U256::ZERO,
                    data: bytes!("01"),
                },
                SmartAccount::Call {
                    target: address!("2222222222222222222222222222222222222222"),
                    value: U256::from(7),
                    data: Bytes::new(),
                },
            ],
        }
        .abi_encode();

        let calls = decode_inner_calls(&calldata).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].value, U256::from(7));
    }

    #[test]
    fn unknown_selector_yields_empty_list() {
        assert_eq!(decode_inner_calls(&[0xde, 0xad, 0xbe, 0xef]).unwrap(), vec![]);
    }

    #[test]
    fn short_calldata_yields_empty_list() {
        assert_eq!(decode_inner_calls(&[0x01]).unwrap(), vec![]);
        assert_eq!(decode_inner_calls(&[]).unwrap(), vec![]);
    }

    #[test]
    fn truncated_execute_is_an_error() {
        let target = address!("1111111111111111111111111111111111111111");
        let mut calldata = execute_calldata(target, U256::ZERO, bytes!("deadbeef"));
        calldata.truncate(calldata.len() - 8);

        assert!(matches!(
            decode_inner_calls(&calldata),
            Err(DecodeError::Execute(_))
        ));
    }

    #[test]
    fn selector_helper() {
        let call = InnerCall {
            target: Address::ZERO,
            value: U256::ZERO,
            data: bytes!("a9059cbb00"),
        };
        assert_eq!(
            call.selector(),
            Some(FixedBytes::from([0xa9, 0x05, 0x9c, 0xbb]))
        );

        let empty = InnerCall {
            target: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
        };
        assert_eq!(empty.selector(), None);
    }
}
