//! Signature combination and escrow contract calls
//!
//! Independently produced partial signatures are checked against the script
//! and the locally recomputed payouts, then folded into a single `execute`
//! call on the escrow contract.

use crate::core::{Address, TransactionInput, TransactionOutput};
use crate::escrow::error::EscrowError;
use crate::escrow::payout::aggregate;
use crate::escrow::script::RedeemScript;
use crate::escrow::signing::{message_hash, PartialSignature, SignerRole};
use crate::rpc::{NodeClient, SubmittedTx, TxParams};
use serde::{Serialize, Serializer};
use std::collections::HashSet;

/// A call on the escrow contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum EscrowCall {
    /// Fund a new escrow; the transaction carries the funded amount as value
    #[serde(rename_all = "camelCase")]
    AddTransaction {
        buyer: Address,
        seller: Address,
        moderator: Address,
        threshold: u8,
        timeout_hours: u32,
        #[serde(serialize_with = "hex_bytes")]
        script_hash: [u8; 32],
        #[serde(serialize_with = "hex_bytes")]
        unique_id: [u8; 20],
        value: u64,
    },
    /// Release an escrow with collected signatures
    #[serde(rename_all = "camelCase")]
    Execute {
        v: Vec<u8>,
        #[serde(serialize_with = "hex_list")]
        r: Vec<[u8; 32]>,
        #[serde(serialize_with = "hex_list")]
        s: Vec<[u8; 32]>,
        #[serde(serialize_with = "hex_bytes")]
        script_hash: [u8; 32],
        destinations: Vec<Address>,
        amounts: Vec<u64>,
    },
}

fn hex_bytes<S: Serializer, const N: usize>(
    bytes: &[u8; N],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn hex_list<S: Serializer>(items: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(items.iter().map(|b| format!("0x{}", hex::encode(b))))
}

impl EscrowCall {
    /// Funding call for `script` carrying `value`
    pub fn fund(script: &RedeemScript, value: u64) -> Self {
        let (script_hash, _) = script.content_hash();
        EscrowCall::AddTransaction {
            buyer: script.buyer,
            seller: script.seller,
            moderator: script.moderator,
            threshold: script.threshold,
            timeout_hours: script.timeout_hours,
            script_hash,
            unique_id: script.unique_id,
            value,
        }
    }

    /// Native value the enclosing transaction must carry
    pub fn value(&self) -> u64 {
        match self {
            EscrowCall::AddTransaction { value, .. } => *value,
            EscrowCall::Execute { .. } => 0,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            EscrowCall::AddTransaction { .. } => "addTransaction",
            EscrowCall::Execute { .. } => "execute",
        }
    }
}

/// Everything needed to release one escrow
#[derive(Debug, Clone, Copy)]
pub struct ReleaseRequest<'a> {
    pub inputs: &'a [TransactionInput],
    pub outputs: &'a [TransactionOutput],
    /// Signatures in the order they are passed to the contract
    pub signatures: &'a [PartialSignature],
    pub redeem_script: &'a [u8],
}

/// Validate signatures and assemble the `execute` call
pub fn build_release_call(
    inputs: &[TransactionInput],
    outputs: &[TransactionOutput],
    signatures: &[PartialSignature],
    script: &RedeemScript,
) -> Result<EscrowCall, EscrowError> {
    let payouts = aggregate(inputs, outputs, &script.moderator).map_err(|e| match e {
        EscrowError::OverPayout { inputs, outputs } => {
            EscrowError::PayoutMismatch { inputs, outputs }
        }
        other => other,
    })?;
    let digest = message_hash(script, &payouts);

    let mut seen: HashSet<SignerRole> = HashSet::new();
    let mut v = Vec::with_capacity(signatures.len());
    let mut r = Vec::with_capacity(signatures.len());
    let mut s = Vec::with_capacity(signatures.len());

    for signature in signatures {
        if !seen.insert(signature.role) {
            return Err(EscrowError::DuplicateSigner(signature.role));
        }

        let recovered = signature.recover(&digest)?;
        let expected = script
            .party(signature.role)
            .ok_or(EscrowError::UnknownSigner(recovered))?;
        if recovered != expected {
            return Err(EscrowError::SignatureMismatch {
                role: signature.role,
                expected,
                recovered,
            });
        }

        let (sig_r, sig_s, sig_v) = signature.rsv()?;
        r.push(sig_r);
        s.push(sig_s);
        v.push(sig_v);
    }

    if signatures.len() < script.threshold as usize {
        return Err(EscrowError::InsufficientSignatures {
            have: signatures.len(),
            need: script.threshold,
        });
    }

    let (script_hash, _) = script.content_hash();
    Ok(EscrowCall::Execute {
        v,
        r,
        s,
        script_hash,
        destinations: payouts.destinations(),
        amounts: payouts.amounts(),
    })
}

/// Submit `call` to `contract` from `from` with a fresh nonce and gas price
pub async fn submit_call(
    node: &dyn NodeClient,
    from: Address,
    gas_limit: u64,
    contract: &Address,
    call: &EscrowCall,
) -> Result<SubmittedTx, EscrowError> {
    let nonce = node
        .pending_nonce(&from)
        .await
        .map_err(EscrowError::Submission)?;
    let gas_price = node
        .suggest_gas_price()
        .await
        .map_err(EscrowError::Submission)?;

    let params = TxParams {
        from,
        nonce,
        gas_price,
        gas_limit,
        value: call.value(),
    };
    let submitted = node
        .submit_contract_call(contract, call, &params)
        .await
        .map_err(EscrowError::Submission)?;

    log::info!(
        "Submitted {} to {} as {} (nonce {})",
        call.method(),
        contract,
        submitted.hash,
        nonce
    );
    Ok(submitted)
}

/// Combine signatures into a release
///
/// With `broadcast` the call is submitted to the script's escrow contract and
/// the node's raw serialized transaction is returned; otherwise the
/// JSON-encoded call is returned without contacting the node.
pub async fn combine(
    node: &dyn NodeClient,
    from: Address,
    gas_limit: u64,
    request: &ReleaseRequest<'_>,
    broadcast: bool,
) -> Result<Vec<u8>, EscrowError> {
    let script = RedeemScript::deserialize(request.redeem_script)?;
    let call = build_release_call(
        request.inputs,
        request.outputs,
        request.signatures,
        &script,
    )?;

    if !broadcast {
        return Ok(serde_json::to_vec(&call)?);
    }

    let submitted = submit_call(node, from, gas_limit, &script.multisig_address, &call).await?;
    Ok(submitted.raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::escrow::signing::create_signature;
    use crate::testutil::{MockNode, Submission};

    struct Fixture {
        buyer: KeyPair,
        seller: KeyPair,
        moderator: KeyPair,
        script: RedeemScript,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
    }

    fn fixture() -> Fixture {
        let buyer = KeyPair::generate();
        let seller = KeyPair::generate();
        let moderator = KeyPair::generate();
        let script = RedeemScript {
            unique_id: [0x07; 20],
            threshold: 2,
            timeout_hours: 0,
            buyer: buyer.address(),
            seller: seller.address(),
            moderator: moderator.address(),
            multisig_address: Address::new([0xec; 20]),
            token_address: Address::ZERO,
        };
        let inputs = vec![TransactionInput::new("funding", 0, 100)];
        let outputs = vec![
            TransactionOutput::new(seller.address(), 60),
            TransactionOutput::new(buyer.address(), 30),
        ];
        Fixture {
            buyer,
            seller,
            moderator,
            script,
            inputs,
            outputs,
        }
    }

    fn sign(f: &Fixture, key: &KeyPair) -> PartialSignature {
        create_signature(&f.inputs, &f.outputs, key, &f.script.serialize()).unwrap()
    }

    #[test]
    fn test_release_call_keeps_given_order() {
        let f = fixture();
        let moderator_sig = sign(&f, &f.moderator);
        let seller_sig = sign(&f, &f.seller);

        let call = build_release_call(
            &f.inputs,
            &f.outputs,
            &[moderator_sig.clone(), seller_sig.clone()],
            &f.script,
        )
        .unwrap();

        match call {
            EscrowCall::Execute {
                v,
                r,
                destinations,
                amounts,
                script_hash,
                ..
            } => {
                assert_eq!(v.len(), 2);
                assert_eq!(r[0], moderator_sig.rsv().unwrap().0);
                assert_eq!(r[1], seller_sig.rsv().unwrap().0);
                assert_eq!(script_hash, f.script.content_hash().0);

                let mut expected = vec![f.buyer.address(), f.seller.address()];
                expected.sort();
                assert_eq!(destinations, expected);
                assert_eq!(amounts.iter().sum::<u64>(), 100);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let f = fixture();
        let sig = sign(&f, &f.seller);
        let result = build_release_call(&f.inputs, &f.outputs, &[sig.clone(), sig], &f.script);
        assert!(matches!(
            result,
            Err(EscrowError::DuplicateSigner(SignerRole::Seller))
        ));
    }

    #[test]
    fn test_mislabelled_role_rejected() {
        let f = fixture();
        let mut sig = sign(&f, &f.seller);
        sig.role = SignerRole::Buyer;
        let moderator_sig = sign(&f, &f.moderator);

        let result = build_release_call(&f.inputs, &f.outputs, &[sig, moderator_sig], &f.script);
        assert!(matches!(
            result,
            Err(EscrowError::SignatureMismatch {
                role: SignerRole::Buyer,
                ..
            })
        ));
    }

    #[test]
    fn test_signature_over_other_payouts_rejected() {
        let f = fixture();
        let sig = sign(&f, &f.seller);
        let moderator_sig = sign(&f, &f.moderator);

        // Same total, different split
        let tampered = vec![
            TransactionOutput::new(f.seller.address(), 70),
            TransactionOutput::new(f.buyer.address(), 20),
        ];
        let result = build_release_call(&f.inputs, &tampered, &[sig, moderator_sig], &f.script);
        assert!(matches!(
            result,
            Err(EscrowError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_insufficient_signatures() {
        let f = fixture();
        let sig = sign(&f, &f.buyer);
        let result = build_release_call(&f.inputs, &f.outputs, &[sig], &f.script);
        assert!(matches!(
            result,
            Err(EscrowError::InsufficientSignatures { have: 1, need: 2 })
        ));
    }

    #[test]
    fn test_over_payout_reported_as_mismatch() {
        let f = fixture();
        let sig = sign(&f, &f.buyer);
        let outputs = vec![TransactionOutput::new(f.seller.address(), 500)];
        let result = build_release_call(&f.inputs, &outputs, &[sig], &f.script);
        assert!(matches!(
            result,
            Err(EscrowError::PayoutMismatch {
                inputs: 100,
                outputs: 500
            })
        ));
    }

    #[tokio::test]
    async fn test_combine_without_broadcast() {
        let f = fixture();
        let node = MockNode::new();
        let signatures = [sign(&f, &f.buyer), sign(&f, &f.seller)];
        let script_bytes = f.script.serialize();
        let request = ReleaseRequest {
            inputs: &f.inputs,
            outputs: &f.outputs,
            signatures: &signatures,
            redeem_script: &script_bytes,
        };

        let encoded = combine(&node, f.buyer.address(), 4_000_000, &request, false)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(json["method"], "execute");
        assert_eq!(json["v"].as_array().unwrap().len(), 2);
        assert!(node.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_combine_broadcasts_execute() {
        let f = fixture();
        let node = MockNode::new();
        let signatures = [sign(&f, &f.seller), sign(&f, &f.moderator)];
        let script_bytes = f.script.serialize();
        let request = ReleaseRequest {
            inputs: &f.inputs,
            outputs: &f.outputs,
            signatures: &signatures,
            redeem_script: &script_bytes,
        };

        let raw = combine(&node, f.seller.address(), 4_000_000, &request, true)
            .await
            .unwrap();
        assert!(!raw.is_empty());

        let submissions = node.submissions();
        assert_eq!(submissions.len(), 1);
        match &submissions[0] {
            Submission::Contract {
                contract,
                call,
                params,
            } => {
                assert_eq!(*contract, f.script.multisig_address);
                assert_eq!(call.method(), "execute");
                assert_eq!(params.value, 0);
                assert_eq!(params.gas_limit, 4_000_000);
                assert_eq!(params.from, f.seller.address());
            }
            other => panic!("unexpected submission {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_combine_surfaces_node_failure() {
        let f = fixture();
        let node = MockNode::new();
        node.fail_submissions(true);
        let signatures = [sign(&f, &f.seller), sign(&f, &f.moderator)];
        let script_bytes = f.script.serialize();
        let request = ReleaseRequest {
            inputs: &f.inputs,
            outputs: &f.outputs,
            signatures: &signatures,
            redeem_script: &script_bytes,
        };

        let result = combine(&node, f.seller.address(), 4_000_000, &request, true).await;
        assert!(matches!(result, Err(EscrowError::Submission(_))));
    }
}
