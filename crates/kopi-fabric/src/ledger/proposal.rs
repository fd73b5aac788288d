//! Transaction proposals for the peer Gateway service
//!
//! Every transaction starts as a proposal signed by the client identity:
//!
//! ```text
//! creator = SerializedIdentity{mspid, certificate PEM}
//! tx_id   = hex(sha256(nonce || creator))
//! ```
//!
//! Submitted transactions come back from endorsement as an unsigned
//! envelope which the client signs before handing it to the orderer.

use kopi_core::Identity;
use prost::Message;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use super::proto::{
    ChaincodeAction, ChaincodeActionPayload, ChaincodeEventsRequest, ChaincodeHeaderExtension,
    ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec, ChaincodeProposalPayload,
    ChaincodeSpec, ChannelHeader, CommitStatusRequest, Envelope, Header, Payload,
    Proposal, ProposalResponsePayload, SerializedIdentity, SignatureHeader,
    SignedChaincodeEventsRequest, SignedCommitStatusRequest, SignedProposal, Timestamp,
    Transaction, ENDORSER_TRANSACTION,
};
use crate::ca::AuthContext;
use crate::error::LedgerError;

const NONCE_LEN: usize = 24;

/// Identity that signs proposals, envelopes and service requests
pub struct ProposalSigner {
    context: AuthContext,
    creator: Vec<u8>,
}

impl std::fmt::Debug for ProposalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProposalSigner")
            .field("identity", &self.context.name())
            .field("msp_id", &self.context.msp_id())
            .finish()
    }
}

impl ProposalSigner {
    pub fn new(identity: &Identity) -> Result<Self, LedgerError> {
        let context = AuthContext::from_identity(identity)
            .map_err(|e| LedgerError::Connection(e.to_string()))?;
        let creator = SerializedIdentity {
            mspid: identity.msp_id().to_string(),
            id_bytes: identity.certificate().as_bytes().to_vec(),
        }
        .encode_to_vec();
        Ok(Self { context, creator })
    }

    /// Serialized identity placed in every header and request
    pub fn creator(&self) -> &[u8] {
        &self.creator
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.context.sign(message)
    }

    /// Build and sign a proposal invoking `transaction` with `args`
    pub fn proposal(
        &self,
        channel: &str,
        chaincode: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<SignedTransaction, LedgerError> {
        let mut nonce = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        self.proposal_with_nonce(channel, chaincode, transaction, args, nonce)
    }

    fn proposal_with_nonce(
        &self,
        channel: &str,
        chaincode: &str,
        transaction: &str,
        args: &[String],
        nonce: Vec<u8>,
    ) -> Result<SignedTransaction, LedgerError> {
        let transaction_id = transaction_id(&nonce, &self.creator);
        let chaincode_id = ChaincodeId {
            name: chaincode.to_string(),
            ..Default::default()
        };

        let channel_header = ChannelHeader {
            r#type: ENDORSER_TRANSACTION,
            timestamp: Some(now()),
            channel_id: channel.to_string(),
            tx_id: transaction_id.clone(),
            extension: ChaincodeHeaderExtension {
                chaincode_id: Some(chaincode_id.clone()),
            }
            .encode_to_vec(),
            ..Default::default()
        };
        let signature_header = SignatureHeader {
            creator: self.creator.clone(),
            nonce,
        };
        let header = Header {
            channel_header: channel_header.encode_to_vec(),
            signature_header: signature_header.encode_to_vec(),
        };

        let input = ChaincodeInput {
            args: std::iter::once(transaction.as_bytes().to_vec())
                .chain(args.iter().map(|arg| arg.as_bytes().to_vec()))
                .collect(),
        };
        let invocation = ChaincodeInvocationSpec {
            chaincode_spec: Some(ChaincodeSpec {
                chaincode_id: Some(chaincode_id),
                input: Some(input),
                ..Default::default()
            }),
        };
        let payload = ChaincodeProposalPayload {
            input: invocation.encode_to_vec(),
        };

        let proposal_bytes = Proposal {
            header: header.encode_to_vec(),
            payload: payload.encode_to_vec(),
        }
        .encode_to_vec();
        let signature = self.sign(&proposal_bytes);

        Ok(SignedTransaction {
            transaction_id,
            proposal: SignedProposal {
                proposal_bytes,
                signature,
            },
        })
    }

    /// Sign an endorsed envelope in place
    pub fn sign_envelope(&self, envelope: &mut Envelope) {
        envelope.signature = self.sign(&envelope.payload);
    }

    pub fn commit_status_request(
        &self,
        channel: &str,
        transaction_id: &str,
    ) -> SignedCommitStatusRequest {
        let request = CommitStatusRequest {
            transaction_id: transaction_id.to_string(),
            channel_id: channel.to_string(),
            identity: self.creator.clone(),
        }
        .encode_to_vec();
        let signature = self.sign(&request);
        SignedCommitStatusRequest { request, signature }
    }

    pub fn events_request(&self, channel: &str, chaincode: &str) -> SignedChaincodeEventsRequest {
        let request = ChaincodeEventsRequest {
            channel_id: channel.to_string(),
            chaincode_id: chaincode.to_string(),
            identity: self.creator.clone(),
        }
        .encode_to_vec();
        let signature = self.sign(&request);
        SignedChaincodeEventsRequest { request, signature }
    }
}

/// A signed proposal and the transaction id it commits to
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub transaction_id: String,
    pub proposal: SignedProposal,
}

pub fn transaction_id(nonce: &[u8], creator: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator);
    hex::encode(hasher.finalize())
}

/// Chaincode response payload carried inside an endorsed envelope
pub fn endorsed_result(envelope: &Envelope) -> Result<Vec<u8>, LedgerError> {
    let malformed = |what: &str, e: prost::DecodeError| {
        LedgerError::Connection(format!("malformed endorsed transaction ({}): {}", what, e))
    };

    let payload = Payload::decode(envelope.payload.as_slice()).map_err(|e| malformed("payload", e))?;
    let transaction =
        Transaction::decode(payload.data.as_slice()).map_err(|e| malformed("transaction", e))?;
    let action = transaction.actions.first().ok_or_else(|| {
        LedgerError::Connection("endorsed transaction has no actions".into())
    })?;
    let action_payload = ChaincodeActionPayload::decode(action.payload.as_slice())
        .map_err(|e| malformed("action payload", e))?;
    let endorsed = action_payload.action.unwrap_or_default();
    let response_payload =
        ProposalResponsePayload::decode(endorsed.proposal_response_payload.as_slice())
            .map_err(|e| malformed("proposal response", e))?;
    let chaincode_action = ChaincodeAction::decode(response_payload.extension.as_slice())
        .map_err(|e| malformed("chaincode action", e))?;

    Ok(chaincode_action
        .response
        .map(|response| response.payload)
        .unwrap_or_default())
}

fn now() -> Timestamp {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Timestamp {
        seconds: elapsed.as_secs() as i64,
        nanos: elapsed.subsec_nanos() as i32,
    }
}
